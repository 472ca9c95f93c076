//! HTTP transport backed by `ureq`

use std::time::Duration;

use tracing::debug;

use crate::transport::{HttpRequest, HttpResponse, Method, Transport, TransportError};

/// Blocking HTTP transport
pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    /// Transport with a global per-request timeout
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

fn decorate<B>(mut builder: ureq::RequestBuilder<B>, request: &HttpRequest) -> ureq::RequestBuilder<B> {
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    for (name, value) in &request.query {
        builder = builder.query(name, value);
    }
    builder
}

impl Transport for HttpTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!(target: "parsel::client", method = %request.method, url = %request.url, "HTTP request");

        let body = request.body.as_deref().unwrap_or("{}");
        let result = match request.method {
            Method::Get => decorate(self.agent.get(&request.url), request).call(),
            Method::Delete => decorate(self.agent.delete(&request.url), request).call(),
            Method::Post => decorate(self.agent.post(&request.url), request).send(body.as_bytes()),
            Method::Put => decorate(self.agent.put(&request.url), request).send(body.as_bytes()),
        };
        let mut response = result.map_err(|e| TransportError::new(e.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError::new(format!("failed to read response: {}", e)))?;
        Ok(HttpResponse { status, body })
    }
}
