//! Outbound transport port (driven/secondary port)
//!
//! The subsystem never talks to the network directly. Report delivery,
//! remote logging and alert webhooks all go through [`ITransport`], which
//! performs one JSON POST to an endpoint.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` for connection-level failures. A response with
//!   a non-success status is *not* an error at this layer; callers inspect
//!   [`TransportResponse::is_success`].

use serde_json::Value;

/// Response to an outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    /// HTTP-style status code
    pub status: u16,
    /// Parsed JSON body, when the response had one
    pub body: Option<Value>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Option<Value>) -> Self {
        Self { status, body }
    }

    /// True for 2xx statuses
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Port trait for outbound JSON requests
#[async_trait::async_trait]
pub trait ITransport: Send + Sync {
    /// POSTs `body` as JSON to `endpoint`
    async fn post_json(&self, endpoint: &str, body: &Value) -> anyhow::Result<TransportResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_range() {
        assert!(TransportResponse::new(200, None).is_success());
        assert!(TransportResponse::new(204, None).is_success());
        assert!(!TransportResponse::new(302, None).is_success());
        assert!(!TransportResponse::new(500, None).is_success());
    }
}
