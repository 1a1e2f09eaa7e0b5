//! Factory for constructing transports from configuration.

use crate::error::McpResult;
use crate::transport::{Transport, TransportConfig};

/// Constructs boxed transports from a [`TransportConfig`].
///
/// Only the outbound transports are built here; the attached stdio transport
/// and the WebSocket server transport are constructed directly from their
/// inputs (streams, listener config) by the code that owns them.
pub struct TransportFactory;

impl TransportFactory {
    /// Create a transport for the given configuration.
    pub fn create(config: TransportConfig) -> McpResult<Box<dyn Transport>> {
        match config {
            #[cfg(feature = "stdio")]
            TransportConfig::Stdio(stdio) => {
                Ok(Box::new(crate::transport::stdio::StdioTransport::spawn(stdio)))
            }

            #[cfg(feature = "http-sse")]
            TransportConfig::HttpSse(http) => Ok(Box::new(
                crate::transport::http_sse::HttpSseTransport::new(http)?,
            )),

            #[cfg(feature = "websocket")]
            TransportConfig::WebSocket(ws) => Ok(Box::new(
                crate::transport::websocket::WebSocketTransport::new(ws),
            )),

            #[allow(unreachable_patterns)]
            other => Err(crate::error::TransportError::InvalidConfig {
                transport_type: other.transport_type().to_string(),
                reason: "transport support not compiled in".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_creates_each_kind() {
        let stdio = TransportFactory::create(TransportConfig::stdio("echo", &[] as &[String]));
        assert!(stdio.is_ok());
        assert_eq!(stdio.unwrap().transport_type(), "stdio");

        let http =
            TransportFactory::create(TransportConfig::http_sse("http://localhost:1").unwrap());
        assert_eq!(http.unwrap().transport_type(), "http-sse");

        let ws = TransportFactory::create(TransportConfig::websocket("ws://localhost:1").unwrap());
        assert_eq!(ws.unwrap().transport_type(), "websocket");
    }
}
