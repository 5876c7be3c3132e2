//! Delivery backend for API Gateway WebSocket connections.

use async_trait::async_trait;
use aws_sdk_apigatewaymanagement::Client;
use aws_sdk_apigatewaymanagement::error::DisplayErrorContext;
use aws_sdk_apigatewaymanagement::primitives::Blob;

use super::push::{ConnectionPush, PushError};

pub struct GatewayPush {
    client: Client,
}

impl GatewayPush {
    /// Builds a client posting to `ws_endpoint`, the management endpoint of
    /// the WebSocket API (the connection URL with an `https://` scheme).
    pub fn new(sdk_config: &aws_config::SdkConfig, ws_endpoint: &str) -> Self {
        let config = aws_sdk_apigatewaymanagement::config::Builder::from(sdk_config)
            .endpoint_url(ws_endpoint)
            .build();
        Self {
            client: Client::from_conf(config),
        }
    }
}

#[async_trait]
impl ConnectionPush for GatewayPush {
    async fn send(&self, connection_id: &str, payload: &[u8]) -> Result<(), PushError> {
        match self
            .client
            .post_to_connection()
            .connection_id(connection_id)
            .data(Blob::new(payload))
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_gone_exception()) => {
                Err(PushError::Gone)
            }
            Err(err) => Err(PushError::Service(format!(
                "{}",
                DisplayErrorContext(&err)
            ))),
        }
    }
}
