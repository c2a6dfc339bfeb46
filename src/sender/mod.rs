pub mod client;
pub mod error;
pub mod serialization;

pub use client::{
    ClientConfig, ClsClient, ClsRequest, ConnectionStats, Network, RequestBody, STRUCTURED_LOG_PATH,
    endpoint_host,
};
pub use error::{ClsError, ErrorClass, ErrorCode, ErrorResponse, check_response};
pub use serialization::{
    BatchSerializer, LogGroup, LogGroupList, LogGroupSerializer, Payload, PayloadFormat,
    SerializationError,
};

pub use crate::signer::AuthParam;

use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Delivers one serialized batch. Implementations must be cheap to share
/// across the send tasks the shipper spawns.
pub trait BatchUploader: Send + Sync + 'static {
    fn upload(&self, payload: Payload) -> impl Future<Output = Result<(), ClsError>> + Send;
}

/// Uploads batches to one CLS topic.
#[derive(Debug, Clone)]
pub struct LogSender {
    client: ClsClient,
    topic_id: String,
    auth: Option<AuthParam>,
    cancel: CancellationToken,
}

impl LogSender {
    pub fn new(client: ClsClient, topic_id: impl Into<String>) -> Self {
        Self {
            client,
            topic_id: topic_id.into(),
            auth: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Signs every upload with `auth` instead of the client credentials.
    pub fn with_auth(mut self, auth: AuthParam) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Cancelling `cancel` aborts uploads still waiting on the network.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn client(&self) -> &ClsClient {
        &self.client
    }

    pub fn connection_stats(&self) -> ConnectionStats {
        self.client.connection_stats()
    }
}

impl BatchUploader for LogSender {
    async fn upload(&self, payload: Payload) -> Result<(), ClsError> {
        debug!(
            "Uploading batch {} ({} records, {} bytes) to topic {}",
            payload.batch_id,
            payload.record_count,
            payload.len(),
            self.topic_id
        );

        match &self.auth {
            Some(auth) => {
                self.client
                    .upload_structured_log_with_auth(&self.topic_id, &payload, auth, &self.cancel)
                    .await
            }
            None => {
                self.client
                    .upload_structured_log(&self.topic_id, &payload, &self.cancel)
                    .await
            }
        }
    }
}
