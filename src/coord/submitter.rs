//! Remote work submission
//!
//! The coordinator only needs "start this component" semantics from the
//! remote endpoint. Completion is reported separately on the event channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::errors::Result;
use crate::coord::channel::{ChannelMessage, EventPublisher};
use crate::coord::credentials::WorkerCredentials;
use crate::coord::types::{ComponentConfig, ComponentId};

/// Everything the remote worker needs to run one component
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub component_id: ComponentId,
    pub run_id: String,
    pub actions: Vec<String>,
    pub config: ComponentConfig,
    pub credentials: WorkerCredentials,
}

impl SubmitRequest {
    /// JSON body sent to the deployer endpoint
    pub fn to_body(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Acknowledgement that the remote side accepted the work
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub message: String,
}

impl Acknowledgement {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Starts a component on the remote endpoint
#[async_trait]
pub trait RemoteSubmitter: Send + Sync {
    async fn submit(&self, request: SubmitRequest) -> Result<Acknowledgement>;
}

/// Work performed for a component by a local worker
#[async_trait]
pub trait ComponentWorker: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, request: &SubmitRequest) -> anyhow::Result<()>;
}

/// Submitter running components in-process and reporting on an in-memory channel
pub struct LocalSubmitter {
    worker: Arc<dyn ComponentWorker>,
    publisher: EventPublisher,
    action: String,
}

impl LocalSubmitter {
    pub fn new(
        worker: Arc<dyn ComponentWorker>,
        publisher: EventPublisher,
        action: impl Into<String>,
    ) -> Self {
        Self {
            worker,
            publisher,
            action: action.into(),
        }
    }
}

#[async_trait]
impl RemoteSubmitter for LocalSubmitter {
    async fn submit(&self, request: SubmitRequest) -> Result<Acknowledgement> {
        let worker = self.worker.clone();
        let publisher = self.publisher.clone();
        let action = self.action.clone();

        tokio::spawn(async move {
            let message = match worker.execute(&request).await {
                Ok(()) => ChannelMessage::finish(&action, request.component_id.clone()),
                Err(e) => {
                    ChannelMessage::error(&action, request.component_id.clone(), format!("{:#}", e))
                }
            }
            .with_run_id(request.run_id.clone());

            if let Err(e) = publisher.publish_message(&message) {
                tracing::warn!(
                    "Could not report result of {} for {}: {}",
                    worker.name(),
                    request.config.name,
                    e
                );
            }
        });

        Ok(Acknowledgement::new(format!(
            "Deployment started by {}",
            self.worker.name()
        )))
    }
}
