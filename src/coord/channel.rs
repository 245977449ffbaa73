//! Event channel seam
//!
//! The remote side reports component completion as JSON frames on a channel
//! opened with a per-run ticket. This module defines the collaborator traits,
//! the wire message shape and how frames become [`ComponentEvent`]s, plus an
//! in-memory channel used for local runs and tests.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::core::errors::{Result, StackError};
use crate::coord::types::{ComponentEvent, ComponentId, Ticket};

/// Lazy, unordered sequence of raw frames for the lifetime of a run
pub type EventStream = BoxStream<'static, String>;

/// Issues the correlation ticket a run's channel is scoped to
#[async_trait]
pub trait TicketService: Send + Sync {
    async fn create_ticket(&self) -> Result<Ticket>;
}

/// Opens the event stream for a ticket
#[async_trait]
pub trait EventChannel: Send + Sync {
    async fn open(&self, ticket: &Ticket) -> Result<EventStream>;
}

/// Status reported by the remote deployer
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployerStatus {
    Finish,
    Error,
    /// Progress or other statuses the coordinator does not act on
    #[serde(other)]
    Other,
}

/// Payload of a deployer message
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployerData {
    pub status: DeployerStatus,
    /// Component the message is about
    pub hash: ComponentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
}

/// A deployer message as it travels on the wire
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    pub action: String,
    pub data: DeployerData,
}

impl ChannelMessage {
    pub fn finish(action: impl Into<String>, hash: impl Into<ComponentId>) -> Self {
        Self::with_status(action, hash, DeployerStatus::Finish, None)
    }

    pub fn error(
        action: impl Into<String>,
        hash: impl Into<ComponentId>,
        message: impl Into<String>,
    ) -> Self {
        Self::with_status(action, hash, DeployerStatus::Error, Some(message.into()))
    }

    fn with_status(
        action: impl Into<String>,
        hash: impl Into<ComponentId>,
        status: DeployerStatus,
        message: Option<String>,
    ) -> Self {
        Self {
            action: action.into(),
            data: DeployerData {
                status,
                hash: hash.into(),
                message,
                run_id: None,
            },
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.data.run_id = Some(run_id.into());
        self
    }

    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Deserialize)]
struct Envelope {
    action: String,
    data: Value,
}

/// Interpret a raw frame.
///
/// Returns `Ok(None)` for frames of other actions and for statuses that carry
/// no completion. A frame that is not a valid message is a protocol error.
pub fn parse_frame(frame: &str, deployer_action: &str) -> Result<Option<ComponentEvent>> {
    let envelope: Envelope = serde_json::from_str(frame)
        .map_err(|e| StackError::protocol_frame(format!("unparsable event: {}", e), frame))?;

    if envelope.action != deployer_action {
        return Ok(None);
    }

    let data: DeployerData = serde_json::from_value(envelope.data).map_err(|e| {
        StackError::protocol_frame(
            format!("malformed {} event: {}", deployer_action, e),
            frame,
        )
    })?;

    let event = match data.status {
        DeployerStatus::Finish => ComponentEvent::finished(data.hash),
        DeployerStatus::Error => ComponentEvent::failed(
            data.hash,
            data.message
                .unwrap_or_else(|| "remote worker reported an error".to_string()),
        ),
        DeployerStatus::Other => return Ok(None),
    };

    Ok(Some(match data.run_id {
        Some(run_id) => event.with_run_id(run_id),
        None => event,
    }))
}

/// Sending half of an in-memory channel
#[derive(Clone, Debug)]
pub struct EventPublisher {
    sender: mpsc::UnboundedSender<String>,
}

impl EventPublisher {
    pub fn publish(&self, frame: impl Into<String>) -> Result<()> {
        self.sender
            .send(frame.into())
            .map_err(|_| StackError::channel("memory", "event channel receiver dropped"))
    }

    pub fn publish_message(&self, message: &ChannelMessage) -> Result<()> {
        self.publish(message.to_frame()?)
    }
}

/// In-process event channel; can be opened once
pub struct MemoryEventChannel {
    receiver: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
}

impl MemoryEventChannel {
    pub fn new() -> (Self, EventPublisher) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                receiver: Mutex::new(Some(receiver)),
            },
            EventPublisher { sender },
        )
    }
}

#[async_trait]
impl EventChannel for MemoryEventChannel {
    async fn open(&self, ticket: &Ticket) -> Result<EventStream> {
        let receiver = self.receiver.lock().await.take().ok_or_else(|| {
            StackError::channel(
                "memory",
                format!("channel already opened (ticket {})", ticket.ticket_id),
            )
        })?;
        tracing::debug!("Opened in-memory event channel for ticket {}", ticket.ticket_id);

        let frames = stream::unfold(receiver, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        });
        Ok(frames.boxed())
    }
}

/// Ticket service issuing random tickets locally
#[derive(Debug, Default)]
pub struct MemoryTicketService;

#[async_trait]
impl TicketService for MemoryTicketService {
    async fn create_ticket(&self) -> Result<Ticket> {
        Ok(Ticket::new(uuid::Uuid::new_v4().to_string()))
    }
}
