use mockall::automock;
use std::sync::mpsc::{SendError, Sender};
use thiserror::Error;

/// A trigger that receives webhooks over HTTP.
pub mod http;
/// A trigger that deploys a payload from a file once and then exits.
pub mod once;
/// A trigger that stops the deploys on a signal.
pub mod signal;

/// A notification received by a trigger, waiting to be deployed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// The name of the trigger that received it.
    pub trigger: &'static str,
    /// The body of the notification, if there was one.
    pub payload: Option<String>,
}

/// A custom error for describing the error cases for triggers
#[derive(Debug, Error)]
pub enum TriggerError {
    /// Cannot initialize trigger, because it has a misconfiguration.
    #[error("not configured correctly: {0}")]
    Misconfigured(String),
    /// Cannot send trigger with Sender. This usually because the receiver is dropped.
    #[error("cannot deliver notification, receiver hang up")]
    ReceiverHangup(#[from] SendError<Option<Delivery>>),
    /// Running the trigger failed.
    #[error("{0}")]
    FailedTrigger(String),
}

/// A trigger is a long running background process, which receives the notifications.
///
/// Every notification is sent as `Some(delivery)`, `None` asks the deploys to stop.
///
/// Triggers may include:
///   - HTTP servers ([http::HttpTrigger])
///   - a single payload file ([once::OnceTrigger])
///   - signal handlers ([signal::SignalTrigger])
#[automock]
pub trait Trigger: Sync + Send {
    /// Start the trigger process.
    fn listen(&self, tx: Sender<Option<Delivery>>) -> Result<(), TriggerError>;
}
