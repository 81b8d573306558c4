use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use thiserror::Error;

use crate::activity::ActivityInput;
use crate::feature::FeatureName;
use crate::signal::InstanceId;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Retryability tag attached to an activity error when it is produced.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Retryable,
    Fatal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Retryable => "retryable",
            ErrorKind::Fatal => "fatal",
        }
    }
}

/// Failure reported by an activity executor.
///
/// The kind is decided once, where the error is constructed. Errors that
/// arrive without a tag (any conversion from a foreign error) are fatal.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ActivityError {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl ActivityError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Retryable, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Fatal, message)
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Retryable
    }
}

impl From<anyhow::Error> for ActivityError {
    fn from(err: anyhow::Error) -> Self {
        Self::fatal(format!("{err:#}")).with_source(err)
    }
}

impl From<FeatureError> for ActivityError {
    fn from(err: FeatureError) -> Self {
        let kind = if err.is_transient() {
            ErrorKind::Retryable
        } else {
            ErrorKind::Fatal
        };
        Self::new(kind, err.to_string()).with_source(err)
    }
}

/// A signal whose action has no activity mapping.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ClassificationError {
    #[error("unsupported action: {action}")]
    UnsupportedAction { action: String },
}

/// The inbox could not deliver a signal to the instance.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum InboxError {
    #[error("signal inbox closed")]
    Closed,
    #[error("signal delivery failed: {0}")]
    Delivery(String),
}

/// Reason an orchestrator instance terminated unsuccessfully.
#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error("activity execution failed: activity={activity} input={input}")]
    Activity {
        activity: &'static str,
        input: Box<ActivityInput>,
        #[source]
        source: ActivityError,
    },
    #[error("receiving the first job failed")]
    Inbox(#[source] InboxError),
}

impl JobError {
    /// Short label used in events and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            JobError::Classification(_) => "unclassified",
            JobError::Activity { .. } => "fatal",
            JobError::Inbox(_) => "inbox",
        }
    }
}

/// The create-or-signal call could not reach the runtime.
#[derive(Debug, Error)]
#[error("signal with start failed: instance_id={instance_id}")]
pub struct DispatchError {
    pub instance_id: InstanceId,
    #[source]
    source: BoxError,
}

impl DispatchError {
    pub fn new(instance_id: InstanceId, source: impl Into<BoxError>) -> Self {
        Self {
            instance_id,
            source: source.into(),
        }
    }
}

/// Errors surfaced by feature managers.
#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("unknown feature: {name}")]
    UnknownFeature { name: FeatureName },
    #[error("invalid feature spec: {reason}")]
    InvalidSpec { reason: String },
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("transient failure: {0:#}")]
    Transient(anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FeatureError {
    pub fn invalid_spec(reason: impl Into<String>) -> Self {
        FeatureError::InvalidSpec {
            reason: reason.into(),
        }
    }

    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        FeatureError::Transient(err.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FeatureError::Transient(_))
    }
}
