use thiserror::Error;

use crate::types::StatFamily;

#[derive(Debug, Error)]
pub enum XappError {
    #[error("no E2 node connected")]
    NoE2Nodes,

    #[error("failed to subscribe to {family} reports on node [{node}]: {reason}")]
    Subscribe {
        family: StatFamily,
        node: String,
        reason: String,
    },

    #[error("unknown subscription handle {0}")]
    UnknownSubscription(u64),

    #[error("no {0} samples collected")]
    NoSamples(StatFamily),

    #[error("'{0}' column not found in collected data")]
    MissingLabelField(String),

    #[error("not enough samples: need at least {needed}, got {got}")]
    NotEnoughSamples { needed: usize, got: usize },

    #[error("no informative feature left after filtering")]
    NoFeatures,

    #[error("input contains non-finite values in {0}")]
    NonFinite(String),

    #[error("feature length mismatch: got {got}, expected {expected}")]
    ShapeMismatch { got: usize, expected: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Torch(#[from] tch::TchError),
}

impl XappError {
    /// Errors that only abort the learning branch; collection already completed.
    pub fn is_data_shortfall(&self) -> bool {
        matches!(self, XappError::NoSamples(_) | XappError::MissingLabelField(_))
    }
}

pub type Result<T> = std::result::Result<T, XappError>;
