use thiserror::Error;

/// Unified error type for the dagaflow library
#[derive(Debug, Error)]
pub enum FlowError {
    /// The DAG could not be turned into a runnable plan
    #[error("Flow construction failed: {message}")]
    Construction { message: String },

    /// An action name is already taken in the registry
    #[error("Action '{name}' is already registered")]
    DuplicateAction { name: String },

    /// One or more actions failed in a batch; rollback has already run
    #[error("{} action(s) failed in batch {batch}", .errors.len())]
    Aggregate {
        batch: usize,
        errors: Vec<ActionError>,
    },
}

/// Failure of a single action during the primary execution pass
#[derive(Debug, Clone, Error, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[error("Action '{action}' failed: {message}")]
pub struct ActionError {
    /// Name of the failed action
    pub action: String,
    /// Message of the error the action returned
    pub message: String,
}

impl ActionError {
    pub fn new(action: impl Into<String>, source: &anyhow::Error) -> Self {
        Self {
            action: action.into(),
            message: source.to_string(),
        }
    }
}

impl FlowError {
    /// Create a construction error
    pub fn construction<S: Into<String>>(message: S) -> Self {
        Self::Construction {
            message: message.into(),
        }
    }

    /// Create a duplicate-action error
    pub fn duplicate_action<S: Into<String>>(name: S) -> Self {
        Self::DuplicateAction { name: name.into() }
    }

    /// Create an aggregate error for a failed batch
    pub fn aggregate(batch: usize, errors: Vec<ActionError>) -> Self {
        Self::Aggregate { batch, errors }
    }

    /// The per-action errors carried by an aggregate, if any
    pub fn action_errors(&self) -> &[ActionError] {
        match self {
            Self::Aggregate { errors, .. } => errors,
            _ => &[],
        }
    }
}

/// Result type alias for dagaflow operations
pub type Result<T> = std::result::Result<T, FlowError>;
