use std::error::Error;
use std::fmt;

/// Error kinds raised by the codec, the resampling engine and model selection.
///
/// Functions in this crate return `anyhow` results; callers that need to react to a
/// particular kind recover it with `downcast_ref::<ForestError>()`.
#[derive(Clone, Debug, PartialEq)]
pub enum ForestError {
    /// Malformed oneliner record or alignment text.
    Format(String),
    /// AICc denominator is not positive, the alignment is too short for the model.
    Domain(String),
    /// Requested model is not in the model table.
    InvalidModel {
        requested: String,
        available: Vec<String>,
    },
    /// The external tool did not produce an expected artifact.
    MissingOutput { artifact: String, reason: String },
    /// The external process could not be launched or waited on.
    ToolInvocation(String),
}

impl fmt::Display for ForestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForestError::Format(message) => write!(f, "Malformed input: {message}"),
            ForestError::Domain(message) => write!(f, "Domain error: {message}"),
            ForestError::InvalidModel {
                requested,
                available,
            } => write!(
                f,
                "Unknown model {requested}, you must use a valid model: {}",
                available.join(",")
            ),
            ForestError::MissingOutput { artifact, reason } => {
                write!(f, "Missing tool output {artifact}: {reason}")
            }
            ForestError::ToolInvocation(message) => {
                write!(f, "Failed to run external tool: {message}")
            }
        }
    }
}

impl Error for ForestError {}

pub(crate) fn format_error(message: impl Into<String>) -> ForestError {
    ForestError::Format(message.into())
}
