use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DocError {
    #[error("failed to cast {path} value of {value} to {type_tag}")]
    Coercion {
        path: String,
        value: String,
        type_tag: String,
    },

    #[error("{message}")]
    Validation {
        path: String,
        name: String,
        message: String,
    },

    #[error("Reference integrity error: {0}")]
    ReferenceIntegrity(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Document rejected with {} error(s)", .0.len())]
    Invalid(Vec<DocError>),

    #[error("Path '{0}' is not declared on schema '{1}'")]
    UnknownPath(String, String),

    #[error("Task '{0}' is not defined")]
    UnknownTask(String),

    #[error("Task '{0}' aborted: {1}")]
    Aborted(String, String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, DocError>;

impl DocError {
    /// Builds a coercion failure for `path`, rendering the rejected value as JSON.
    pub fn coercion(path: &str, value: &serde_json::Value, type_tag: &str) -> Self {
        Self::Coercion {
            path: path.to_string(),
            value: value.to_string(),
            type_tag: type_tag.to_string(),
        }
    }

    /// Builds a validation failure, defaulting the message the way the gate reports it.
    pub fn validation(path: &str, name: &str, message: Option<String>) -> Self {
        Self::Validation {
            path: path.to_string(),
            name: name.to_string(),
            message: message
                .unwrap_or_else(|| format!("validation {} failed for {}", name, path)),
        }
    }

    pub fn is_coercion(&self) -> bool {
        matches!(self, Self::Coercion { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    /// The errors carried by a rejected save, or an empty slice for every other variant.
    pub fn rejected(&self) -> &[DocError] {
        match self {
            Self::Invalid(errors) => errors,
            _ => &[],
        }
    }
}

impl From<serde_json::Error> for DocError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for DocError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coercion_message_names_path_value_and_type() {
        let err = DocError::coercion("age", &json!("abc"), "number");
        assert_eq!(err.to_string(), "failed to cast age value of \"abc\" to number");
        assert!(err.is_coercion());
    }

    #[test]
    fn validation_falls_back_to_generated_message() {
        let err = DocError::validation("email", "present", None);
        assert_eq!(err.to_string(), "validation present failed for email");

        let custom = DocError::validation("email", "present", Some("email is required".into()));
        assert_eq!(custom.to_string(), "email is required");
    }

    #[test]
    fn rejected_exposes_inner_errors() {
        let err = DocError::Invalid(vec![DocError::validation("a", "b", None)]);
        assert_eq!(err.rejected().len(), 1);
        assert!(DocError::Store("down".into()).rejected().is_empty());
    }
}
