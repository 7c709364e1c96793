use serde_json::Value;
use thiserror::Error;

use crate::property::ConversionError;

pub type Result<T, E = MappingError> = std::result::Result<T, E>;

/// Everything that can abort a `serialize` / `deserialize` call.
///
/// Hook errors are carried unchanged as the `source` of [`MappingError::Hook`],
/// so callers can downcast them back to their own error types.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{type_name} is not a mappable type; register it before mapping")]
    NotMappable { type_name: String },

    #[error("no fields are declared for {type_name}")]
    NotFound { type_name: String },

    #[error(
        "property '{field}' (path: '{path}') is required in {type_name} but missing in provided JSON: {}",
        pretty(.document)
    )]
    RequiredProperty {
        field: String,
        path: String,
        type_name: String,
        document: Value,
    },

    #[error(
        "property '{field}' with value {value} in {type_name} failed to pass the validation check by {validator}"
    )]
    ValidateProperty {
        field: String,
        value: String,
        type_name: String,
        validator: String,
    },

    #[error("property '{field}' in {type_name} cannot hold the mapped value")]
    Conversion {
        type_name: String,
        field: String,
        #[source]
        source: ConversionError,
    },

    #[error("property '{field}' in {type_name} maps to {paths} paths but did not serialize to an array")]
    FanOut {
        type_name: String,
        field: String,
        paths: usize,
    },

    #[error("failed to construct {type_name}")]
    Construct {
        type_name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("hook for property '{field}' in {type_name} failed")]
    Hook {
        type_name: String,
        field: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to parse JSON document")]
    Json(#[from] serde_json::Error),
}

impl MappingError {
    /// Name of the field the error is attached to, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            MappingError::RequiredProperty { field, .. }
            | MappingError::ValidateProperty { field, .. }
            | MappingError::Conversion { field, .. }
            | MappingError::FanOut { field, .. }
            | MappingError::Hook { field, .. } => Some(field),
            _ => None,
        }
    }
}

fn pretty(document: &Value) -> String {
    serde_json::to_string_pretty(document).unwrap_or_else(|_| document.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_message_embeds_document() {
        let err = MappingError::RequiredProperty {
            field: "id".to_string(),
            path: "user.id".to_string(),
            type_name: "User".to_string(),
            document: json!({"user": {}}),
        };

        let message = err.to_string();
        assert!(message.starts_with("property 'id' (path: 'user.id') is required in User"));
        assert!(message.contains("\"user\": {}"));
        assert_eq!(err.field(), Some("id"));
    }

    #[test]
    fn test_hook_error_keeps_source() {
        let err = MappingError::Hook {
            type_name: "Token".to_string(),
            field: "expires_at".to_string(),
            source: anyhow::anyhow!("clock went backwards"),
        };

        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "clock went backwards");
    }
}
