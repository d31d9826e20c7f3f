//! The single return contract of every file operation.

use serde::{Serialize, Serializer};

use crate::ErrorCode;

/// Outcome of one tool invocation: a success payload XOR an error code.
///
/// Serializes as `{"success": true, "result": .., "message": ..}` or
/// `{"success": false, "error": "NOT_FOUND", "message": ..}`.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResponse<T> {
    Success { result: T, message: String },
    Failure { error: ErrorCode, message: String },
}

impl<T> ToolResponse<T> {
    pub fn success(result: T, message: impl Into<String>) -> Self {
        Self::Success {
            result,
            message: message.into(),
        }
    }

    pub fn failure(error: ErrorCode, message: impl Into<String>) -> Self {
        Self::Failure {
            error,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Success { message, .. } | Self::Failure { message, .. } => message,
        }
    }

    /// The error code, if this is a failure.
    #[must_use]
    pub const fn error(&self) -> Option<ErrorCode> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => Some(*error),
        }
    }

    #[must_use]
    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Success { result, .. } => Some(result),
            Self::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn into_result(self) -> Option<T> {
        match self {
            Self::Success { result, .. } => Some(result),
            Self::Failure { .. } => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ToolResponse<U> {
        match self {
            Self::Success { result, message } => ToolResponse::Success {
                result: f(result),
                message,
            },
            Self::Failure { error, message } => ToolResponse::Failure { error, message },
        }
    }
}

impl<T: Serialize> ToolResponse<T> {
    /// Serialize to JSON for relaying back to the model.
    ///
    /// A payload that fails to serialize degrades to an `UNKNOWN` failure.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Success { result, message } => match serde_json::to_value(result) {
                Ok(result) => serde_json::json!({
                    "success": true,
                    "result": result,
                    "message": message,
                }),
                Err(e) => serde_json::json!({
                    "success": false,
                    "error": ErrorCode::Unknown,
                    "message": format!("failed to serialize result: {e}"),
                }),
            },
            Self::Failure { error, message } => serde_json::json!({
                "success": false,
                "error": error,
                "message": message,
            }),
        }
    }
}

impl<T: Serialize> Serialize for ToolResponse<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::ToolResponse;
    use crate::ErrorCode;
    use serde_json::json;

    #[test]
    fn success_serializes_with_discriminator() {
        let resp = ToolResponse::success(json!({"bytes": 3}), "Wrote 3 bytes");
        assert_eq!(
            resp.to_json(),
            json!({"success": true, "result": {"bytes": 3}, "message": "Wrote 3 bytes"})
        );
    }

    #[test]
    fn failure_serializes_error_code() {
        let resp: ToolResponse<()> = ToolResponse::failure(ErrorCode::NotFound, "missing.txt");
        assert_eq!(
            serde_json::to_value(&resp).unwrap(),
            json!({"success": false, "error": "NOT_FOUND", "message": "missing.txt"})
        );
        assert_eq!(resp.error(), Some(ErrorCode::NotFound));
        assert!(!resp.is_success());
    }

    #[test]
    fn map_preserves_failure() {
        let resp: ToolResponse<u32> = ToolResponse::failure(ErrorCode::IoError, "disk full");
        let mapped = resp.map(|n| n + 1);
        assert_eq!(mapped.error(), Some(ErrorCode::IoError));
        assert_eq!(mapped.message(), "disk full");
    }
}
