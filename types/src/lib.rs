//! Core domain types for Warden.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod response;
mod text;

pub use response::ToolResponse;
pub use text::{truncate_snippet, truncate_to_fit};

use serde::{Deserialize, Serialize};

// ============================================================================
// Error taxonomy
// ============================================================================

/// Closed error taxonomy shared by every file operation.
///
/// Stable across operations so the driving model can branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Target (or a required ancestor) does not exist.
    NotFound,
    /// Sandbox violation, writes disabled, or an OS permission error.
    PermissionDenied,
    /// Bad arguments, binary/oversized content, malformed or mismatched patch.
    ValidationError,
    /// Any other filesystem failure, including resource exhaustion.
    IoError,
    /// Failure that did not originate from the filesystem.
    Unknown,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::IoError => "IO_ERROR",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tool definitions
// ============================================================================

/// Definition of a tool that can be called by the driving model.
///
/// This follows the standard function calling schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The name of the tool (function name).
    pub name: String,
    /// A description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;

    #[test]
    fn error_codes_serialize_screaming_snake() {
        let json = serde_json::to_string(&ErrorCode::PermissionDenied).unwrap();
        assert_eq!(json, "\"PERMISSION_DENIED\"");
        let json = serde_json::to_string(&ErrorCode::ValidationError).unwrap();
        assert_eq!(json, "\"VALIDATION_ERROR\"");
    }

    #[test]
    fn display_matches_wire_name() {
        for code in [
            ErrorCode::NotFound,
            ErrorCode::PermissionDenied,
            ErrorCode::ValidationError,
            ErrorCode::IoError,
            ErrorCode::Unknown,
        ] {
            let wire = serde_json::to_value(code).unwrap();
            assert_eq!(wire.as_str(), Some(code.to_string().as_str()));
        }
    }
}
