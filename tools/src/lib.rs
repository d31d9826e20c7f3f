//! Sandboxed file tools - workspace confinement, unified-diff patching, and
//! atomic writes for an agent editing files inside one workspace directory.

pub mod builtins;
pub mod config;
pub mod guards;
pub mod sandbox;
pub mod unified_diff;
pub mod walk;
pub mod workspace;

use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::pin::Pin;

use serde_json::Value;
use warden_types::{ErrorCode, ToolDefinition, ToolResponse};

pub use builtins::register_builtins;
pub use config::{EnvOverrides, FileLimits, FileToolsConfig};
pub use unified_diff::{PatchErrorKind, PatchParseError};
pub use workspace::{RootResolution, RootSource, WorkspaceContext, WorkspaceRootResolver};

/// Tool execution future type alias.
pub type ToolFut<'a> = Pin<Box<dyn Future<Output = ToolResponse<Value>> + Send + 'a>>;

/// Error types for tool execution.
///
/// Every variant folds into exactly one [`ErrorCode`] at the tool boundary.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Bad tool args: {message}")]
    BadArgs { message: String },
    #[error("{message}")]
    Validation { message: String },
    #[error("{message}")]
    NotFound { message: String },
    #[error("Sandbox violation: {0}")]
    SandboxViolation(DenialReason),
    #[error("Writes are disabled for this workspace; {tool} is unavailable")]
    WritesDisabled { tool: &'static str },
    #[error("Patch failed: {0}")]
    Patch(#[from] PatchParseError),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to commit {}: {source}", path.display())]
    CommitFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
    #[error("Duplicate tool registered: {name}")]
    DuplicateTool { name: String },
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ToolError {
    pub(crate) fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn bad_args(message: impl Into<String>) -> Self {
        Self::BadArgs {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            ToolError::BadArgs { .. }
            | ToolError::Validation { .. }
            | ToolError::Patch(_)
            | ToolError::UnknownTool { .. }
            | ToolError::DuplicateTool { .. } => ErrorCode::ValidationError,
            ToolError::NotFound { .. } => ErrorCode::NotFound,
            ToolError::SandboxViolation(_) | ToolError::WritesDisabled { .. } => {
                ErrorCode::PermissionDenied
            }
            ToolError::Io { source, .. } => guards::map_io_error(source),
            ToolError::CommitFailed { .. } => ErrorCode::IoError,
            ToolError::Internal { .. } => ErrorCode::Unknown,
        }
    }
}

impl<T> From<ToolError> for ToolResponse<T> {
    fn from(err: ToolError) -> Self {
        ToolResponse::failure(err.code(), err.to_string())
    }
}

/// Denial reason for sandbox violations.
#[derive(Debug, Clone)]
pub enum DenialReason {
    ParentTraversal {
        attempted: String,
    },
    OutsideRoot {
        attempted: PathBuf,
        root: PathBuf,
    },
    SymlinkEscape {
        attempted: PathBuf,
        resolved: PathBuf,
    },
    ParentSymlinkEscape {
        attempted: PathBuf,
        ancestor: PathBuf,
        resolved: PathBuf,
    },
    DanglingSymlink {
        attempted: PathBuf,
    },
}

impl std::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DenialReason::ParentTraversal { attempted } => {
                write!(f, "path contains a '..' segment: {attempted}")
            }
            DenialReason::OutsideRoot { attempted, root } => write!(
                f,
                "path outside workspace (attempted: {}, root: {})",
                attempted.display(),
                root.display()
            ),
            DenialReason::SymlinkEscape {
                attempted,
                resolved,
            } => write!(
                f,
                "symlink resolves outside workspace (attempted: {}, resolved: {})",
                attempted.display(),
                resolved.display()
            ),
            DenialReason::ParentSymlinkEscape {
                attempted,
                ancestor,
                resolved,
            } => write!(
                f,
                "parent directory symlink resolves outside workspace (attempted: {}, ancestor: {} -> {})",
                attempted.display(),
                ancestor.display(),
                resolved.display()
            ),
            DenialReason::DanglingSymlink { attempted } => write!(
                f,
                "dangling symlink on path cannot be verified: {}",
                attempted.display()
            ),
        }
    }
}

/// A named file operation the orchestrator can invoke.
pub trait ToolExecutor: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> Value;
    fn is_side_effecting(&self, args: &Value) -> bool;
    fn execute<'a>(&'a self, args: Value, ctx: &'a WorkspaceContext) -> ToolFut<'a>;
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::BadArgs {
        message: e.to_string(),
    })
}

/// Tool registry keyed by tool name.
#[derive(Default)]
pub struct ToolRegistry {
    executors: HashMap<String, Box<dyn ToolExecutor>>,
}

impl ToolRegistry {
    /// A registry pre-populated with every built-in file tool.
    pub fn with_builtins() -> Result<Self, ToolError> {
        let mut registry = Self::default();
        register_builtins(&mut registry)?;
        Ok(registry)
    }

    pub fn register(&mut self, executor: Box<dyn ToolExecutor>) -> Result<(), ToolError> {
        let name = executor.name().to_string();
        if self.executors.contains_key(&name) {
            return Err(ToolError::DuplicateTool { name });
        }
        self.executors.insert(name, executor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&dyn ToolExecutor, ToolError> {
        self.executors
            .get(name)
            .map(std::convert::AsRef::as_ref)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .executors
            .values()
            .map(|exec| ToolDefinition::new(exec.name(), exec.description(), exec.schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Dispatch a call by tool name. Unknown tools yield a `VALIDATION_ERROR` response.
    pub async fn execute(
        &self,
        name: &str,
        args: Value,
        ctx: &WorkspaceContext,
    ) -> ToolResponse<Value> {
        match self.lookup(name) {
            Ok(tool) => tool.execute(args, ctx).await,
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DenialReason, ToolError, ToolRegistry};
    use std::io;
    use std::path::PathBuf;
    use warden_types::{ErrorCode, ToolResponse};

    #[test]
    fn error_codes_follow_taxonomy() {
        assert_eq!(
            ToolError::bad_args("x").code(),
            ErrorCode::ValidationError
        );
        assert_eq!(
            ToolError::SandboxViolation(DenialReason::ParentTraversal {
                attempted: "../x".to_string()
            })
            .code(),
            ErrorCode::PermissionDenied
        );
        assert_eq!(
            ToolError::WritesDisabled { tool: "write_file" }.code(),
            ErrorCode::PermissionDenied
        );
        assert_eq!(
            ToolError::io("open", io::Error::from(io::ErrorKind::NotFound)).code(),
            ErrorCode::NotFound
        );
        assert_eq!(
            ToolError::CommitFailed {
                path: PathBuf::from("x"),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            }
            .code(),
            ErrorCode::IoError
        );
        assert_eq!(
            ToolError::Internal {
                message: "panic".to_string()
            }
            .code(),
            ErrorCode::Unknown
        );
    }

    #[test]
    fn tool_error_converts_to_failure_response() {
        let resp: ToolResponse<()> = ToolError::NotFound {
            message: "missing.txt does not exist".to_string(),
        }
        .into();
        assert_eq!(resp.error(), Some(ErrorCode::NotFound));
        assert_eq!(resp.message(), "missing.txt does not exist");
    }

    #[test]
    fn builtins_register_once_and_sort() {
        let mut registry = ToolRegistry::with_builtins().unwrap();
        let names: Vec<String> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "apply_file_patch",
                "apply_text_edit",
                "file_info",
                "list_directory",
                "read_file",
                "search_files",
                "write_file",
            ]
        );
        assert!(super::register_builtins(&mut registry).is_err());
    }

    #[test]
    fn lookup_unknown_tool_fails() {
        let registry = ToolRegistry::default();
        let err = registry.lookup("nope").err().unwrap();
        assert_eq!(err.code(), ErrorCode::ValidationError);
    }
}
