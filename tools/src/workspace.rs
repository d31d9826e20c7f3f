//! Workspace root resolution and the per-process workspace context.
//!
//! The root comes from an environment override, a config value, or the
//! current directory. When both an override and a config value are present
//! the config may only narrow the override, checked against real
//! (symlink-followed) paths.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;
use tracing::{debug, warn};
use warden_types::ErrorCode;

use crate::ToolError;
use crate::config::{ConfigError, EnvOverrides, FileLimits, FileToolsConfig};
use crate::sandbox::{self, lexical_normalize};

/// Where the effective workspace root came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootSource {
    Env,
    Config,
    Cwd,
}

/// Outcome of root resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootResolution {
    pub root: PathBuf,
    pub source: RootSource,
    /// Set when a config value was rejected in favour of the env override.
    pub warning: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RootError {
    #[error("cannot determine current directory: {0}")]
    CurrentDir(#[source] io::Error),
    #[error("cannot expand '~' in {raw}: home directory is unknown")]
    NoHome { raw: String },
    #[error("workspace root {} does not exist", path.display())]
    Missing { path: PathBuf },
    #[error("workspace root {} is not a directory", path.display())]
    NotADirectory { path: PathBuf },
    #[error("failed to resolve workspace root {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl RootError {
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            RootError::Missing { .. } => ErrorCode::NotFound,
            RootError::NotADirectory { .. } | RootError::NoHome { .. } | RootError::Config(_) => {
                ErrorCode::ValidationError
            }
            RootError::CurrentDir(source) | RootError::Io { source, .. } => {
                crate::guards::map_io_error(source)
            }
        }
    }
}

/// Computes the workspace root and remembers the effective override.
///
/// Accepting a config value replaces the override so later resolutions see
/// the narrowed root. The override is expected to be set once at startup.
#[derive(Debug, Default)]
pub struct WorkspaceRootResolver {
    effective: RwLock<Option<String>>,
}

impl WorkspaceRootResolver {
    #[must_use]
    pub fn new(env_root: Option<String>) -> Self {
        Self {
            effective: RwLock::new(env_root.filter(|s| !s.trim().is_empty())),
        }
    }

    #[must_use]
    pub fn from_env(env: &EnvOverrides) -> Self {
        Self::new(env.workspace_root.clone())
    }

    /// The override currently in effect, if any.
    #[must_use]
    pub fn effective_override(&self) -> Option<String> {
        self.effective
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolve the root and publish an accepted config value as the new override.
    pub fn resolve(&self, config_root: Option<&str>) -> Result<RootResolution, RootError> {
        let env_root = self.effective_override();
        let resolution = compute_root(env_root.as_deref(), config_root)?;
        if let Some(warning) = &resolution.warning {
            warn!(root = %resolution.root.display(), "{warning}");
        }
        if resolution.source == RootSource::Config {
            let published = resolution.root.to_string_lossy().into_owned();
            debug!(root = %published, "Publishing configured workspace root");
            *self
                .effective
                .write()
                .unwrap_or_else(PoisonError::into_inner) = Some(published);
        }
        Ok(resolution)
    }

    /// Same resolution as [`Self::resolve`] without publishing anything.
    pub fn preview(&self, config_root: Option<&str>) -> Result<RootResolution, RootError> {
        compute_root(self.effective_override().as_deref(), config_root)
    }
}

fn compute_root(env_root: Option<&str>, config_root: Option<&str>) -> Result<RootResolution, RootError> {
    let config_root = config_root.map(str::trim).filter(|s| !s.is_empty());
    match (env_root, config_root) {
        (None, None) => Ok(RootResolution {
            root: current_dir()?,
            source: RootSource::Cwd,
            warning: None,
        }),
        (Some(env), None) => Ok(RootResolution {
            root: absolutize(&expand_home(env)?, &current_dir_lazy(env)?),
            source: RootSource::Env,
            warning: None,
        }),
        (None, Some(config)) => Ok(RootResolution {
            root: absolutize(&expand_home(config)?, &current_dir_lazy(config)?),
            source: RootSource::Config,
            warning: None,
        }),
        (Some(env), Some(config)) => narrow(env, config),
    }
}

/// Accept `config` only if its real location sits under the env root.
fn narrow(env: &str, config: &str) -> Result<RootResolution, RootError> {
    let env_root = absolutize(&expand_home(env)?, &current_dir_lazy(env)?);
    let config_path = absolutize(&expand_home(config)?, &env_root);
    let env_real = std::fs::canonicalize(&env_root).unwrap_or_else(|_| env_root.clone());

    let escape = match real_via_ancestors(&config_path)? {
        RealPath::Resolved(real) if real.starts_with(&env_real) => {
            return Ok(RootResolution {
                root: real,
                source: RootSource::Config,
                warning: None,
            });
        }
        RealPath::Resolved(_) | RealPath::Unverifiable => {
            config_path.starts_with(&env_root) || config_path.starts_with(&env_real)
        }
    };
    let reason = if escape {
        "a symlink on its path resolves outside"
    } else {
        "it lies outside"
    };
    Ok(RootResolution {
        root: env_root.clone(),
        source: RootSource::Env,
        warning: Some(format!(
            "Ignoring configured workspace root '{config}': {reason} the environment workspace root '{}'",
            env_root.display()
        )),
    })
}

enum RealPath {
    Resolved(PathBuf),
    /// A dangling symlink sits on the path.
    Unverifiable,
}

/// Real path of `path`, or of its nearest existing ancestor joined with the
/// missing suffix.
fn real_via_ancestors(path: &Path) -> Result<RealPath, RootError> {
    let mut missing = Vec::new();
    let mut current = path;
    loop {
        match std::fs::canonicalize(current) {
            Ok(mut real) => {
                for part in missing.iter().rev() {
                    real.push(part);
                }
                return Ok(RealPath::Resolved(real));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                if std::fs::symlink_metadata(current).is_ok() {
                    return Ok(RealPath::Unverifiable);
                }
                let (Some(name), Some(parent)) = (current.file_name(), current.parent()) else {
                    return Ok(RealPath::Resolved(path.to_path_buf()));
                };
                missing.push(name.to_os_string());
                current = parent;
            }
            Err(source) => {
                return Err(RootError::Io {
                    path: current.to_path_buf(),
                    source,
                });
            }
        }
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(raw: &str) -> Result<PathBuf, RootError> {
    let home = || {
        dirs::home_dir().ok_or_else(|| RootError::NoHome {
            raw: raw.to_string(),
        })
    };
    if raw == "~" {
        return home();
    }
    if let Some(rest) = raw.strip_prefix("~/") {
        return Ok(home()?.join(rest));
    }
    Ok(PathBuf::from(raw))
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        lexical_normalize(path)
    } else {
        lexical_normalize(&base.join(path))
    }
}

fn current_dir() -> Result<PathBuf, RootError> {
    std::env::current_dir().map_err(RootError::CurrentDir)
}

/// Current directory only when `raw` is relative and will need it.
fn current_dir_lazy(raw: &str) -> Result<PathBuf, RootError> {
    if raw.starts_with('~') || Path::new(raw).is_absolute() {
        Ok(PathBuf::new())
    } else {
        current_dir()
    }
}

/// Immutable per-process view of the sandbox, passed into every tool call.
#[derive(Debug, Clone)]
pub struct WorkspaceContext {
    root: PathBuf,
    source: RootSource,
    writes_enabled: bool,
    limits: FileLimits,
}

impl WorkspaceContext {
    /// Canonicalize the resolved root. Nothing is created.
    pub fn new(
        resolution: &RootResolution,
        writes_enabled: bool,
        limits: FileLimits,
    ) -> Result<Self, RootError> {
        let root = std::fs::canonicalize(&resolution.root).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                RootError::Missing {
                    path: resolution.root.clone(),
                }
            } else {
                RootError::Io {
                    path: resolution.root.clone(),
                    source,
                }
            }
        })?;
        if !root.is_dir() {
            return Err(RootError::NotADirectory { path: root });
        }
        Ok(Self {
            root,
            source: resolution.source,
            writes_enabled,
            limits,
        })
    }

    /// Resolve the root from env and config, then build the context.
    pub fn initialize(
        resolver: &WorkspaceRootResolver,
        env: &EnvOverrides,
        config: &FileToolsConfig,
    ) -> Result<Self, RootError> {
        let limits = config.limits()?;
        let resolution = resolver.resolve(config.workspace_root())?;
        let ctx = Self::new(&resolution, env.writes_enabled, limits)?;
        debug!(
            root = %ctx.root.display(),
            source = ?ctx.source,
            writes_enabled = ctx.writes_enabled,
            "Workspace initialized"
        );
        Ok(ctx)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn source(&self) -> RootSource {
        self.source
    }

    #[must_use]
    pub fn writes_enabled(&self) -> bool {
        self.writes_enabled
    }

    #[must_use]
    pub fn limits(&self) -> &FileLimits {
        &self.limits
    }

    pub(crate) fn ensure_writable(&self, tool: &'static str) -> Result<(), ToolError> {
        if self.writes_enabled {
            Ok(())
        } else {
            Err(ToolError::WritesDisabled { tool })
        }
    }

    /// Lexical resolution only.
    pub fn resolve_lexical(&self, path: &str) -> Result<PathBuf, ToolError> {
        sandbox::resolve_basic(path, &self.root)
    }

    /// Real path of an existing target inside the workspace.
    pub async fn resolve_existing(&self, path: &str) -> Result<PathBuf, ToolError> {
        sandbox::resolve_safe(path, &self.root, true).await
    }

    /// Path of a target that may not exist yet but is safe to create.
    pub async fn resolve_for_write(&self, path: &str) -> Result<PathBuf, ToolError> {
        sandbox::resolve_safe(path, &self.root, false).await
    }

    pub(crate) async fn revalidate(&self, path: &Path) -> Result<PathBuf, ToolError> {
        sandbox::revalidate(path, &self.root).await
    }

    /// Workspace-relative display form of an absolute path.
    #[must_use]
    pub fn relative(&self, path: &Path) -> String {
        sandbox::display_relative(path, &self.root)
    }
}
