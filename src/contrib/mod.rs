//! Contribution vocabulary shared by every contributor and the collector.
//!
//! A contributor supplies a slice of the sandbox configuration (mounts,
//! environment variables, packages, tmpfiles rules, prompt text, generated
//! files) without knowing about any other contributor. The [`Collector`]
//! merges those slices into one [`Contributions`] value.

mod capability;
mod collector;
pub mod extras;
pub mod identity;
pub mod policy;
pub mod proxy;
pub mod secrets;
pub mod system_prompt;
pub mod tmpfiles;
pub mod workspace;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub use capability::{Capability, CapabilityKind, Contributor};
pub use collector::{CollectError, Collector, dedup_init_rules};

use crate::manifest::nix;

/// A bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mount {
    /// Path on the host
    pub host_path: PathBuf,
    /// Path inside the container
    pub container_path: PathBuf,
    pub read_only: bool,
}

impl Mount {
    /// Create a read-write mount
    pub fn rw(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: false,
        }
    }

    /// Create a read-only mount
    pub fn ro(host_path: impl Into<PathBuf>, container_path: impl Into<PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            container_path: container_path.into(),
            read_only: true,
        }
    }

    /// Mount a host path at the same location inside the container.
    pub fn same_path(path: impl Into<PathBuf>, read_only: bool) -> Self {
        let path = path.into();
        Self {
            container_path: path.clone(),
            host_path: path,
            read_only,
        }
    }
}

/// A session environment variable.
///
/// `value` is a Nix expression, already quoted by the contributor. The
/// renderer writes it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

impl EnvVar {
    /// Variable whose value is a plain string literal.
    pub fn string(name: impl Into<String>, value: &str) -> Self {
        Self {
            name: name.into(),
            value: nix::string(value),
        }
    }

    /// Variable whose value is an arbitrary (pre-quoted) Nix expression.
    pub fn expr(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// An abstract package request, resolved by the reproducibility layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: String,
    /// Requested version. `None` and `Some("")` both mean unpinned.
    pub version: Option<String>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
        }
    }

    pub fn versioned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: Some(version.into()),
        }
    }

    /// The requested version, treating an empty string as unpinned.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref().filter(|v| !v.is_empty())
    }
}

/// A `systemd-tmpfiles` rule line. Compared by exact text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct InitRule(String);

impl InitRule {
    pub fn new(rule: impl Into<String>) -> Self {
        Self(rule.into())
    }

    /// `d <path> <mode> <user> <group> -`
    pub fn directory(path: &Path, mode: &str, user: &str, group: &str) -> Self {
        Self(format!("d {} {} {} {} -", path.display(), mode, user, group))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InitRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sections of the agent system prompt, in rendering order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptSection {
    Environment,
    VersionControl,
    Identity,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptFragment {
    pub section: PromptSection,
    /// Lower renders first within a section
    pub priority: i32,
    pub content: String,
}

impl PromptFragment {
    pub fn new(section: PromptSection, priority: i32, content: impl Into<String>) -> Self {
        Self {
            section,
            priority,
            content: content.into(),
        }
    }
}

/// A file produced at build time and exposed to the container by a
/// [`crate::mounter::FileMounter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub container_path: PathBuf,
    pub content: Vec<u8>,
    /// Unix permission bits of the host-side file
    pub mode: u32,
    pub read_only: bool,
}

/// Aggregated output of one collection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Contributions {
    pub mounts: Vec<Mount>,
    pub env_vars: Vec<EnvVar>,
    pub packages: Vec<Package>,
    /// Deduplicated, first occurrence wins
    pub init_rules: Vec<InitRule>,
    /// Sorted by (section, priority)
    pub prompt_fragments: Vec<PromptFragment>,
}

/// Context for mount contributions.
#[derive(Debug, Clone, Default)]
pub struct MountRequest {
    pub workspace: PathBuf,
    pub source_repo: Option<PathBuf>,
    pub secrets_path: Option<PathBuf>,
}

/// Context for environment variable contributions.
#[derive(Debug, Clone, Default)]
pub struct EnvVarRequest {
    pub sandbox_name: String,
    pub secrets_path: Option<PathBuf>,
    pub proxy_url: Option<String>,
}

/// Context for tmpfiles rule contributions.
#[derive(Debug, Clone, Default)]
pub struct TmpfilesRequest {
    pub home_dir: PathBuf,
    pub username: String,
}

/// Context for package contributions.
#[derive(Debug, Clone, Default)]
pub struct PackageRequest {
    pub sandbox_name: String,
}

/// Context for system prompt contributions.
#[derive(Debug, Clone, Default)]
pub struct PromptRequest {
    pub sandbox_name: String,
    /// Workspace path inside the container
    pub workspace: PathBuf,
    pub source_repo: Option<PathBuf>,
    pub proxy_url: Option<String>,
}

/// Context for generated file contributions.
#[derive(Debug, Clone, Default)]
pub struct GeneratedFileRequest {
    pub sandbox_name: String,
}

/// One request context per contribution kind.
#[derive(Debug, Clone, Default)]
pub struct Requests {
    pub mount: MountRequest,
    pub package: PackageRequest,
    pub env_var: EnvVarRequest,
    pub tmpfiles: TmpfilesRequest,
    pub prompt: PromptRequest,
    pub generated_file: GeneratedFileRequest,
}
