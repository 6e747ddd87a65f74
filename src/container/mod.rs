//! Sandbox container request: the top-level build input and its validation.

mod builder;
mod identity;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

pub use builder::{MANAGED_SETTINGS_PATH, RenderModel, build};

use crate::contrib::Contributions;
use crate::multiplexer::{MultiplexerKind, Window};
use crate::reproducibility::Reproducibility;

/// Default user account inside the sandbox
pub const DEFAULT_USERNAME: &str = "agent";

/// Default workspace path inside the sandbox
pub const DEFAULT_WORKSPACE: &str = "/workspace";

pub const MIN_SLOT: u32 = 1;
pub const MAX_SLOT: u32 = 254;

/// NixOS limit for `privateNetwork` containers (the host veth is `ve-<name>`)
pub const MAX_NAME_LEN: usize = 11;

static NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("valid regex"));

/// A request field violated its invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("name: must not be empty")]
    EmptyName,
    #[error("name: '{0}' may only contain letters, digits, '-' and '_'")]
    InvalidName(String),
    #[error("name: '{0}' is longer than 11 characters")]
    NameTooLong(String),
    #[error("slot: {0} is outside 1..=254")]
    SlotOutOfRange(u32),
    #[error("authorized_keys: at least one public key is required")]
    NoAuthorizedKeys,
    #[error("template: an agent template is required")]
    MissingTemplate,
    #[error("contributions: collected contributions are required")]
    MissingContributions,
    #[error("reproducibility: a package resolver is required")]
    MissingReproducibility,
}

/// Check a sandbox name. Names become path components on the host, so only
/// a conservative character set is accepted.
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if !NAME.is_match(name) {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong(name.to_string()));
    }
    Ok(())
}

/// One agent declared by a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    /// Installable reference for the agent binary (e.g. `pkgs.claude-code`)
    #[serde(default)]
    pub package: Option<String>,
}

impl AgentSpec {
    pub fn package(&self) -> Option<&str> {
        self.package.as_deref().filter(|p| !p.is_empty())
    }
}

/// Describes which agents a sandbox runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentTemplate {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl AgentTemplate {
    pub fn agent_names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }
}

/// Git/jj author and SSH key for the sandbox user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default)]
    pub git_user: Option<String>,
    #[serde(default)]
    pub git_email: Option<String>,
    /// Host path of the SSH private key
    #[serde(default)]
    pub ssh_key: Option<PathBuf>,
}

impl Identity {
    pub fn git_user(&self) -> Option<&str> {
        self.git_user.as_deref().filter(|s| !s.is_empty())
    }

    pub fn git_email(&self) -> Option<&str> {
        self.git_email.as_deref().filter(|s| !s.is_empty())
    }

    /// Basename of the SSH key, if one is configured.
    pub fn ssh_key_name(&self) -> Option<String> {
        self.ssh_key
            .as_deref()
            .and_then(Path::file_name)
            .map(|n| n.to_string_lossy().into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.git_user().is_none() && self.git_email().is_none() && self.ssh_key_name().is_none()
    }
}

/// Managed settings document restricting what the agent may do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionPolicy {
    /// Host path of the rendered policy JSON
    pub host_path: PathBuf,
}

/// cgroup caps applied to the sandbox session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU quota in percent of one core (200 = two cores)
    #[serde(default)]
    pub cpu_quota_percent: Option<u32>,
    /// systemd memory size, e.g. `4G`
    #[serde(default)]
    pub memory_max: Option<String>,
    #[serde(default)]
    pub tasks_max: Option<u32>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.cpu_quota_percent.is_none()
            && self.memory_max.as_deref().is_none_or(str::is_empty)
            && self.tasks_max.is_none()
    }
}

/// Everything needed to build one sandbox's render model.
#[derive(Clone)]
pub struct ContainerConfig {
    pub name: String,
    /// Selects the `10.100.<slot>.0/24` addressing block
    pub slot: u32,
    pub authorized_keys: Vec<String>,
    pub uid: u32,
    pub gid: u32,
    pub username: String,
    /// Workspace path inside the container
    pub workspace: PathBuf,
    pub multiplexer: Option<MultiplexerKind>,
    pub template: Option<AgentTemplate>,
    /// Explicit window list; defaults to one window per agent
    pub windows: Option<Vec<Window>>,
    pub identity: Option<Identity>,
    pub permission_policy: Option<PermissionPolicy>,
    pub resource_limits: Option<ResourceLimits>,
    /// Pre-rendered nftables ruleset
    pub network_policy: Option<String>,
    pub contributions: Option<Contributions>,
    pub reproducibility: Option<Arc<dyn Reproducibility + Send + Sync>>,
}

impl ContainerConfig {
    pub fn new(name: impl Into<String>, slot: u32) -> Self {
        Self {
            name: name.into(),
            slot,
            authorized_keys: Vec::new(),
            uid: 1000,
            gid: 100,
            username: DEFAULT_USERNAME.to_string(),
            workspace: PathBuf::from(DEFAULT_WORKSPACE),
            multiplexer: None,
            template: None,
            windows: None,
            identity: None,
            permission_policy: None,
            resource_limits: None,
            network_policy: None,
            contributions: None,
            reproducibility: None,
        }
    }

    pub fn home_dir(&self) -> PathBuf {
        PathBuf::from("/home").join(&self.username)
    }

    /// Check the request invariants, reporting the first violated field.
    ///
    /// Pure: safe to call any number of times.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        if !(MIN_SLOT..=MAX_SLOT).contains(&self.slot) {
            return Err(ValidationError::SlotOutOfRange(self.slot));
        }
        if self.authorized_keys.iter().all(|k| k.trim().is_empty()) {
            return Err(ValidationError::NoAuthorizedKeys);
        }
        if self.template.is_none() {
            return Err(ValidationError::MissingTemplate);
        }
        if self.contributions.is_none() {
            return Err(ValidationError::MissingContributions);
        }
        if self.reproducibility.is_none() {
            return Err(ValidationError::MissingReproducibility);
        }
        Ok(())
    }
}
