//! Turns a validated [`ContainerConfig`] into a renderer-ready model.

use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, warn};

use super::{ContainerConfig, ResourceLimits, ValidationError, identity};
use crate::contrib::system_prompt::SYSTEM_PROMPT_FILENAME;
use crate::contrib::{EnvVar, InitRule, Mount, dedup_init_rules};
use crate::manifest::nix;
use crate::multiplexer::{self, MultiplexerKind, SESSION_NAME, Window};
use crate::reproducibility::{RegistryPin, Reproducibility};
use crate::shell;

/// Where the permission policy document is mounted
pub const MANAGED_SETTINGS_PATH: &str = "/etc/claude-code/managed-settings.json";

/// Agent whose binary is wrapped to receive the system prompt
const WRAPPED_AGENT: &str = "claude";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityModel {
    pub git_user: Option<String>,
    pub git_email: Option<String>,
    pub ssh_key_name: Option<String>,
    pub script: String,
}

/// A `writeShellScriptBin` standing in for the claude package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaudeWrapper {
    /// The package reference the wrapper replaces
    pub package: String,
    /// Container path of the mounted system prompt
    pub prompt_path: String,
    /// Wrapper body, already escaped for a Nix indented string. The
    /// package reference is a live interpolation.
    pub script: String,
}

/// Flattened projection of a [`ContainerConfig`] for the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderModel {
    pub name: String,
    pub host_address: String,
    pub local_address: String,
    pub username: String,
    pub uid: u32,
    pub gid: u32,
    pub home_dir: String,
    pub workspace: String,
    pub authorized_keys: Vec<String>,
    pub mounts: Vec<Mount>,
    pub packages: Vec<String>,
    pub env_vars: Vec<EnvVar>,
    pub init_rules: Vec<InitRule>,
    pub multiplexer: MultiplexerKind,
    pub session_name: String,
    pub windows: Vec<Window>,
    pub init_script: String,
    pub registry_pin: Option<RegistryPin>,
    pub resource_limits: Option<ResourceLimits>,
    pub identity: Option<IdentityModel>,
    pub permission_policy: Option<Mount>,
    pub claude_wrapper: Option<ClaudeWrapper>,
    pub network_policy: Option<String>,
}

/// Build the render model. Fails only on validation errors.
pub fn build(config: &ContainerConfig) -> Result<RenderModel, ValidationError> {
    config.validate()?;

    // validate() guarantees all three are present
    let (Some(template), Some(contributions), Some(repro)) = (
        config.template.as_ref(),
        config.contributions.as_ref(),
        config.reproducibility.as_ref(),
    ) else {
        return Err(ValidationError::MissingTemplate);
    };

    let home_dir = config.home_dir();
    let kind = config.multiplexer.unwrap_or_default();
    let backend = multiplexer::create_backend(kind);
    let windows =
        multiplexer::resolve_windows(config.windows.as_deref(), &template.agent_names());
    let init_script = backend.init_script(&windows, &config.workspace);

    let mut mounts = vec![repro.store_mount()];
    mounts.extend(contributions.mounts.iter().cloned());

    let own_rule = InitRule::directory(
        &home_dir.join(".config"),
        "0755",
        &config.username,
        "users",
    );
    let init_rules = dedup_init_rules(
        std::iter::once(own_rule).chain(contributions.init_rules.iter().cloned()),
    );

    let mut packages = PackageList::default();
    packages.extend(repro.base_packages());
    packages.extend(backend.packages());
    for package in &contributions.packages {
        match repro.resolve_package(package) {
            Ok(reference) => packages.push(reference),
            Err(err) => warn!(package = %package.name, error = %err, "build:dropping package"),
        }
    }
    for agent in &template.agents {
        match agent.package() {
            Some(reference) if repro.is_installable(reference) => {
                packages.push(reference.to_string())
            }
            Some(reference) => {
                warn!(agent = %agent.name, package = reference, "build:dropping agent package")
            }
            None => {}
        }
    }
    let mut packages = packages.into_vec();

    let claude_wrapper = claude_wrapper(config, &**repro, &mounts);
    if let Some(wrapper) = &claude_wrapper {
        debug!(package = %wrapper.package, "build:substituting claude wrapper");
        packages.retain(|p| p != &wrapper.package);
    }

    let identity = config
        .identity
        .as_ref()
        .filter(|i| !i.is_empty())
        .map(|i| IdentityModel {
            git_user: i.git_user().map(str::to_string),
            git_email: i.git_email().map(str::to_string),
            ssh_key_name: i.ssh_key_name(),
            script: identity::setup_script(i),
        });

    let permission_policy = config
        .permission_policy
        .as_ref()
        .map(|p| Mount::ro(p.host_path.clone(), MANAGED_SETTINGS_PATH));

    let model = RenderModel {
        name: config.name.clone(),
        host_address: format!("10.100.{}.1", config.slot),
        local_address: format!("10.100.{}.2", config.slot),
        username: config.username.clone(),
        uid: config.uid,
        gid: config.gid,
        home_dir: home_dir.to_string_lossy().into_owned(),
        workspace: config.workspace.to_string_lossy().into_owned(),
        authorized_keys: config
            .authorized_keys
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect(),
        mounts,
        packages,
        env_vars: contributions.env_vars.clone(),
        init_rules,
        multiplexer: kind,
        session_name: SESSION_NAME.to_string(),
        windows,
        init_script,
        registry_pin: repro.registry_pin(),
        resource_limits: config
            .resource_limits
            .clone()
            .filter(|limits| !limits.is_empty()),
        identity,
        permission_policy,
        claude_wrapper,
        network_policy: config
            .network_policy
            .clone()
            .filter(|p| !p.trim().is_empty()),
    };

    debug!(
        name = %model.name,
        mounts = model.mounts.len(),
        packages = model.packages.len(),
        multiplexer = %model.multiplexer,
        "build:model ready"
    );
    Ok(model)
}

/// The claude wrapper applies when a mounted path ends in the system prompt
/// filename and the template declares a `claude` agent with an installable
/// package.
fn claude_wrapper(
    config: &ContainerConfig,
    repro: &(dyn Reproducibility + Send + Sync),
    mounts: &[Mount],
) -> Option<ClaudeWrapper> {
    let prompt_path = mounts.iter().map(|m| &m.container_path).find(|p| {
        p.to_string_lossy().ends_with(SYSTEM_PROMPT_FILENAME)
    })?;
    let package = config
        .template
        .as_ref()?
        .agent(WRAPPED_AGENT)?
        .package()
        .filter(|p| repro.is_installable(p))?
        .to_string();

    let prompt_path = prompt_path.to_string_lossy().into_owned();
    let binary = if package.starts_with('/') {
        format!("{package}/bin/{WRAPPED_AGENT}")
    } else {
        format!("${{{package}}}/bin/{WRAPPED_AGENT}")
    };
    let script = format!(
        "exec {binary} --append-system-prompt \"$(cat {})\" \"$@\"",
        nix::indented(&shell::quote(&prompt_path))
    );

    Some(ClaudeWrapper {
        package,
        prompt_path,
        script,
    })
}

/// Install list that ignores repeated references.
#[derive(Default)]
struct PackageList {
    seen: HashSet<String>,
    items: Vec<String>,
}

impl PackageList {
    fn push(&mut self, reference: String) {
        if self.seen.insert(reference.clone()) {
            self.items.push(reference);
        }
    }

    fn into_vec(self) -> Vec<String> {
        self.items
    }
}

impl Extend<String> for PackageList {
    fn extend<I: IntoIterator<Item = String>>(&mut self, iter: I) {
        for reference in iter {
            self.push(reference);
        }
    }
}
