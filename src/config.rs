use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::container::{AgentSpec, AgentTemplate, Identity, ResourceLimits};
use crate::contrib::Package;
use crate::multiplexer::{MultiplexerKind, Window};
use crate::reproducibility::RegistryPin;

/// List placeholder that expands to the global config's items.
const GLOBAL_PLACEHOLDER: &str = "<global>";

/// Configuration for one sandbox, read from YAML.
///
/// The global file (`~/.config/agentbox/config.yaml`) supplies defaults; the
/// sandbox file passed on the command line wins field by field.
#[derive(Debug, Deserialize, Serialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Sandbox name; also names the container
    #[serde(default)]
    pub name: Option<String>,

    /// Network slot, selects `10.100.<slot>.0/24`
    #[serde(default)]
    pub slot: Option<u32>,

    /// SSH public keys allowed to log in. Supports `<global>`.
    #[serde(default)]
    pub authorized_keys: Option<Vec<String>>,

    /// Account name inside the sandbox. Default: agent
    #[serde(default)]
    pub username: Option<String>,

    /// Account uid. Default: the invoking user's uid
    #[serde(default)]
    pub uid: Option<u32>,

    /// Account gid. Default: the invoking user's gid
    #[serde(default)]
    pub gid: Option<u32>,

    /// Host directory mounted as the workspace. Relative paths resolve
    /// against the sandbox file's directory.
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    /// Repository the workspace worktree was created from
    #[serde(default)]
    pub source_repo: Option<PathBuf>,

    /// Host directory exposed read-only as the secrets directory
    #[serde(default)]
    pub secrets: Option<PathBuf>,

    /// Egress proxy URL
    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default)]
    pub multiplexer: Option<MultiplexerKind>,

    /// Agents to run. Default: a single claude agent
    #[serde(default)]
    pub template: Option<AgentTemplate>,

    /// Explicit multiplexer windows. Default: one per agent
    #[serde(default)]
    pub windows: Option<Vec<Window>>,

    #[serde(default)]
    pub identity: Identity,

    /// Managed settings document for the agent, written as JSON
    #[serde(default)]
    pub permissions: Option<serde_json::Value>,

    #[serde(default)]
    pub limits: ResourceLimits,

    /// Extra packages, `name` or `name@version`. Supports `<global>`.
    #[serde(default)]
    pub packages: Option<Vec<String>>,

    /// Extra session variables. Merged key by key.
    #[serde(default)]
    pub env: Option<BTreeMap<String, String>>,

    /// Extra text appended to the agent system prompt
    #[serde(default)]
    pub prompt: Option<String>,

    /// Pre-rendered nftables ruleset
    #[serde(default)]
    pub network_policy: Option<String>,

    /// nixpkgs registry pin
    #[serde(default)]
    pub nixpkgs: RegistryPin,

    /// Where generated files are written. Default: `$XDG_STATE_HOME/agentbox`
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Config {
    /// Load the global configuration and merge the sandbox file over it.
    pub fn load(sandbox_path: &Path) -> anyhow::Result<Self> {
        debug!(path = %sandbox_path.display(), "config:loading");
        let global_config = Self::load_global()?.unwrap_or_default();
        let mut sandbox_config = Self::load_from_path(sandbox_path)?.ok_or_else(|| {
            anyhow::anyhow!("Config file not found: {}", sandbox_path.display())
        })?;

        let base_dir = sandbox_path.parent().unwrap_or(Path::new("."));
        sandbox_config.resolve_paths(base_dir);

        let config = global_config.merge(sandbox_config);
        debug!(
            name = ?config.name,
            slot = ?config.slot,
            packages = config.packages.as_ref().map_or(0, |p| p.len()),
            "config:loaded"
        );
        Ok(config)
    }

    /// Load configuration from a specific path.
    fn load_from_path(path: &Path) -> anyhow::Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path)?;
        let config = Self::parse(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse config at {}: {}", path.display(), e))?;
        Ok(Some(config))
    }

    fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty file deserializes as null
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    /// Load the global configuration file from the XDG config directory.
    fn load_global() -> anyhow::Result<Option<Self>> {
        if let Some(home_dir) = home::home_dir() {
            let xdg_config_path = home_dir.join(".config/agentbox/config.yaml");
            if xdg_config_path.exists() {
                return Self::load_from_path(&xdg_config_path);
            }
            let xdg_config_path_yml = home_dir.join(".config/agentbox/config.yml");
            if xdg_config_path_yml.exists() {
                return Self::load_from_path(&xdg_config_path_yml);
            }
        }
        Ok(None)
    }

    /// Make host paths in the sandbox file relative to that file.
    fn resolve_paths(&mut self, base_dir: &Path) {
        for path in [
            &mut self.workspace,
            &mut self.source_repo,
            &mut self.secrets,
            &mut self.identity.ssh_key,
            &mut self.state_dir,
        ]
        .into_iter()
        .flatten()
        {
            if path.is_relative() {
                *path = base_dir.join(&*path);
            }
        }
    }

    /// Merge a sandbox config into a global config.
    /// Sandbox config takes precedence. For lists, "<global>" placeholder expands to global items.
    fn merge(self, sandbox: Self) -> Self {
        /// Merge vectors with "<global>" placeholder expansion.
        /// When sandbox contains "<global>", it expands to global items at that position.
        fn merge_vec_with_placeholder(
            global: Option<Vec<String>>,
            sandbox: Option<Vec<String>>,
        ) -> Option<Vec<String>> {
            match (global, sandbox) {
                (Some(global_items), Some(sandbox_items)) => {
                    if sandbox_items.iter().any(|s| s == GLOBAL_PLACEHOLDER) {
                        let mut result = Vec::new();
                        for item in sandbox_items {
                            if item == GLOBAL_PLACEHOLDER {
                                result.extend(global_items.clone());
                            } else {
                                result.push(item);
                            }
                        }
                        Some(result)
                    } else {
                        Some(sandbox_items)
                    }
                }
                (global, sandbox) => sandbox.or(global),
            }
        }

        /// Macro to merge Option fields where the sandbox overrides global.
        macro_rules! merge_options {
            ($global:expr, $sandbox:expr, $($field:ident),+ $(,)?) => {
                Self {
                    $($field: $sandbox.$field.or($global.$field),)+
                    ..Default::default()
                }
            };
        }

        let mut merged = merge_options!(
            self,
            sandbox,
            name,
            slot,
            username,
            uid,
            gid,
            workspace,
            source_repo,
            secrets,
            proxy,
            multiplexer,
            template,
            windows,
            permissions,
            prompt,
            network_policy,
            state_dir,
        );

        // List values with "<global>" placeholder support
        merged.authorized_keys =
            merge_vec_with_placeholder(self.authorized_keys, sandbox.authorized_keys);
        merged.packages = merge_vec_with_placeholder(self.packages, sandbox.packages);

        // Env: sandbox keys override global keys
        merged.env = match (self.env, sandbox.env) {
            (Some(mut global), Some(sandbox)) => {
                global.extend(sandbox);
                Some(global)
            }
            (global, sandbox) => sandbox.or(global),
        };

        // Identity: per-field override
        merged.identity = Identity {
            git_user: sandbox.identity.git_user.or(self.identity.git_user),
            git_email: sandbox.identity.git_email.or(self.identity.git_email),
            ssh_key: sandbox.identity.ssh_key.or(self.identity.ssh_key),
        };

        // Limits: per-field override
        merged.limits = ResourceLimits {
            cpu_quota_percent: sandbox
                .limits
                .cpu_quota_percent
                .or(self.limits.cpu_quota_percent),
            memory_max: sandbox.limits.memory_max.or(self.limits.memory_max),
            tasks_max: sandbox.limits.tasks_max.or(self.limits.tasks_max),
        };

        // Registry pin: per-field override
        merged.nixpkgs = RegistryPin {
            revision: sandbox.nixpkgs.revision.or(self.nixpkgs.revision),
            path: sandbox.nixpkgs.path.or(self.nixpkgs.path),
        };

        merged
    }

    pub fn uid(&self) -> u32 {
        self.uid.unwrap_or_else(|| unsafe { libc::getuid() })
    }

    pub fn gid(&self) -> u32 {
        self.gid.unwrap_or_else(|| unsafe { libc::getgid() })
    }

    /// The configured template, or a single claude agent.
    pub fn template(&self) -> AgentTemplate {
        self.template.clone().unwrap_or_else(|| AgentTemplate {
            name: "default".to_string(),
            agents: vec![AgentSpec {
                name: "claude".to_string(),
                package: Some("pkgs.claude-code".to_string()),
            }],
        })
    }

    /// Configured packages parsed into requests.
    pub fn packages(&self) -> Vec<Package> {
        self.packages
            .iter()
            .flatten()
            .map(|spec| parse_package(spec))
            .collect()
    }

    /// Directory for generated files.
    pub fn state_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.state_dir {
            Some(dir) => Ok(dir.clone()),
            None => state_home(),
        }
    }
}

/// `name` or `name@version`.
pub fn parse_package(spec: &str) -> Package {
    match spec.trim().split_once('@') {
        Some((name, version)) => Package::versioned(name, version),
        None => Package::new(spec.trim()),
    }
}

/// `$XDG_STATE_HOME/agentbox`, falling back to `~/.local/state/agentbox`.
pub fn state_home() -> anyhow::Result<PathBuf> {
    if let Ok(state_home) = std::env::var("XDG_STATE_HOME")
        && !state_home.is_empty()
    {
        return Ok(PathBuf::from(state_home).join("agentbox"));
    }

    if let Some(home_dir) = home::home_dir() {
        return Ok(home_dir.join(".local").join("state").join("agentbox"));
    }

    Err(anyhow::anyhow!("Could not determine home directory"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn parse(yaml: &str) -> Config {
        Config::parse(yaml).unwrap()
    }

    #[test]
    fn parses_full_sandbox_file() {
        let config = parse(
            r#"
name: feature
slot: 3
authorized_keys:
  - ssh-ed25519 AAAA me@laptop
workspace: /home/me/code/app__worktrees/feature
multiplexer: wezterm
template:
  name: duo
  agents:
    - name: claude
      package: pkgs.claude-code
    - name: codex
      package: pkgs.codex
windows:
  - name: main
    command: claude
  - name: scratch
identity:
  git_user: Ada
  git_email: ada@example.com
limits:
  memory_max: 4G
packages:
  - htop
  - nodejs@20
env:
  EDITOR: vi
nixpkgs:
  revision: abc123
permissions:
  permissions:
    deny: ["Bash(rm -rf *)"]
"#,
        );
        assert_eq!(config.name.as_deref(), Some("feature"));
        assert_eq!(config.slot, Some(3));
        assert_eq!(config.multiplexer, Some(MultiplexerKind::WezTerm));
        assert_eq!(config.template().agents.len(), 2);
        assert_eq!(config.windows.as_ref().unwrap()[1].command(), None);
        assert_eq!(config.identity.git_user(), Some("Ada"));
        assert_eq!(config.limits.memory_max.as_deref(), Some("4G"));
        assert_eq!(
            config.packages(),
            vec![Package::new("htop"), Package::versioned("nodejs", "20")]
        );
        assert_eq!(config.nixpkgs.revision.as_deref(), Some("abc123"));
        assert!(config.permissions.is_some());
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(parse(""), Config::default());
    }

    #[test]
    fn unknown_multiplexer_is_rejected() {
        assert!(Config::parse("multiplexer: screen").is_err());
    }

    #[test]
    fn default_template_runs_claude() {
        let template = Config::default().template();
        assert_eq!(template.agent_names(), vec!["claude".to_string()]);
        assert_eq!(
            template.agent("claude").unwrap().package(),
            Some("pkgs.claude-code")
        );
    }

    #[test]
    fn sandbox_overrides_global() {
        let global = parse("slot: 1\nproxy: http://proxy:3128\nusername: dev\n");
        let sandbox = parse("slot: 7\nname: box\n");
        let merged = global.merge(sandbox);
        assert_eq!(merged.slot, Some(7));
        assert_eq!(merged.name.as_deref(), Some("box"));
        assert_eq!(merged.proxy.as_deref(), Some("http://proxy:3128"));
        assert_eq!(merged.username.as_deref(), Some("dev"));
    }

    #[test]
    fn global_placeholder_expands_in_lists() {
        let global = parse("authorized_keys: [key-a, key-b]\npackages: [jq]\n");
        let sandbox = parse("authorized_keys: [key-c, \"<global>\"]\npackages: [htop]\n");
        let merged = global.merge(sandbox);
        assert_eq!(
            merged.authorized_keys,
            Some(vec!["key-c".into(), "key-a".into(), "key-b".into()])
        );
        assert_eq!(merged.packages, Some(vec!["htop".into()]));
    }

    #[test]
    fn global_list_used_when_sandbox_silent() {
        let global = parse("authorized_keys: [key-a]\n");
        let merged = global.merge(Config::default());
        assert_eq!(merged.authorized_keys, Some(vec!["key-a".into()]));
    }

    #[test]
    fn env_and_identity_merge_per_key() {
        let global = parse(
            "env: {EDITOR: vi, PAGER: less}\nidentity: {git_user: Ada, git_email: ada@home}\n",
        );
        let sandbox = parse("env: {EDITOR: hx}\nidentity: {git_email: ada@work}\n");
        let merged = global.merge(sandbox);
        let env = merged.env.unwrap();
        assert_eq!(env["EDITOR"], "hx");
        assert_eq!(env["PAGER"], "less");
        assert_eq!(merged.identity.git_user(), Some("Ada"));
        assert_eq!(merged.identity.git_email(), Some("ada@work"));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("box.yaml");
        fs::write(&path, "name: box\nworkspace: src\nsecrets: /abs/secrets\n").unwrap();

        let mut config = Config::load_from_path(&path).unwrap().unwrap();
        config.resolve_paths(dir.path());

        assert_eq!(config.workspace, Some(dir.path().join("src")));
        assert_eq!(config.secrets, Some(PathBuf::from("/abs/secrets")));
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        assert!(
            Config::load_from_path(&dir.path().join("absent.yaml"))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn parse_package_specs() {
        assert_eq!(parse_package("jq"), Package::new("jq"));
        assert_eq!(
            parse_package(" python3@3.12 "),
            Package::versioned("python3", "3.12")
        );
    }

    #[test]
    fn explicit_state_dir_wins() {
        let config = parse("state_dir: /var/lib/agentbox\n");
        assert_eq!(
            config.state_dir().unwrap(),
            PathBuf::from("/var/lib/agentbox")
        );
    }
}
