//! End-to-end: configuration in, manifest text out.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::container::{
    self, ContainerConfig, DEFAULT_USERNAME, DEFAULT_WORKSPACE, MANAGED_SETTINGS_PATH,
    PermissionPolicy, RenderModel,
};
use crate::contrib::{
    Collector, Contributions, Contributor, EnvVarRequest, GeneratedFileRequest, MountRequest,
    PackageRequest, PromptFragment, PromptRequest, Requests, TmpfilesRequest, extras, identity,
    policy, proxy, secrets, system_prompt, tmpfiles, workspace,
};
use crate::manifest::Renderer;
use crate::mounter::{FileMounter, StateDirMounter};
use crate::reproducibility::Nixpkgs;

/// Result of a full render.
#[derive(Debug)]
pub struct Rendered {
    pub model: RenderModel,
    pub manifest: String,
}

/// Collect, validate, write generated files, build and render.
///
/// Nothing is written under the state directory unless the container
/// configuration validates.
pub fn render(config: &Config, renderer: &Renderer) -> Result<Rendered> {
    let name = sandbox_name(config)?;
    let state_dir = config.state_dir()?;
    let requests = requests(config);

    let mut spec = prepare(config, &requests)?;
    spec.validate()?;

    let mounter = StateDirMounter::new(&state_dir, &name);
    debug!(name = %name, files = %mounter.root().display(), "pipeline:render");
    generate_files(config, &requests, &mut spec, &mounter)?;

    let model = container::build(&spec)?;
    let manifest = renderer
        .render(&model)
        .context("Failed to render manifest")?;

    info!(name = %model.name, bytes = manifest.len(), "pipeline:rendered");
    Ok(Rendered { model, manifest })
}

/// Check the configuration without writing any files.
pub fn validate(config: &Config) -> Result<RenderModel> {
    sandbox_name(config)?;
    let spec = prepare(config, &requests(config))?;
    Ok(container::build(&spec)?)
}

fn sandbox_name(config: &Config) -> Result<String> {
    let name = config.name.clone().unwrap_or_default();
    container::validate_name(&name)?;
    Ok(name)
}

/// Built-in contributors followed by the configuration-driven ones.
fn contributors(config: &Config) -> Vec<Contributor> {
    vec![
        workspace::contributor(DEFAULT_WORKSPACE),
        secrets::contributor(),
        identity::contributor(config.identity.clone()),
        proxy::contributor(),
        tmpfiles::contributor(),
        extras::packages(config.packages()),
        extras::env(config.env.clone().unwrap_or_default()),
        extras::prompt(config.prompt.clone().unwrap_or_default()),
    ]
}

/// Generated-file contributors. They run in a second pass because the
/// system prompt needs every collected fragment.
fn file_contributors(config: &Config, fragments: &[PromptFragment]) -> Vec<Contributor> {
    vec![
        policy::contributor(config.permissions.clone()),
        system_prompt::contributor(fragments.to_vec()),
    ]
}

fn requests(config: &Config) -> Requests {
    let name = config.name.clone().unwrap_or_default();
    let username = config
        .username
        .clone()
        .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

    Requests {
        mount: MountRequest {
            workspace: config.workspace.clone().unwrap_or_default(),
            source_repo: config.source_repo.clone(),
            secrets_path: config.secrets.clone(),
        },
        package: PackageRequest {
            sandbox_name: name.clone(),
        },
        env_var: EnvVarRequest {
            sandbox_name: name.clone(),
            secrets_path: config.secrets.clone(),
            proxy_url: config.proxy.clone(),
        },
        tmpfiles: TmpfilesRequest {
            home_dir: PathBuf::from("/home").join(&username),
            username,
        },
        prompt: PromptRequest {
            sandbox_name: name.clone(),
            workspace: PathBuf::from(DEFAULT_WORKSPACE),
            source_repo: config.source_repo.clone(),
            proxy_url: config.proxy.clone(),
        },
        generated_file: GeneratedFileRequest { sandbox_name: name },
    }
}

/// Collect contributions without a mounter and assemble the container
/// configuration. Generated files are left for [`generate_files`].
fn prepare(config: &Config, requests: &Requests) -> Result<ContainerConfig> {
    let contributions = Collector::new()
        .collect(&contributors(config), requests)
        .context("Failed to collect contributions")?;

    let mut spec = ContainerConfig::new(
        config.name.clone().unwrap_or_default(),
        config.slot.unwrap_or_default(),
    );
    spec.authorized_keys = config.authorized_keys.clone().unwrap_or_default();
    spec.uid = config.uid();
    spec.gid = config.gid();
    if let Some(username) = &config.username {
        spec.username = username.clone();
    }
    spec.multiplexer = config.multiplexer;
    spec.template = Some(config.template());
    spec.windows = config.windows.clone();
    spec.identity = Some(config.identity.clone());
    spec.resource_limits = Some(config.limits.clone());
    spec.network_policy = config.network_policy.clone();
    spec.contributions = Some(contributions);
    spec.reproducibility = Some(Arc::new(Nixpkgs::new().with_pin(config.nixpkgs.clone())));

    log_contributions(spec.contributions.as_ref());
    Ok(spec)
}

/// Second collection pass, with a mounter, over the file contributors. The
/// permission policy becomes the spec's policy; every other file is mounted
/// alongside the collected mounts.
fn generate_files(
    config: &Config,
    requests: &Requests,
    spec: &mut ContainerConfig,
    mounter: &dyn FileMounter,
) -> Result<()> {
    let Some(contributions) = spec.contributions.as_mut() else {
        return Ok(());
    };
    let generated = Collector::new()
        .with_mounter(mounter)
        .collect(
            &file_contributors(config, &contributions.prompt_fragments),
            requests,
        )
        .context("Failed to write generated files")?;

    for mount in generated.mounts {
        if mount.container_path == Path::new(MANAGED_SETTINGS_PATH) {
            spec.permission_policy = Some(PermissionPolicy {
                host_path: mount.host_path,
            });
        } else {
            contributions.mounts.push(mount);
        }
    }
    Ok(())
}

fn log_contributions(contributions: Option<&Contributions>) {
    if let Some(c) = contributions {
        debug!(
            mounts = c.mounts.len(),
            env_vars = c.env_vars.len(),
            packages = c.packages.len(),
            init_rules = c.init_rules.len(),
            prompt_fragments = c.prompt_fragments.len(),
            "pipeline:collected"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ValidationError;
    use std::fs;
    use tempfile::TempDir;

    fn renderer() -> Renderer {
        Renderer::new().unwrap()
    }

    fn config(dir: &TempDir) -> Config {
        let workspace = dir.path().join("work");
        fs::create_dir_all(&workspace).unwrap();
        Config {
            name: Some("feature".into()),
            slot: Some(5),
            authorized_keys: Some(vec!["ssh-ed25519 AAAA me@laptop".into()]),
            uid: Some(1000),
            gid: Some(100),
            workspace: Some(workspace),
            state_dir: Some(dir.path().join("state")),
            ..Default::default()
        }
    }

    #[test]
    fn renders_manifest_with_system_prompt() {
        let dir = TempDir::new().unwrap();
        let rendered = render(&config(&dir), &renderer()).unwrap();

        let prompt = dir
            .path()
            .join("state/sandboxes/feature/files/etc/agentbox/system-prompt.md");
        assert!(fs::read_to_string(&prompt).unwrap().contains("feature"));
        assert!(rendered.manifest.contains("hostAddress = \"10.100.5.1\";"));
        assert!(rendered.manifest.contains("writeShellScriptBin \"claude\""));
        assert!(rendered.model.claude_wrapper.is_some());
        assert!(
            rendered
                .manifest
                .contains("\"AGENTBOX_SANDBOX\" = \"feature\";")
        );
    }

    #[test]
    fn render_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        assert_eq!(
            render(&config, &renderer()).unwrap().manifest,
            render(&config, &renderer()).unwrap().manifest
        );
    }

    #[test]
    fn permission_policy_written_as_json() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.permissions = Some(serde_json::json!({"permissions": {"deny": ["WebFetch"]}}));

        let rendered = render(&config, &renderer()).unwrap();

        let policy = rendered.model.permission_policy.unwrap();
        let text = fs::read_to_string(&policy.host_path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["permissions"]["deny"][0], "WebFetch");
        assert!(
            rendered
                .manifest
                .contains("\"/etc/claude-code/managed-settings.json\" = {")
        );
    }

    #[test]
    fn validate_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let model = validate(&config(&dir)).unwrap();
        assert_eq!(model.local_address, "10.100.5.2");
        assert!(model.claude_wrapper.is_none());
        assert!(!dir.path().join("state").exists());
    }

    #[test]
    fn invalid_slot_reports_field() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.slot = Some(300);
        let err = validate(&config).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::SlotOutOfRange(300))
        );
    }

    #[test]
    fn hostile_name_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.name = Some("../escape".into());
        let err = render(&config, &renderer()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::InvalidName(_))
        ));
        assert!(!dir.path().join("state").exists());
    }

    #[test]
    fn invalid_slot_writes_no_files() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.slot = Some(0);
        config.permissions = Some(serde_json::json!({"permissions": {"deny": ["WebFetch"]}}));
        config.prompt = Some("Run the tests before committing.".into());

        let err = render(&config, &renderer()).unwrap_err();

        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::SlotOutOfRange(0))
        );
        assert!(!dir.path().join("state").exists());
    }

    #[test]
    fn missing_keys_write_no_files() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.authorized_keys = None;

        let err = render(&config, &renderer()).unwrap_err();

        assert_eq!(
            err.downcast_ref::<ValidationError>(),
            Some(&ValidationError::NoAuthorizedKeys)
        );
        assert!(!dir.path().join("state").exists());
    }

    #[test]
    fn long_name_rejected_before_writing() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.name = Some("feature-auth-refactor".into());
        let err = render(&config, &renderer()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ValidationError>(),
            Some(ValidationError::NameTooLong(_))
        ));
        assert!(!dir.path().join("state").exists());
    }

    #[test]
    fn generated_files_mounted_once() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.permissions = Some(serde_json::json!({}));

        let model = render(&config, &renderer()).unwrap().model;

        let prompt_mounts = model
            .mounts
            .iter()
            .filter(|m| m.container_path == Path::new("/etc/agentbox/system-prompt.md"))
            .count();
        assert_eq!(prompt_mounts, 1);
        assert!(
            !model
                .mounts
                .iter()
                .any(|m| m.container_path == Path::new(MANAGED_SETTINGS_PATH))
        );
        assert!(model.permission_policy.is_some());
    }

    #[test]
    fn missing_workspace_fails_collection() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.workspace = None;
        let err = validate(&config).unwrap_err();
        assert!(format!("{err:#}").contains("workspace"));
    }

    #[test]
    fn config_packages_are_resolved() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.packages = Some(vec!["nodejs@20".into(), "bad name".into()]);
        let model = validate(&config).unwrap();
        assert!(model.packages.contains(&"pkgs.nodejs_20".to_string()));
        assert!(!model.packages.iter().any(|p| p.contains("bad")));
    }
}
