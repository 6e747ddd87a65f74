//! Mounts the project workspace into the sandbox.

use anyhow::{Result, bail};
use std::path::{Path, PathBuf};

use super::{
    Contributor, EnvVar, EnvVarRequest, Mount, MountRequest, PromptFragment, PromptRequest,
    PromptSection,
};

/// Build the workspace contributor. `container_path` is where the workspace
/// appears inside the sandbox.
pub fn contributor(container_path: impl Into<PathBuf>) -> Contributor {
    let container_path = container_path.into();
    let for_mounts = container_path.clone();
    let for_env = container_path;

    Contributor::new("workspace")
        .with_mounts(move |req| mounts(req, &for_mounts))
        .with_env_vars(move |req| env_vars(req, &for_env))
        .with_prompts(prompts)
}

fn mounts(req: &MountRequest, container_path: &Path) -> Result<Vec<Mount>> {
    if req.workspace.as_os_str().is_empty() {
        bail!("workspace path is required");
    }
    let mut mounts = vec![Mount::rw(&req.workspace, container_path)];

    // A worktree's .git file points into the source repository's git dir,
    // so that dir must be visible at its host path.
    if let Some(repo) = &req.source_repo {
        mounts.push(Mount::same_path(repo.join(".git"), false));
    }
    Ok(mounts)
}

fn env_vars(req: &EnvVarRequest, container_path: &Path) -> Result<Vec<EnvVar>> {
    Ok(vec![
        EnvVar::string("AGENTBOX_SANDBOX", &req.sandbox_name),
        EnvVar::string("AGENTBOX_WORKSPACE", &container_path.to_string_lossy()),
    ])
}

fn prompts(req: &PromptRequest) -> Result<Vec<PromptFragment>> {
    let mut fragments = vec![PromptFragment::new(
        PromptSection::Environment,
        0,
        format!(
            "You are running inside the isolated sandbox `{}`. The project is mounted at `{}`; \
             changes there are visible on the host. Everything outside the workspace is \
             discarded when the sandbox is destroyed.",
            req.sandbox_name,
            req.workspace.display()
        ),
    )];

    if req.source_repo.is_some() {
        fragments.push(PromptFragment::new(
            PromptSection::VersionControl,
            0,
            "The workspace is a git worktree whose repository metadata is shared with the host. \
             Commit to the current branch and do not check out other branches.",
        ));
    }
    Ok(fragments)
}
