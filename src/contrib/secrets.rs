//! Exposes the host secrets directory read-only.

use anyhow::{Result, bail};

use super::{Contributor, EnvVar, EnvVarRequest, Mount, MountRequest};

/// Secrets directory inside the container
pub const SECRETS_DIR: &str = "/run/agentbox/secrets";

pub fn contributor() -> Contributor {
    Contributor::new("secrets")
        .with_mounts(mounts)
        .with_env_vars(env_vars)
}

fn mounts(req: &MountRequest) -> Result<Vec<Mount>> {
    let Some(path) = &req.secrets_path else {
        return Ok(Vec::new());
    };
    if !path.is_dir() {
        bail!("secrets directory not found: {}", path.display());
    }
    Ok(vec![Mount::ro(path, SECRETS_DIR)])
}

fn env_vars(req: &EnvVarRequest) -> Result<Vec<EnvVar>> {
    if req.secrets_path.is_none() {
        return Ok(Vec::new());
    }
    Ok(vec![EnvVar::string("AGENTBOX_SECRETS_DIR", SECRETS_DIR)])
}
