//! Makes the configured SSH key available to the sandbox user and tells the
//! agent who it commits as.

use anyhow::{Result, bail};
use std::path::Path;
use std::sync::Arc;

use super::{
    Contributor, InitRule, Mount, MountRequest, PromptFragment, PromptRequest, PromptSection,
    TmpfilesRequest,
};
use crate::container::Identity;

/// Container directory the SSH key is staged in before being copied to `~/.ssh`
pub const IDENTITY_DIR: &str = "/run/agentbox/identity";

pub fn contributor(identity: Identity) -> Contributor {
    let identity = Arc::new(identity);
    let for_mounts = Arc::clone(&identity);
    let for_rules = Arc::clone(&identity);
    let for_prompts = identity;

    Contributor::new("identity")
        .with_mounts(move |req| mounts(req, &for_mounts))
        .with_init_rules(move |req| init_rules(req, &for_rules))
        .with_prompts(move |req| prompts(req, &for_prompts))
}

fn mounts(_req: &MountRequest, identity: &Identity) -> Result<Vec<Mount>> {
    let (Some(key), Some(name)) = (&identity.ssh_key, identity.ssh_key_name()) else {
        return Ok(Vec::new());
    };
    if !key.is_file() {
        bail!("SSH key not found: {}", key.display());
    }
    Ok(vec![Mount::ro(key, Path::new(IDENTITY_DIR).join(name))])
}

fn init_rules(req: &TmpfilesRequest, identity: &Identity) -> Result<Vec<InitRule>> {
    if identity.ssh_key_name().is_none() {
        return Ok(Vec::new());
    }
    Ok(vec![InitRule::directory(
        &req.home_dir.join(".ssh"),
        "0700",
        &req.username,
        "users",
    )])
}

fn prompts(_req: &PromptRequest, identity: &Identity) -> Result<Vec<PromptFragment>> {
    let mut lines = Vec::new();
    match (identity.git_user(), identity.git_email()) {
        (Some(user), Some(email)) => {
            lines.push(format!("Commits are authored as {user} <{email}>."))
        }
        (Some(user), None) => lines.push(format!("Commits are authored as {user}.")),
        (None, Some(email)) => lines.push(format!("Commits are authored as <{email}>.")),
        (None, None) => {}
    }
    if identity.ssh_key_name().is_some() {
        lines.push(
            "An SSH key is configured for git remotes. Do not copy it or print it.".to_string(),
        );
    }

    if lines.is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![PromptFragment::new(
        PromptSection::Identity,
        0,
        lines.join(" "),
    )])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contrib::{Collector, Requests};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn requests() -> Requests {
        let mut requests = Requests::default();
        requests.tmpfiles.home_dir = PathBuf::from("/home/agent");
        requests.tmpfiles.username = "agent".into();
        requests
    }

    #[test]
    fn empty_identity_contributes_nothing() {
        let out = Collector::new()
            .collect(&[contributor(Identity::default())], &requests())
            .unwrap();
        assert!(out.mounts.is_empty());
        assert!(out.init_rules.is_empty());
        assert!(out.prompt_fragments.is_empty());
    }

    #[test]
    fn git_only_identity() {
        let identity = Identity {
            git_user: Some("Ada".into()),
            git_email: Some("ada@example.com".into()),
            ssh_key: None,
        };
        let out = Collector::new()
            .collect(&[contributor(identity)], &requests())
            .unwrap();
        assert!(out.mounts.is_empty());
        assert!(out.init_rules.is_empty());
        assert_eq!(
            out.prompt_fragments[0].content,
            "Commits are authored as Ada <ada@example.com>."
        );
    }

    #[test]
    fn ssh_key_is_staged_read_only() {
        let dir = TempDir::new().unwrap();
        let key = dir.path().join("id_ed25519");
        fs::write(&key, "key").unwrap();

        let identity = Identity {
            ssh_key: Some(key.clone()),
            ..Default::default()
        };
        let out = Collector::new()
            .collect(&[contributor(identity)], &requests())
            .unwrap();

        assert_eq!(
            out.mounts,
            vec![Mount::ro(&key, "/run/agentbox/identity/id_ed25519")]
        );
        assert_eq!(
            out.init_rules[0].as_str(),
            "d /home/agent/.ssh 0700 agent users -"
        );
        assert_eq!(out.prompt_fragments[0].section, PromptSection::Identity);
    }

    #[test]
    fn missing_key_fails() {
        let identity = Identity {
            ssh_key: Some(PathBuf::from("/nonexistent/id_rsa")),
            ..Default::default()
        };
        let err = Collector::new()
            .collect(&[contributor(identity)], &requests())
            .unwrap_err();
        assert_eq!(err.contributor, "identity");
    }
}
