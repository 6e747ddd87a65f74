//! Writes the configured permission policy as Claude Code managed settings.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::PathBuf;
use tracing::debug;

use super::{Contributor, GeneratedFile, GeneratedFileRequest};
use crate::container::MANAGED_SETTINGS_PATH;

pub fn contributor(policy: Option<Value>) -> Contributor {
    Contributor::new("permission-policy")
        .with_generated_files(move |req| files(req, policy.as_ref()))
}

fn files(req: &GeneratedFileRequest, policy: Option<&Value>) -> Result<Vec<GeneratedFile>> {
    let Some(policy) = policy else {
        return Ok(Vec::new());
    };
    let mut content =
        serde_json::to_vec_pretty(policy).context("Failed to serialize permission policy")?;
    content.push(b'\n');
    debug!(sandbox = %req.sandbox_name, bytes = content.len(), "policy:generated");

    Ok(vec![GeneratedFile {
        container_path: PathBuf::from(MANAGED_SETTINGS_PATH),
        content,
        mode: 0o644,
        read_only: true,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contrib::{Collector, Requests};
    use crate::mounter::StateDirMounter;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn nothing_without_policy() {
        let dir = TempDir::new().unwrap();
        let mounter = StateDirMounter::new(dir.path(), "box");
        let out = Collector::new()
            .with_mounter(&mounter)
            .collect(&[contributor(None)], &Requests::default())
            .unwrap();
        assert!(out.mounts.is_empty());
        assert!(!mounter.root().exists());
    }

    #[test]
    fn policy_mounted_read_only_as_json() {
        let dir = TempDir::new().unwrap();
        let mounter = StateDirMounter::new(dir.path(), "box");
        let policy = json!({"permissions": {"allow": ["Bash(git *)"]}});

        let out = Collector::new()
            .with_mounter(&mounter)
            .collect(&[contributor(Some(policy.clone()))], &Requests::default())
            .unwrap();

        let [mount] = out.mounts.as_slice() else {
            panic!("expected one mount, got {:?}", out.mounts);
        };
        assert_eq!(mount.container_path, PathBuf::from(MANAGED_SETTINGS_PATH));
        assert!(mount.read_only);
        let text = fs::read_to_string(&mount.host_path).unwrap();
        assert!(text.ends_with("}\n"));
        assert_eq!(serde_json::from_str::<Value>(&text).unwrap(), policy);
    }

    #[test]
    fn not_written_without_mounter() {
        let out = Collector::new()
            .collect(&[contributor(Some(json!({})))], &Requests::default())
            .unwrap();
        assert!(out.mounts.is_empty());
    }
}
