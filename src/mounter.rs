//! Materializes generated files on the host and exposes them as mounts.

use anyhow::{Context, Result, anyhow};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

use crate::contrib::{GeneratedFile, Mount};

/// Writes a [`GeneratedFile`] somewhere on the host and returns the mount
/// that exposes it inside the container.
pub trait FileMounter {
    fn mount(&self, file: &GeneratedFile) -> Result<Mount>;
}

/// Writes generated files below a per-sandbox state directory:
///
///   <state_dir>/sandboxes/<sandbox>/files/<container path>
///
/// Keying by sandbox name keeps concurrent builds of different sandboxes
/// from writing to the same file.
#[derive(Debug, Clone)]
pub struct StateDirMounter {
    root: PathBuf,
}

impl StateDirMounter {
    pub fn new(state_dir: &Path, sandbox_name: &str) -> Self {
        Self {
            root: state_dir
                .join("sandboxes")
                .join(sandbox_name)
                .join("files"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Host path for a container path. Only normal components are kept so a
    /// hostile path cannot escape the state directory.
    fn host_path_for(&self, container_path: &Path) -> Result<PathBuf> {
        let relative: PathBuf = container_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect();
        if relative.as_os_str().is_empty() {
            return Err(anyhow!(
                "Generated file has no usable container path: {}",
                container_path.display()
            ));
        }
        Ok(self.root.join(relative))
    }
}

impl FileMounter for StateDirMounter {
    fn mount(&self, file: &GeneratedFile) -> Result<Mount> {
        let host_path = self.host_path_for(&file.container_path)?;
        let dir = host_path
            .parent()
            .ok_or_else(|| anyhow!("Invalid generated file path: {}", host_path.display()))?;
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;

        // Write to a sibling temp file and rename into place.
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
        tmp.write_all(&file.content)
            .with_context(|| format!("Failed to write {}", host_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(tmp.path(), fs::Permissions::from_mode(file.mode))?;
        }

        tmp.persist(&host_path)
            .with_context(|| format!("Failed to persist {}", host_path.display()))?;
        debug!(
            host = %host_path.display(),
            container = %file.container_path.display(),
            "mounter:wrote generated file"
        );

        Ok(Mount {
            host_path,
            container_path: file.container_path.clone(),
            read_only: file.read_only,
        })
    }
}
