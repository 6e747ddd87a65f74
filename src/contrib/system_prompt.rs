//! Folds collected prompt fragments into the mounted `system-prompt.md`.

use anyhow::Result;
use std::path::PathBuf;
use tracing::debug;

use super::{Contributor, GeneratedFile, GeneratedFileRequest, PromptFragment};

pub const SYSTEM_PROMPT_FILENAME: &str = "system-prompt.md";

/// Container directory holding agentbox-generated files
pub const GENERATED_DIR: &str = "/etc/agentbox";

/// Join fragments in their existing order, separated by blank lines.
pub fn render(fragments: &[PromptFragment]) -> String {
    let mut out = fragments
        .iter()
        .map(|f| f.content.trim())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

/// Generates `system-prompt.md` from fragments gathered by an earlier
/// collection. Contributes nothing when there is no prompt text.
pub fn contributor(fragments: Vec<PromptFragment>) -> Contributor {
    let text = render(&fragments);
    Contributor::new("system-prompt").with_generated_files(move |req| files(req, &text))
}

fn files(req: &GeneratedFileRequest, text: &str) -> Result<Vec<GeneratedFile>> {
    if text.is_empty() {
        debug!(sandbox = %req.sandbox_name, "system_prompt:no fragments, skipping");
        return Ok(Vec::new());
    }
    Ok(vec![GeneratedFile {
        container_path: PathBuf::from(GENERATED_DIR).join(SYSTEM_PROMPT_FILENAME),
        content: text.as_bytes().to_vec(),
        mode: 0o644,
        read_only: true,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contrib::{Collector, PromptSection, Requests};
    use crate::mounter::StateDirMounter;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn render_joins_with_blank_lines() {
        let fragments = vec![
            PromptFragment::new(PromptSection::Environment, 0, "You are in a sandbox.\n"),
            PromptFragment::new(PromptSection::Identity, 0, "   "),
            PromptFragment::new(PromptSection::Agent, 0, "Be brief."),
        ];
        assert_eq!(render(&fragments), "You are in a sandbox.\n\nBe brief.\n");
    }

    #[test]
    fn render_empty() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn generated_through_collector() {
        let dir = TempDir::new().unwrap();
        let mounter = StateDirMounter::new(dir.path(), "box");
        let fragments = vec![PromptFragment::new(PromptSection::Environment, 0, "hello")];

        let out = Collector::new()
            .with_mounter(&mounter)
            .collect(&[contributor(fragments)], &Requests::default())
            .unwrap();

        let mount = out.mounts.last().unwrap();
        assert_eq!(
            mount.container_path,
            PathBuf::from("/etc/agentbox/system-prompt.md")
        );
        assert!(mount.read_only);
        assert_eq!(fs::read_to_string(&mount.host_path).unwrap(), "hello\n");
    }

    #[test]
    fn no_fragments_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mounter = StateDirMounter::new(dir.path(), "box");

        let out = Collector::new()
            .with_mounter(&mounter)
            .collect(&[contributor(Vec::new())], &Requests::default())
            .unwrap();

        assert!(out.mounts.is_empty());
        assert!(!mounter.root().exists());
    }
}
