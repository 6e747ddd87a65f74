//! WezTerm backend.
//!
//! Runs a headless `wezterm-mux-server` and drives it through `wezterm cli`.
//! The session is a WezTerm workspace; windows map to tabs titled after the
//! window name.

use std::fmt::Write;
use std::path::Path;

use super::types::*;
use super::{Multiplexer, SESSION_NAME, effective_windows};
use crate::shell;

/// Attempts, 100ms apart, to reach the freshly daemonized mux server
const READY_ATTEMPTS: u32 = 50;

#[derive(Debug, Default)]
pub struct WezTermBackend;

impl WezTermBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Multiplexer for WezTermBackend {
    fn kind(&self) -> MultiplexerKind {
        MultiplexerKind::WezTerm
    }

    fn packages(&self) -> Vec<String> {
        vec!["pkgs.wezterm".to_string()]
    }

    fn init_script(&self, windows: &[Window], workdir: &Path) -> String {
        let workspace = shell::quote(SESSION_NAME);
        let workdir = shell::quote(&workdir.to_string_lossy());
        let mut script = String::new();

        let _ = writeln!(script, "set -eu");
        let _ = writeln!(script, "wezterm-mux-server --daemonize 2>/dev/null || true");
        let _ = writeln!(script, "ready=0");
        let _ = writeln!(script, "for _ in $(seq 1 {READY_ATTEMPTS}); do");
        let _ = writeln!(script, "  if wezterm cli list >/dev/null 2>&1; then");
        let _ = writeln!(script, "    ready=1");
        let _ = writeln!(script, "    break");
        let _ = writeln!(script, "  fi");
        let _ = writeln!(script, "  sleep 0.1");
        let _ = writeln!(script, "done");
        let _ = writeln!(script, "if [ \"$ready\" -ne 1 ]; then");
        let _ = writeln!(script, "  echo 'wezterm mux server did not answer' >&2");
        let _ = writeln!(script, "  exit 1");
        let _ = writeln!(script, "fi");
        // Match the workspace field itself, not any row mentioning the name.
        let _ = writeln!(
            script,
            "if wezterm cli list --format json | grep -q {}; then",
            shell::quote(&format!("\"workspace\": *\"{SESSION_NAME}\""))
        );
        let _ = writeln!(script, "  exit 0");
        let _ = writeln!(script, "fi");

        for (idx, window) in effective_windows(windows).iter().enumerate() {
            let pane = format!("pane_{idx}");
            if idx == 0 {
                let _ = writeln!(
                    script,
                    "{pane}=$(wezterm cli spawn --new-window --workspace {workspace} --cwd {workdir})"
                );
            } else {
                // Spawning relative to the first pane opens a tab in its window.
                let _ = writeln!(
                    script,
                    "{pane}=$(wezterm cli spawn --pane-id \"$pane_0\" --cwd {workdir})"
                );
            }
            let _ = writeln!(
                script,
                "wezterm cli set-tab-title --pane-id \"${pane}\" {}",
                shell::quote(&window.name)
            );
            if let Some(command) = window.command() {
                let _ = writeln!(
                    script,
                    "wezterm cli send-text --pane-id \"${pane}\" --no-paste {}",
                    shell::quote(command)
                );
                let _ = writeln!(
                    script,
                    "printf '\\r' | wezterm cli send-text --pane-id \"${pane}\" --no-paste"
                );
            }
        }

        script
    }
}
