//! tmux backend.

use std::fmt::Write;
use std::path::Path;

use super::types::*;
use super::{Multiplexer, SESSION_NAME, effective_windows};
use crate::shell;

#[derive(Debug, Default)]
pub struct TmuxBackend;

impl TmuxBackend {
    pub fn new() -> Self {
        Self
    }
}

/// Prints the new window's `@id`. Window names are not usable as targets:
/// tmux reads `.` as a pane separator and digits as an index.
const PRINT_WINDOW_ID: &str = "-P -F '#{window_id}'";

impl Multiplexer for TmuxBackend {
    fn kind(&self) -> MultiplexerKind {
        MultiplexerKind::Tmux
    }

    fn packages(&self) -> Vec<String> {
        vec!["pkgs.tmux".to_string()]
    }

    fn init_script(&self, windows: &[Window], workdir: &Path) -> String {
        let session = shell::quote(SESSION_NAME);
        let workdir = shell::quote(&workdir.to_string_lossy());
        let mut script = String::new();

        let _ = writeln!(script, "set -eu");
        let _ = writeln!(script, "if tmux has-session -t {session} 2>/dev/null; then");
        let _ = writeln!(script, "  exit 0");
        let _ = writeln!(script, "fi");

        for (idx, window) in effective_windows(windows).iter().enumerate() {
            let name = shell::quote(&window.name);
            let var = format!("win_{idx}");
            if idx == 0 {
                let _ = writeln!(
                    script,
                    "{var}=$(tmux new-session -d {PRINT_WINDOW_ID} -s {session} -n {name} -c {workdir})"
                );
            } else {
                let _ = writeln!(
                    script,
                    "{var}=$(tmux new-window {PRINT_WINDOW_ID} -t {session} -n {name} -c {workdir})"
                );
            }
            if let Some(command) = window.command() {
                let _ = writeln!(
                    script,
                    "tmux send-keys -t \"${var}\" {} Enter",
                    shell::quote(command)
                );
            }
        }

        script
    }
}
