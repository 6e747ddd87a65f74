//! Terminal multiplexer backends for the in-sandbox agent session.
//!
//! A backend contributes the packages it needs and the init script that
//! creates the session with one window per agent. tmux and WezTerm are
//! interchangeable.

pub mod tmux;
pub mod types;
pub mod wezterm;

use std::path::Path;

pub use tmux::TmuxBackend;
pub use types::*;
pub use wezterm::WezTermBackend;

/// Session (tmux) or workspace (WezTerm) name used inside every sandbox.
pub const SESSION_NAME: &str = "agentbox";

/// Name of the window created when no windows are configured.
const FALLBACK_WINDOW: &str = "shell";

/// Main trait for multiplexer backends.
pub trait Multiplexer: Send + Sync {
    fn kind(&self) -> MultiplexerKind;

    /// Package references the backend needs installed.
    fn packages(&self) -> Vec<String>;

    /// Script that creates the session. The first window creates the
    /// session with `workdir` as its working directory; each later window is
    /// opened in the same session. Windows with a command get it typed in
    /// followed by Enter.
    fn init_script(&self, windows: &[Window], workdir: &Path) -> String;
}

/// Create the backend for a multiplexer kind.
pub fn create_backend(kind: MultiplexerKind) -> Box<dyn Multiplexer> {
    match kind {
        MultiplexerKind::Tmux => Box::new(TmuxBackend::new()),
        MultiplexerKind::WezTerm => Box::new(WezTermBackend::new()),
    }
}

/// Compute the window list.
///
/// A non-empty explicit list is used verbatim. Otherwise there is one window
/// per agent, sorted by name, running the agent's own name as its command.
pub fn resolve_windows(explicit: Option<&[Window]>, agents: &[String]) -> Vec<Window> {
    if let Some(windows) = explicit
        && !windows.is_empty()
    {
        return windows.to_vec();
    }

    let mut names: Vec<&String> = agents.iter().collect();
    names.sort();
    names
        .into_iter()
        .map(|name| Window::with_command(name.clone(), name.clone()))
        .collect()
}

/// Windows actually opened: the given list, or a single plain shell window.
pub(crate) fn effective_windows(windows: &[Window]) -> Vec<Window> {
    if windows.is_empty() {
        vec![Window::new(FALLBACK_WINDOW)]
    } else {
        windows.to_vec()
    }
}
