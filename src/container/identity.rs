//! Script for the identity setup service.

use std::fmt::Write;

use super::Identity;
use crate::contrib::identity::IDENTITY_DIR;
use crate::shell;

/// Configure git and jj authorship and, when a key is present, install the
/// SSH key and point `IdentityFile` at it.
pub(super) fn setup_script(identity: &Identity) -> String {
    let mut script = String::new();
    let _ = writeln!(script, "set -eu");

    for (key, value) in [
        ("user.name", identity.git_user()),
        ("user.email", identity.git_email()),
    ] {
        let Some(value) = value else {
            continue;
        };
        let _ = writeln!(
            script,
            "{}",
            shell::join(["git", "config", "--global", key, value])
        );
        let _ = writeln!(
            script,
            "{}",
            shell::join(["jj", "config", "set", "--user", key, value])
        );
    }

    if let Some(key_name) = identity.ssh_key_name() {
        let source = format!("{IDENTITY_DIR}/{key_name}");
        let target = format!("\"$HOME/.ssh/\"{}", shell::quote(&key_name));
        let _ = writeln!(script, "install -d -m 700 \"$HOME/.ssh\"");
        let _ = writeln!(
            script,
            "install -m 600 {} {target}",
            shell::quote(&source)
        );
        let _ = writeln!(script, "cat > \"$HOME/.ssh/config\" <<'SSHCONFIG'");
        let _ = writeln!(script, "Host *");
        let _ = writeln!(script, "  IdentityFile ~/.ssh/{key_name}");
        let _ = writeln!(script, "  IdentitiesOnly yes");
        let _ = writeln!(script, "SSHCONFIG");
    }

    script
}
