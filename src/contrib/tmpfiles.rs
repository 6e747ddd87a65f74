//! Home directory skeleton for the sandbox user.

use anyhow::Result;

use super::{Contributor, InitRule, TmpfilesRequest};

const DIRECTORIES: &[&str] = &[".cache", ".local", ".local/share", ".local/state"];

pub fn contributor() -> Contributor {
    Contributor::new("tmpfiles").with_init_rules(init_rules)
}

fn init_rules(req: &TmpfilesRequest) -> Result<Vec<InitRule>> {
    Ok(DIRECTORIES
        .iter()
        .map(|dir| InitRule::directory(&req.home_dir.join(dir), "0755", &req.username, "users"))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contrib::{Collector, Requests};
    use std::path::PathBuf;

    #[test]
    fn creates_xdg_dirs() {
        let mut requests = Requests::default();
        requests.tmpfiles.home_dir = PathBuf::from("/home/agent");
        requests.tmpfiles.username = "agent".into();

        let out = Collector::new().collect(&[contributor()], &requests).unwrap();

        let rules: Vec<_> = out.init_rules.iter().map(InitRule::as_str).collect();
        assert_eq!(
            rules,
            vec![
                "d /home/agent/.cache 0755 agent users -",
                "d /home/agent/.local 0755 agent users -",
                "d /home/agent/.local/share 0755 agent users -",
                "d /home/agent/.local/state 0755 agent users -",
            ]
        );
    }
}
