//! Contributors that forward user configuration verbatim.

use anyhow::Result;
use std::collections::BTreeMap;
use tracing::debug;

use super::{Contributor, EnvVar, Package, PromptFragment, PromptSection};

/// Extra packages declared in configuration.
pub fn packages(packages: Vec<Package>) -> Contributor {
    Contributor::new("packages").with_packages(move |req| {
        debug!(sandbox = %req.sandbox_name, count = packages.len(), "extras:packages");
        Ok(packages.clone())
    })
}

/// Extra session variables declared in configuration, in key order.
pub fn env(vars: BTreeMap<String, String>) -> Contributor {
    let vars: Vec<EnvVar> = vars
        .iter()
        .map(|(name, value)| EnvVar::string(name, value))
        .collect();
    Contributor::new("env").with_env_vars(move |_| Ok(vars.clone()))
}

/// User-supplied prompt text, appended in the agent section.
pub fn prompt(text: String) -> Contributor {
    Contributor::new("prompt").with_prompts(move |_| agent_prompt(&text))
}

fn agent_prompt(text: &str) -> Result<Vec<PromptFragment>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![PromptFragment::new(PromptSection::Agent, 100, text)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contrib::{Collector, Requests};

    #[test]
    fn forwards_packages_in_order() {
        let out = Collector::new()
            .collect(
                &[packages(vec![
                    Package::new("htop"),
                    Package::versioned("nodejs", "20"),
                ])],
                &Requests::default(),
            )
            .unwrap();
        assert_eq!(
            out.packages,
            vec![Package::new("htop"), Package::versioned("nodejs", "20")]
        );
    }

    #[test]
    fn env_is_quoted_and_sorted() {
        let vars = BTreeMap::from([
            ("PAGER".to_string(), "less".to_string()),
            ("EDITOR".to_string(), "vi \"x\"".to_string()),
        ]);
        let out = Collector::new()
            .collect(&[env(vars)], &Requests::default())
            .unwrap();
        assert_eq!(
            out.env_vars,
            vec![
                EnvVar::expr("EDITOR", r#""vi \"x\"""#),
                EnvVar::expr("PAGER", "\"less\""),
            ]
        );
    }

    #[test]
    fn blank_prompt_is_skipped() {
        let out = Collector::new()
            .collect(&[prompt("  \n".into())], &Requests::default())
            .unwrap();
        assert!(out.prompt_fragments.is_empty());
    }

    #[test]
    fn prompt_lands_in_agent_section() {
        let out = Collector::new()
            .collect(&[prompt("Prefer small commits.".into())], &Requests::default())
            .unwrap();
        assert_eq!(out.prompt_fragments[0].section, PromptSection::Agent);
        assert_eq!(out.prompt_fragments[0].content, "Prefer small commits.");
    }
}
