//! Collects contributions from an ordered set of contributors.

use std::collections::HashSet;
use tracing::debug;

use super::{Capability, CapabilityKind, Contributions, Contributor, InitRule, Requests};
use crate::mounter::FileMounter;

/// A contributor callback (or the mounter acting for it) failed.
#[derive(Debug, thiserror::Error)]
#[error("contributor '{contributor}' failed to supply {capability} contributions")]
pub struct CollectError {
    pub contributor: String,
    pub capability: CapabilityKind,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl CollectError {
    fn new(contributor: &Contributor, capability: CapabilityKind, err: anyhow::Error) -> Self {
        Self {
            contributor: contributor.name().to_string(),
            capability,
            source: err.into(),
        }
    }
}

/// Merges contributions from every contributor into one [`Contributions`].
///
/// Generated files are only collected when a mounter is attached.
#[derive(Default)]
pub struct Collector<'a> {
    mounter: Option<&'a dyn FileMounter>,
}

impl<'a> Collector<'a> {
    pub fn new() -> Self {
        Self { mounter: None }
    }

    pub fn with_mounter(mut self, mounter: &'a dyn FileMounter) -> Self {
        self.mounter = Some(mounter);
        self
    }

    /// Invoke every registered capability, in contributor order.
    ///
    /// The first failing callback aborts the whole collection.
    pub fn collect(
        &self,
        contributors: &[Contributor],
        requests: &Requests,
    ) -> Result<Contributions, CollectError> {
        let mut out = Contributions::default();
        let mut init_rules = Vec::new();

        for contributor in contributors {
            for kind in contributor.kinds() {
                let Some(capability) = contributor.capability(kind) else {
                    continue;
                };
                debug!(contributor = contributor.name(), capability = %kind, "collect:invoke");
                let wrap = |err| CollectError::new(contributor, kind, err);

                match capability {
                    Capability::Mount(f) => out.mounts.extend(f(&requests.mount).map_err(wrap)?),
                    Capability::Package(f) => {
                        out.packages.extend(f(&requests.package).map_err(wrap)?)
                    }
                    Capability::EnvVar(f) => {
                        out.env_vars.extend(f(&requests.env_var).map_err(wrap)?)
                    }
                    Capability::InitRule(f) => {
                        init_rules.extend(f(&requests.tmpfiles).map_err(wrap)?)
                    }
                    Capability::Prompt(f) => out
                        .prompt_fragments
                        .extend(f(&requests.prompt).map_err(wrap)?),
                    Capability::GeneratedFile(f) => {
                        let Some(mounter) = self.mounter else {
                            debug!(
                                contributor = contributor.name(),
                                "collect:no mounter, skipping generated files"
                            );
                            continue;
                        };
                        for file in f(&requests.generated_file).map_err(wrap)? {
                            out.mounts.push(mounter.mount(&file).map_err(wrap)?);
                        }
                    }
                }
            }
        }

        out.prompt_fragments
            .sort_by_key(|fragment| (fragment.section, fragment.priority));
        out.init_rules = dedup_init_rules(init_rules);

        debug!(
            mounts = out.mounts.len(),
            env_vars = out.env_vars.len(),
            packages = out.packages.len(),
            init_rules = out.init_rules.len(),
            prompt_fragments = out.prompt_fragments.len(),
            "collect:done"
        );
        Ok(out)
    }
}

/// Remove exact duplicate rules, keeping the first occurrence in place.
pub fn dedup_init_rules(rules: impl IntoIterator<Item = InitRule>) -> Vec<InitRule> {
    let mut seen = HashSet::new();
    rules
        .into_iter()
        .filter(|rule| seen.insert(rule.clone()))
        .collect()
}
