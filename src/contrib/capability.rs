//! Explicit capability registration for contributors.
//!
//! Each contributor registers the typed callbacks it provides into a table
//! keyed by [`CapabilityKind`]. The collector only ever consults that table.

use anyhow::Result;
use std::collections::BTreeMap;
use std::fmt;

use super::{
    EnvVar, EnvVarRequest, GeneratedFile, GeneratedFileRequest, InitRule, Mount, MountRequest,
    Package, PackageRequest, PromptFragment, PromptRequest, TmpfilesRequest,
};

type Callback<Req, Out> = Box<dyn Fn(&Req) -> Result<Vec<Out>> + Send + Sync>;

/// The kinds of configuration a contributor may supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapabilityKind {
    Mount,
    Package,
    EnvVar,
    InitRule,
    Prompt,
    GeneratedFile,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityKind::Mount => "mount",
            CapabilityKind::Package => "package",
            CapabilityKind::EnvVar => "env-var",
            CapabilityKind::InitRule => "init-rule",
            CapabilityKind::Prompt => "prompt",
            CapabilityKind::GeneratedFile => "generated-file",
        };
        f.write_str(name)
    }
}

/// A typed contribution callback.
pub enum Capability {
    Mount(Callback<MountRequest, Mount>),
    Package(Callback<PackageRequest, Package>),
    EnvVar(Callback<EnvVarRequest, EnvVar>),
    InitRule(Callback<TmpfilesRequest, InitRule>),
    Prompt(Callback<PromptRequest, PromptFragment>),
    GeneratedFile(Callback<GeneratedFileRequest, GeneratedFile>),
}

impl Capability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            Capability::Mount(_) => CapabilityKind::Mount,
            Capability::Package(_) => CapabilityKind::Package,
            Capability::EnvVar(_) => CapabilityKind::EnvVar,
            Capability::InitRule(_) => CapabilityKind::InitRule,
            Capability::Prompt(_) => CapabilityKind::Prompt,
            Capability::GeneratedFile(_) => CapabilityKind::GeneratedFile,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Capability").field(&self.kind()).finish()
    }
}

/// A named contributor and the capabilities it registered.
///
/// Registering a kind twice replaces the earlier callback.
#[derive(Debug)]
pub struct Contributor {
    name: String,
    capabilities: BTreeMap<CapabilityKind, Capability>,
}

impl Contributor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn register(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability.kind(), capability);
        self
    }

    pub fn with_mounts<F>(self, f: F) -> Self
    where
        F: Fn(&MountRequest) -> Result<Vec<Mount>> + Send + Sync + 'static,
    {
        self.register(Capability::Mount(Box::new(f)))
    }

    pub fn with_packages<F>(self, f: F) -> Self
    where
        F: Fn(&PackageRequest) -> Result<Vec<Package>> + Send + Sync + 'static,
    {
        self.register(Capability::Package(Box::new(f)))
    }

    pub fn with_env_vars<F>(self, f: F) -> Self
    where
        F: Fn(&EnvVarRequest) -> Result<Vec<EnvVar>> + Send + Sync + 'static,
    {
        self.register(Capability::EnvVar(Box::new(f)))
    }

    pub fn with_init_rules<F>(self, f: F) -> Self
    where
        F: Fn(&TmpfilesRequest) -> Result<Vec<InitRule>> + Send + Sync + 'static,
    {
        self.register(Capability::InitRule(Box::new(f)))
    }

    pub fn with_prompts<F>(self, f: F) -> Self
    where
        F: Fn(&PromptRequest) -> Result<Vec<PromptFragment>> + Send + Sync + 'static,
    {
        self.register(Capability::Prompt(Box::new(f)))
    }

    pub fn with_generated_files<F>(self, f: F) -> Self
    where
        F: Fn(&GeneratedFileRequest) -> Result<Vec<GeneratedFile>> + Send + Sync + 'static,
    {
        self.register(Capability::GeneratedFile(Box::new(f)))
    }

    pub fn capability(&self, kind: CapabilityKind) -> Option<&Capability> {
        self.capabilities.get(&kind)
    }

    /// Registered kinds, in [`CapabilityKind`] order.
    pub fn kinds(&self) -> impl Iterator<Item = CapabilityKind> + '_ {
        self.capabilities.keys().copied()
    }
}
