//! Hermetic package resolution.
//!
//! Maps abstract `{name, version}` requests to installable nixpkgs references
//! and supplies the store mount and base toolset every sandbox needs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::contrib::{Mount, Package};

static ATTR_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_'-]*(\.[A-Za-z_][A-Za-z0-9_'-]*)*$").expect("valid regex")
});

static STORE_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/nix/store/[A-Za-z0-9+._?=-]+$").expect("valid regex"));

static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

/// Tools installed in every sandbox regardless of contributions.
const BASE_PACKAGES: &[&str] = &[
    "bashInteractive",
    "coreutils",
    "findutils",
    "gnugrep",
    "gnused",
    "git",
    "openssh",
    "curl",
    "jq",
    "ripgrep",
    "less",
    "cacert",
];

const NIX_STORE: &str = "/nix/store";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("invalid package name '{0}'")]
    InvalidName(String),
    #[error("invalid version '{version}' for package '{name}'")]
    InvalidVersion { name: String, version: String },
}

/// Pin for the `nixpkgs` flake registry entry inside the container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryPin {
    /// nixpkgs git revision
    #[serde(default)]
    pub revision: Option<String>,
    /// Local nixpkgs checkout or store path; wins over `revision`
    #[serde(default)]
    pub path: Option<String>,
}

impl RegistryPin {
    pub fn is_empty(&self) -> bool {
        self.revision.as_deref().is_none_or(str::is_empty)
            && self.path.as_deref().is_none_or(str::is_empty)
    }
}

/// A hermetic package ecosystem.
pub trait Reproducibility {
    /// Turn a package request into an installable reference.
    fn resolve_package(&self, package: &Package) -> Result<String, ResolveError>;

    /// The read-only package store mount.
    fn store_mount(&self) -> Mount;

    /// References installed in every sandbox.
    fn base_packages(&self) -> Vec<String>;

    /// Whether an already-resolved reference is safe to install verbatim.
    fn is_installable(&self, reference: &str) -> bool;

    /// Registry pin to emit, if any.
    fn registry_pin(&self) -> Option<RegistryPin> {
        None
    }
}

/// nixpkgs attribute resolution.
#[derive(Debug, Clone, Default)]
pub struct Nixpkgs {
    pin: Option<RegistryPin>,
}

impl Nixpkgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pin(mut self, pin: RegistryPin) -> Self {
        self.pin = (!pin.is_empty()).then_some(pin);
        self
    }
}

impl Reproducibility for Nixpkgs {
    /// `jq` -> `pkgs.jq`, `nodejs@20` -> `pkgs.nodejs_20`,
    /// `python3@3.12` -> `pkgs.python3_3_12`.
    fn resolve_package(&self, package: &Package) -> Result<String, ResolveError> {
        let name = package.name.trim();
        if !ATTR_PATH.is_match(name) {
            return Err(ResolveError::InvalidName(package.name.clone()));
        }

        match package.version() {
            None => Ok(format!("pkgs.{name}")),
            Some(version) => {
                if !VERSION.is_match(version) {
                    return Err(ResolveError::InvalidVersion {
                        name: package.name.clone(),
                        version: version.to_string(),
                    });
                }
                let mangled = version.replace(['.', '-'], "_");
                Ok(format!("pkgs.{name}_{mangled}"))
            }
        }
    }

    fn store_mount(&self) -> Mount {
        Mount::same_path(NIX_STORE, true)
    }

    fn base_packages(&self) -> Vec<String> {
        BASE_PACKAGES.iter().map(|p| format!("pkgs.{p}")).collect()
    }

    /// `pkgs.<attr path>` or a single `/nix/store/<name>` entry.
    fn is_installable(&self, reference: &str) -> bool {
        match reference.strip_prefix("pkgs.") {
            Some(attr) => ATTR_PATH.is_match(attr),
            None => STORE_PATH.is_match(reference),
        }
    }

    fn registry_pin(&self) -> Option<RegistryPin> {
        self.pin.clone()
    }
}
