//! Renders a [`RenderModel`] into a NixOS container module.

pub mod nix;

use minijinja::{AutoEscape, Environment, UndefinedBehavior};

use crate::container::RenderModel;

const TEMPLATE_NAME: &str = "container.nix";
const TEMPLATE: &str = include_str!("templates/container.nix.j2");

/// Template evaluation failed. The model is fully validated by the time it
/// reaches the renderer, so this indicates a template bug.
#[derive(Debug, thiserror::Error)]
#[error("failed to render container manifest")]
pub struct RenderError(#[from] minijinja::Error);

/// Owns the template environment. Build once and reuse for many renders.
pub struct Renderer {
    env: Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.set_auto_escape_callback(|_| AutoEscape::None);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.add_filter("nix_str", nix_str_filter);
        env.add_filter("nix_block", nix_block_filter);
        env.add_template(TEMPLATE_NAME, TEMPLATE)?;
        Ok(Self { env })
    }

    /// Render the manifest. Identical models always produce identical text.
    pub fn render(&self, model: &RenderModel) -> Result<String, RenderError> {
        let template = self.env.get_template(TEMPLATE_NAME)?;
        Ok(template.render(model)?)
    }
}

fn nix_str_filter(value: String) -> String {
    nix::string(&value)
}

fn nix_block_filter(value: String, width: usize) -> String {
    nix::block(&value, width)
}
