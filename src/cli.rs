use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing::debug;

use crate::config::Config;
use crate::manifest::Renderer;
use crate::multiplexer::MultiplexerKind;
use crate::pipeline;

/// Sandbox file used when `--config` is not given
const DEFAULT_CONFIG: &str = "agentbox.yaml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "agentbox")]
#[command(about = "Generates NixOS container manifests for isolated coding agent sandboxes")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render the container manifest for a sandbox
    Render {
        /// Sandbox configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Write the manifest here instead of stdout
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override the configured multiplexer (tmux, wezterm)
        #[arg(short, long)]
        multiplexer: Option<MultiplexerKind>,
    },

    /// Check a sandbox configuration without writing anything
    Validate {
        /// Sandbox configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,

        /// Override the configured multiplexer (tmux, wezterm)
        #[arg(short, long)]
        multiplexer: Option<MultiplexerKind>,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Render {
            config,
            out,
            multiplexer,
        } => {
            let renderer = Renderer::new()?;
            render(
                &load(&config, multiplexer)?,
                &renderer,
                &config,
                out.as_deref(),
            )
        }
        Commands::Validate {
            config,
            multiplexer,
        } => validate(&load(&config, multiplexer)?, &config),
        Commands::Completions { shell } => {
            generate_completions(shell);
            Ok(())
        }
    }
}

fn load(config_path: &Path, multiplexer: Option<MultiplexerKind>) -> Result<Config> {
    let mut config = Config::load(config_path)?;
    if multiplexer.is_some() {
        config.multiplexer = multiplexer;
    }
    Ok(config)
}

fn render(
    config: &Config,
    renderer: &Renderer,
    config_path: &Path,
    out: Option<&Path>,
) -> Result<()> {
    debug!(config = %config_path.display(), "cli:render");
    let rendered = pipeline::render(config, renderer)?;

    match out {
        Some(path) => {
            write_atomically(path, rendered.manifest.as_bytes())?;
            eprintln!("Wrote {} for sandbox '{}'", path.display(), rendered.model.name);
        }
        None => {
            let mut stdout = io::stdout().lock();
            stdout
                .write_all(rendered.manifest.as_bytes())
                .context("Failed to write manifest to stdout")?;
        }
    }
    Ok(())
}

fn validate(config: &Config, config_path: &Path) -> Result<()> {
    let model = pipeline::validate(config)?;
    println!(
        "✓ {} is valid: sandbox '{}' at {}, {} packages, {} mounts",
        config_path.display(),
        model.name,
        model.local_address,
        model.packages.len(),
        model.mounts.len()
    );
    Ok(())
}

fn write_atomically(path: &Path, content: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!(path = %path.display(), bytes = content.len(), "cli:wrote manifest");
    Ok(())
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}
