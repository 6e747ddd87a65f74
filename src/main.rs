mod cli;
mod config;
mod container;
mod contrib;
mod logger;
mod manifest;
mod mounter;
mod multiplexer;
mod pipeline;
mod reproducibility;
mod shell;

use anyhow::Result;
use tracing::{error, info};

fn main() -> Result<()> {
    logger::init()?;
    info!(args = ?std::env::args().collect::<Vec<_>>(), "agentbox start");

    match cli::run() {
        Ok(result) => {
            info!("agentbox finished successfully");
            Ok(result)
        }
        Err(err) => {
            error!(error = ?err, "agentbox failed");
            Err(err)
        }
    }
}
