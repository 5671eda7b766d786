//! Command-line interface

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;
use crate::error::AppError;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// YAML config file, layered over the default search locations.
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Socket address to listen on, e.g. 127.0.0.1:9000.
    #[arg(long)]
    pub listen: Option<String>,

    /// Default log level when RUST_LOG is unset (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl Cli {
    /// Load the layered configuration and apply flag overrides on top
    pub fn load_config(&self) -> Result<Config, AppError> {
        let mut config = Config::load(self.config.as_deref())?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.listen_address = listen.clone();
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
    }
}
