use clap::Parser;
use std::path::PathBuf;

use bachpan_core::config::Config;

const DEFAULT_CONFIG_PATH: &str = "bachpan.toml";

#[derive(Parser, Debug)]
#[command(name = "bachpan-server")]
pub struct Cli {
    /// Path to the configuration file
    #[arg(long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Override the port from the configuration file
    #[arg(long)]
    pub port: Option<u16>,
}

impl Cli {
    /// Read and validate the config named on the command line.
    pub fn load_config(&self) -> Result<Config, String> {
        let mut config = Config::from_file(&self.config)?;
        if let Some(port) = self.port {
            config.server.port = port;
        }
        Ok(config)
    }
}
