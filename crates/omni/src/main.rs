use anyhow::Result;
use clap::Parser;

mod cli;
mod config_cmds;
mod custom_op;
mod repo;
mod up_cmd;

use cli::{Cli, Commands, ConfigCommands};
use omni_core::types::{HandlePath, UpDirection};

fn main() -> Result<()> {
    // Initialize tracing (output to stderr, initialize only once)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let output_format = cli.format.clone();
    let cd = cli.cd;

    match cli.command {
        Commands::Up { handle_path } => {
            up_cmd::handle_up(UpDirection::Up, handle_path, cd)?;
        }
        Commands::Down => {
            up_cmd::handle_up(UpDirection::Down, HandlePath::No, cd)?;
        }
        Commands::Config { cmd } => match cmd {
            ConfigCommands::Show => {
                config_cmds::handle_config_show(cd, output_format)?;
            }
            ConfigCommands::Path { no_local } => {
                config_cmds::handle_config_path(cd, no_local, output_format)?;
            }
            ConfigCommands::Org => {
                config_cmds::handle_config_org(cd, output_format)?;
            }
            ConfigCommands::Files => {
                config_cmds::handle_config_files(cd, output_format)?;
            }
            ConfigCommands::Get { key, default } => {
                config_cmds::handle_config_get(key, default, cd, output_format)?;
            }
        },
    }

    Ok(())
}
