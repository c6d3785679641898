use std::path::PathBuf;

use anyhow::{anyhow, Result};
use log::*;
use serde::Deserialize;
use structopt::StructOpt;

use coffeeshop::config::{self, EnvLogger, EnvOverrides};
use coffeeshop::menu::DrinkStore;
use infra::pool::PostgresConfig;

#[derive(Debug, StructOpt)]
#[structopt(name = "rb", about = "Coffee shop admin CLI")]
struct Opt {
    /// Input file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
    #[structopt(subcommand)]
    command: Commands,
}

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(name = "setup", about = "Create the drinks table")]
    Setup,
    #[structopt(name = "reset", about = "Drop all drinks and seed a single one")]
    Reset,
    #[structopt(name = "show-menu", about = "Show menu")]
    ShowMenu,
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(default)]
    postgres: Option<PostgresConfig>,
    #[serde(default)]
    env_logger: EnvLogger,
}

fn main() -> Result<()> {
    let opt = Opt::from_args();

    let config: Config = config::load(&opt.config)?;
    config.env_logger.builder().init();

    let postgres = EnvOverrides::from_env()?
        .postgres(config.postgres)
        .ok_or_else(|| anyhow!("no postgres section or DATABASE_URL"))?;
    let db = postgres.build()?;
    let mut conn = db.get()?;

    match opt.command {
        Commands::Setup => {
            conn.setup()?;
            info!("Schema ready");
        }
        Commands::Reset => {
            conn.reset()?;
            info!("Menu reset");
        }
        Commands::ShowMenu => {
            for drink in conn.list_all()? {
                println!("{}: {}", drink.id, drink.title);
            }
        }
    }

    Ok(())
}
