use std::net::SocketAddr;
use std::path::PathBuf;

use actix_cors::Cors;
use actix_web::{middleware, App, HttpServer};
use anyhow::{Context, Result};
use log::*;
use serde::Deserialize;
use structopt::StructOpt;

use coffeeshop::config::{self, EnvLogger, EnvOverrides};
use coffeeshop::menu::DrinkStore;
use coffeeshop::CoffeeShop;

#[derive(Debug, StructOpt)]
#[structopt(name = "serve", about = "Serve the coffee shop menu.")]
struct Opt {
    /// Input file
    #[structopt(parse(from_os_str))]
    config: PathBuf,
}

#[derive(Deserialize, Debug)]
struct Config {
    #[serde(flatten)]
    coffeeshop: config::Config,
    #[serde(default)]
    listener: Listener,
    #[serde(default)]
    cors: CorsConfig,
    #[serde(default)]
    env_logger: EnvLogger,
}

#[derive(Deserialize, Debug)]
struct Listener {
    addr: SocketAddr,
}

#[derive(Deserialize, Debug)]
struct CorsConfig {
    /// `"*"` allows any origin.
    allowed_origins: Vec<String>,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
        }
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        CorsConfig {
            allowed_origins: vec!["http://localhost:8100".to_string()],
        }
    }
}

impl CorsConfig {
    fn build(&self) -> Cors {
        let cors = Cors::default()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);
        if self.allowed_origins.iter().any(|o| o == "*") {
            return cors.allow_any_origin();
        }
        self.allowed_origins
            .iter()
            .fold(cors, |cors, origin| cors.allowed_origin(origin))
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();

    let mut config: Config = config::load(&opt.config)?;
    config.env_logger.builder().init();
    debug!("Options: {:?}", opt);

    let env = EnvOverrides::from_env()?;
    if let Some(addr) = env.listen_addr {
        config.listener.addr = addr;
    }
    config.coffeeshop.apply(&env);

    if config.coffeeshop.postgres.is_some() {
        let shop = CoffeeShop::postgres(&config.coffeeshop).await?;
        run(shop, &config).await
    } else {
        let shop = CoffeeShop::in_memory(&config.coffeeshop).await?;
        run(shop, &config).await
    }
}

async fn run<M, D>(shop: CoffeeShop<M>, config: &Config) -> Result<()>
where
    M: r2d2::ManageConnection<Connection = D>,
    D: DrinkStore + Send + 'static,
{
    let cors = config.cors.allowed_origins.clone();
    let srv = HttpServer::new(move || {
        let cors = CorsConfig {
            allowed_origins: cors.clone(),
        };
        App::new()
            .wrap(cors.build())
            .wrap(middleware::Logger::default())
            .configure(|cfg| shop.configure(cfg))
    })
    .bind(config.listener.addr)
    .context("bind")?;
    info!("Listening on: {:?}", srv.addrs());

    srv.run().await.context("server")?;
    Ok(())
}
