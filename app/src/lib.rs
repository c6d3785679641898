use actix_web::web;
use anyhow::{anyhow, Context, Result};
use log::*;
use r2d2::Pool;

use infra::memory::MemoryConnectionManager;
use infra::pool::PgManager;

pub mod auth;
pub mod config;
pub mod errors;
pub mod menu;

use crate::auth::TokenVerifier;
use crate::errors::ApiError;
use crate::menu::{DrinkStore, MemoryDrinks, Menu, PatchSemantics};

pub type MemoryManager = MemoryConnectionManager<MemoryDrinks>;

/// The whole API, ready to be mounted on an `App`.
pub struct CoffeeShop<M: r2d2::ManageConnection> {
    menu: Menu<M>,
    verifier: web::Data<TokenVerifier>,
}

impl CoffeeShop<PgManager> {
    pub async fn postgres(config: &config::Config) -> Result<Self> {
        let postgres = config
            .postgres
            .clone()
            .ok_or_else(|| anyhow!("no postgres section configured"))?;
        let verifier = config.auth.verifier().await?;

        let db = web::block(move || -> Result<Pool<PgManager>> {
            let db = postgres.build()?;
            debug!("Init schema");
            db.get()?.setup().context("Setup persistence")?;
            Ok(db)
        })
        .await
        .context("postgres setup")??;

        Ok(Self::from_parts(db, verifier, config.menu.patch))
    }
}

impl CoffeeShop<MemoryManager> {
    pub async fn in_memory(config: &config::Config) -> Result<Self> {
        warn!("No postgres configured; drinks are kept in memory only");
        let verifier = config.auth.verifier().await?;
        let db = MemoryManager::new().build().context("memory pool")?;
        db.get()?.reset()?;
        Ok(Self::from_parts(db, verifier, config.menu.patch))
    }
}

impl<M: r2d2::ManageConnection<Connection = D>, D: DrinkStore + Send + 'static> CoffeeShop<M> {
    pub fn from_parts(db: Pool<M>, verifier: TokenVerifier, patches: PatchSemantics) -> Self {
        let menu = Menu::new(db, patches);
        let verifier = web::Data::new(verifier);
        CoffeeShop { menu, verifier }
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        info!("Booting coffeeshop");
        cfg.app_data(self.verifier.clone())
            .app_data(web::PathConfig::default().error_handler(|err, req| {
                debug!("Bad path {}: {}", req.path(), err);
                ApiError::NotFound.into()
            }));
        self.menu.configure(cfg);
        cfg.default_service(web::to(errors::not_found));
    }
}

impl<M: r2d2::ManageConnection> Clone for CoffeeShop<M> {
    fn clone(&self) -> Self {
        let menu = self.menu.clone();
        let verifier = self.verifier.clone();
        CoffeeShop { menu, verifier }
    }
}
