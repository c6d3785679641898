use actix_web::{web, HttpResponse};
use anyhow::{anyhow, Context};
use log::*;
use r2d2::Pool;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::models::{Drink, DrinkId, DrinkPatch, NewDrink, PatchSemantics};
use super::store::DrinkStore;
use crate::auth::{Authorized, DeleteDrinks, GetDrinksDetail, PatchDrinks, PostDrinks};
use crate::errors::{method_not_allowed, ApiError};

#[derive(Debug)]
pub struct Menu<M: r2d2::ManageConnection> {
    db: Pool<M>,
    patches: PatchSemantics,
}

#[derive(Serialize, Debug)]
struct Listing<T> {
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    success: bool,
    drinks: T,
}

impl<T: Serialize> Listing<T> {
    fn of(drinks: T) -> Self {
        Listing {
            status_code: None,
            success: true,
            drinks,
        }
    }

    fn respond(self) -> HttpResponse {
        HttpResponse::Ok().json(self)
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| {
        info!("Unusable request body: {}", e);
        ApiError::BadRequest
    })
}

impl<M: r2d2::ManageConnection<Connection = D>, D: DrinkStore + Send + 'static> Menu<M> {
    pub fn new(db: Pool<M>, patches: PatchSemantics) -> Self {
        if patches == PatchSemantics::Legacy {
            warn!("Drink edits apply at most one field per request (legacy patch semantics)");
        }
        Menu { db, patches }
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.clone()))
            .service(
                web::resource("/drinks")
                    .route(web::get().to(Self::index))
                    .route(web::post().to(Self::create))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/drinks-detail")
                    .route(web::get().to(Self::detail))
                    .default_service(web::to(method_not_allowed)),
            )
            .service(
                web::resource("/drinks/{id}")
                    .route(web::patch().to(Self::edit))
                    .route(web::delete().to(Self::remove))
                    .default_service(web::to(method_not_allowed)),
            );
    }

    async fn index(menu: web::Data<Self>) -> Result<HttpResponse, ApiError> {
        debug!("Handle index");
        let drinks = menu.in_pool(|docs| docs.list_all()).await?;
        let short = drinks.iter().map(Drink::short).collect::<Vec<_>>();
        let listing = Listing {
            status_code: Some(200),
            ..Listing::of(short)
        };
        Ok(listing.respond())
    }

    async fn detail(
        _: Authorized<GetDrinksDetail>,
        menu: web::Data<Self>,
    ) -> Result<HttpResponse, ApiError> {
        debug!("Handle detail");
        let drinks = menu.in_pool(|docs| docs.list_all()).await?;
        Ok(Listing::of(drinks).respond())
    }

    async fn create(
        auth: Authorized<PostDrinks>,
        menu: web::Data<Self>,
        body: Result<web::Bytes, actix_web::Error>,
    ) -> Result<HttpResponse, ApiError> {
        let drink = parse_body::<NewDrink>(&body?)?;
        debug!("Create drink: {:?}", drink);
        let drink = menu.in_pool(move |docs| docs.insert(drink)).await?;
        info!(
            "Created drink {}: {:?} for {:?}",
            drink.id,
            drink.title,
            auth.context().subject
        );
        Ok(Listing::of(drink).respond())
    }

    async fn edit(
        auth: Authorized<PatchDrinks>,
        menu: web::Data<Self>,
        id: web::Path<DrinkId>,
        body: Result<web::Bytes, actix_web::Error>,
    ) -> Result<HttpResponse, ApiError> {
        let id = id.into_inner();
        let patch = parse_body::<DrinkPatch>(&body?)?.resolve(menu.patches);
        debug!("Edit drink {}: {:?}", id, patch);
        let drink = menu.in_pool(move |docs| docs.update(id, patch)).await?;
        info!("Edited drink {} for {:?}", id, auth.context().subject);
        Ok(Listing::of(vec![drink]).respond())
    }

    async fn remove(
        auth: Authorized<DeleteDrinks>,
        menu: web::Data<Self>,
        id: web::Path<DrinkId>,
    ) -> Result<HttpResponse, ApiError> {
        let id = id.into_inner();
        let id = menu.in_pool(move |docs| docs.delete(id)).await?;
        info!("Deleted drink {} for {:?}", id, auth.context().subject);
        Ok(Listing::of(id).respond())
    }

    async fn in_pool<R, F>(&self, f: F) -> Result<R, ApiError>
    where
        R: Send + 'static,
        F: FnOnce(&mut D) -> anyhow::Result<R> + Send + 'static,
    {
        let db = self.db.clone();
        let res = web::block(move || {
            trace!("in_pool on {:?}", ::std::thread::current().name());
            let mut docs = db.get().context("check out connection")?;
            f(&mut *docs)
        })
        .await
        .map_err(|e| ApiError::Internal(anyhow!("{}", e)))?;
        Ok(res?)
    }
}

impl<M: r2d2::ManageConnection> Clone for Menu<M> {
    fn clone(&self) -> Self {
        let db = self.db.clone();
        let patches = self.patches;
        Menu { db, patches }
    }
}
