use std::future::{ready, Ready};
use std::marker::PhantomData;

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use anyhow::anyhow;
use log::*;

use super::{AuthContext, AuthError, TokenVerifier};
use crate::errors::ApiError;

/// A permission string a route can demand of its caller's token.
pub trait Permission {
    const NAME: &'static str;
}

macro_rules! permissions {
    ($($(#[$meta:meta])* $ty:ident => $name:expr;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug)]
            pub enum $ty {}

            impl Permission for $ty {
                const NAME: &'static str = $name;
            }
        )*
    };
}

permissions! {
    /// Full recipes, for baristas and managers.
    GetDrinksDetail => "get:drinks-detail";
    PostDrinks => "post:drinks";
    PatchDrinks => "patch:drinks";
    DeleteDrinks => "delete:drinks";
}

/// Extractor that only succeeds for requests bearing a valid token that
/// grants `P`. Never touches storage.
#[derive(Debug)]
pub struct Authorized<P> {
    context: AuthContext,
    _permission: PhantomData<fn() -> P>,
}

pub fn require_permission(
    verifier: &TokenVerifier,
    header: Option<&str>,
    permission: &str,
) -> Result<AuthContext, AuthError> {
    let context = verifier.authorize(header)?;
    if !context.has_permission(permission) {
        return Err(AuthError::unauthorized());
    }
    Ok(context)
}

impl<P> Authorized<P> {
    pub fn context(&self) -> &AuthContext {
        &self.context
    }
}

impl<P: Permission> Authorized<P> {
    fn from_http(req: &HttpRequest) -> Result<Self, ApiError> {
        let verifier = req
            .app_data::<web::Data<TokenVerifier>>()
            .ok_or_else(|| ApiError::Internal(anyhow!("No token verifier registered")))?;
        let header = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok());

        let context = require_permission(verifier, header, P::NAME).map_err(|e| {
            info!("Refused {} {} ({}): {}", req.method(), req.path(), P::NAME, e);
            e
        })?;
        debug!("Granted {} to {:?}", P::NAME, context.subject);

        Ok(Authorized {
            context,
            _permission: PhantomData,
        })
    }
}

impl<P: Permission> FromRequest for Authorized<P> {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Self::from_http(req))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::KeySet;
    use actix_web::test::TestRequest;
    use jsonwebtoken::{Algorithm, EncodingKey, Header};
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};

    const PRIVATE_KEY: &str = include_str!("../../tests/keys/private.pem");
    const PUBLIC_KEY: &str = include_str!("../../tests/keys/public.pem");
    const ISSUER: &str = "https://coffee.example.auth0.com/";

    fn verifier() -> TokenVerifier {
        let mut keys = KeySet::new();
        keys.add_pem("test-key", PUBLIC_KEY.as_bytes())
            .expect("add key");
        TokenVerifier::new(ISSUER, "coffee", 0, keys)
    }

    fn bearer(permissions: &[&str]) -> String {
        let exp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_secs()
            + 600;
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some("test-key".to_string());
        let claims = json!({
            "iss": ISSUER,
            "aud": "coffee",
            "sub": "auth0|manager",
            "exp": exp,
            "permissions": permissions,
        });
        let key = EncodingKey::from_rsa_pem(PRIVATE_KEY.as_bytes()).expect("encoding key");
        let token = jsonwebtoken::encode(&header, &claims, &key).expect("sign");
        format!("Bearer {}", token)
    }

    #[test]
    fn extractor_exposes_verified_context() {
        let req = TestRequest::default()
            .app_data(web::Data::new(verifier()))
            .insert_header((header::AUTHORIZATION, bearer(&["post:drinks"])))
            .to_http_request();

        let auth = Authorized::<PostDrinks>::from_http(&req).expect("authorized");
        assert_eq!(auth.context().subject.as_deref(), Some("auth0|manager"));
        assert!(auth.context().has_permission(PostDrinks::NAME));
    }

    #[test]
    fn extractor_refuses_other_permissions() {
        let req = TestRequest::default()
            .app_data(web::Data::new(verifier()))
            .insert_header((header::AUTHORIZATION, bearer(&["post:drinks"])))
            .to_http_request();

        let err = Authorized::<DeleteDrinks>::from_http(&req).expect_err("refused");
        assert!(
            matches!(&err, ApiError::Auth(e) if *e == AuthError::unauthorized()),
            "{:?}",
            err
        );
    }

    #[test]
    fn extractor_without_verifier_is_internal() {
        let req = TestRequest::default()
            .insert_header((header::AUTHORIZATION, bearer(&["post:drinks"])))
            .to_http_request();

        let err = Authorized::<PostDrinks>::from_http(&req).expect_err("no verifier");
        assert!(matches!(err, ApiError::Internal(_)), "{:?}", err);
    }

    #[test]
    fn permission_names() {
        assert_eq!(GetDrinksDetail::NAME, "get:drinks-detail");
        assert_eq!(PostDrinks::NAME, "post:drinks");
        assert_eq!(PatchDrinks::NAME, "patch:drinks");
        assert_eq!(DeleteDrinks::NAME, "delete:drinks");
    }

    #[test]
    fn validation_failures_pass_through_unchanged() {
        let verifier = TokenVerifier::new("https://issuer/", "coffee", 0, KeySet::new());

        assert_eq!(
            require_permission(&verifier, None, PostDrinks::NAME),
            Err(AuthError::invalid_header("Authorization header is expected."))
        );
        assert_eq!(
            require_permission(&verifier, Some("Bearer x.y.z"), PostDrinks::NAME),
            Err(AuthError::invalid_header("Authorization malformed."))
        );
    }
}
