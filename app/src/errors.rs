use actix_web::error::PayloadError;
use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, ResponseError};
use err_derive::Error;
use log::*;
use serde::Serialize;

use crate::auth::AuthError;
use crate::menu::{NotFound, Rejected};

/// Everything a request can fail with, as seen by the client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(display = "bad request")]
    BadRequest,
    #[error(display = "not found")]
    NotFound,
    #[error(display = "method not allowed")]
    MethodNotAllowed,
    #[error(display = "payload too large")]
    PayloadTooLarge,
    #[error(display = "unprocessable")]
    Unprocessable,
    #[error(display = "{}", _0)]
    Auth(AuthError),
    #[error(display = "internal error: {:#}", _0)]
    Internal(anyhow::Error),
}

#[derive(Serialize, Debug)]
struct ErrorBody {
    success: bool,
    error: u16,
    message: &'static str,
}

#[derive(Serialize, Debug)]
struct AuthErrorBody {
    error: u16,
    code: &'static str,
    message: &'static str,
}

impl ApiError {
    fn message(&self) -> &'static str {
        match self {
            ApiError::BadRequest => "bad request",
            ApiError::NotFound => "not found",
            ApiError::MethodNotAllowed => "method not allowed",
            ApiError::PayloadTooLarge => "payload too large",
            ApiError::Unprocessable => "unprocessable",
            ApiError::Auth(e) => e.description,
            ApiError::Internal(_) => "internal server error",
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl From<actix_web::Error> for ApiError {
    fn from(err: actix_web::Error) -> Self {
        match err.as_error::<PayloadError>() {
            Some(PayloadError::Overflow) => ApiError::PayloadTooLarge,
            _ => {
                info!("Unreadable request body: {}", err);
                ApiError::BadRequest
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let cause = err.root_cause();
        if cause.downcast_ref::<NotFound>().is_some() {
            ApiError::NotFound
        } else if cause.downcast_ref::<Rejected>().is_some() {
            ApiError::Unprocessable
        } else {
            ApiError::Internal(err)
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Auth(e) => {
                StatusCode::from_u16(e.status).unwrap_or(StatusCode::UNAUTHORIZED)
            }
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        match self {
            ApiError::Auth(e) => HttpResponse::build(status).json(AuthErrorBody {
                error: status.as_u16(),
                code: e.code,
                message: e.description,
            }),
            other => {
                if let ApiError::Internal(e) = other {
                    error!("Internal error: {:?}", e);
                }
                HttpResponse::build(status).json(ErrorBody {
                    success: false,
                    error: status.as_u16(),
                    message: other.message(),
                })
            }
        }
    }
}

pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    debug!("No route for {} {}", req.method(), req.path());
    Err(ApiError::NotFound)
}

pub async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    debug!("Method {} not allowed on {}", req.method(), req.path());
    Err(ApiError::MethodNotAllowed)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::menu::DrinkId;
    use actix_web::body::to_bytes;
    use anyhow::Context;
    use serde_json::{json, Value};

    async fn body_of(err: ApiError) -> (StatusCode, Value) {
        let resp = err.error_response();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body()).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[actix_web::test]
    async fn plain_errors_have_success_flag() {
        let (status, body) = body_of(ApiError::Unprocessable).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            body,
            json!({"success": false, "error": 422, "message": "unprocessable"})
        );
    }

    #[actix_web::test]
    async fn auth_errors_omit_success_flag() {
        let (status, body) = body_of(AuthError::unauthorized().into()).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body,
            json!({"error": 403, "code": "unauthorized", "message": "Permission not found."})
        );
    }

    #[actix_web::test]
    async fn internal_errors_hide_details() {
        let err = anyhow::anyhow!("connection to db-7.internal:5432 refused");
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body,
            json!({"success": false, "error": 500, "message": "internal server error"})
        );
    }

    #[test]
    fn body_errors_are_classified() {
        let overflow = ApiError::from(actix_web::Error::from(PayloadError::Overflow));
        assert!(matches!(overflow, ApiError::PayloadTooLarge), "{:?}", overflow);

        let truncated = ApiError::from(actix_web::Error::from(PayloadError::Incomplete(None)));
        assert!(matches!(truncated, ApiError::BadRequest), "{:?}", truncated);
    }

    #[test]
    fn storage_errors_are_classified_through_context() {
        let missing: anyhow::Result<()> =
            Err(NotFound(DrinkId::new(4))).context("update drink");
        let missing = ApiError::from(missing.expect_err("error"));
        assert!(matches!(missing, ApiError::NotFound), "{:?}", missing);

        let rejected: anyhow::Result<()> =
            Err(Rejected("duplicate key".into())).context("insert drink");
        let rejected = ApiError::from(rejected.expect_err("error"));
        assert!(matches!(rejected, ApiError::Unprocessable), "{:?}", rejected);
    }
}
