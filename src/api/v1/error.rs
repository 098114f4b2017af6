use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::warn;
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        *code
    } else if err.is_not_found() {
        ApiErrorCode::RouteNotFound
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::InvalidHeader>().is_some()
        || err.find::<warp::reject::UnsupportedMediaType>().is_some()
        || err.find::<warp::reject::PayloadTooLarge>().is_some()
    {
        ApiErrorCode::InvalidRequest
    } else {
        ApiErrorCode::internal(format!("unhandled rejection: {:?}", err))
    };

    let json = warp::reply::json(&ApiResponse::<()>::err(code, code.to_string()));
    Ok(warp::reply::with_status(json, code.status()))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Authentication tokens are required")]
    MissingTokens,
    #[error("Invalid email or secret")]
    InvalidCredentials,
    #[error("Identity not found")]
    NotFound,
    #[error("Identity is blocked")]
    Forbidden,
    #[error("Token has expired")]
    TokenExpired,
    #[error("Token is not valid")]
    TokenInvalid,
    #[error("Session is no longer valid, please log in again")]
    SessionInvalidated,
    #[error("Malformed request")]
    InvalidRequest,
    #[error("No such route")]
    RouteNotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    /// Log the detail here; the client only ever sees the generic message.
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::MissingTokens
            | ApiErrorCode::InvalidCredentials
            | ApiErrorCode::TokenExpired
            | ApiErrorCode::TokenInvalid
            | ApiErrorCode::SessionInvalidated => StatusCode::UNAUTHORIZED,
            ApiErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ApiErrorCode::NotFound | ApiErrorCode::RouteNotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::MissingTokens => ApiErrorCode::MissingTokens,
            AuthError::InvalidCredentials => ApiErrorCode::InvalidCredentials,
            AuthError::NotFound => ApiErrorCode::NotFound,
            AuthError::Forbidden => ApiErrorCode::Forbidden,
            AuthError::TokenExpired => ApiErrorCode::TokenExpired,
            AuthError::TokenInvalid => ApiErrorCode::TokenInvalid,
            AuthError::SessionInvalidated => ApiErrorCode::SessionInvalidated,
            AuthError::Store(e) => ApiErrorCode::internal(e),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}
