use super::error::*;
use crate::application_port::{
    Admission, AuthError, AuthService, LoginInput, TokenCodec,
};
use crate::domain_model::{AuthTokens, PublicIdentity, TokenClaims, TokenKind, UserId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::HeaderValue;
use warp::http::header::CACHE_CONTROL;
use warp::{self, Reply, reject};

/// Header carrying a freshly rotated access token.
pub const ACCESS_TOKEN_HEADER: &str = "x-access-token";
/// Inbound refresh token, and the freshly rotated one on the way out.
pub const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

fn header_value(token: &str) -> Result<HeaderValue, warp::Rejection> {
    HeaderValue::from_str(token)
        .map_err(ApiErrorCode::internal)
        .map_err(reject::custom)
}

/// Responses that carry tokens must not be cached.
fn no_store(reply: impl Reply) -> warp::reply::Response {
    let mut response = reply.into_response();
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}

/// Hand a rotated pair to the client. The body is left untouched.
fn with_rotated_tokens(
    reply: impl Reply,
    rotated: Option<AuthTokens>,
) -> Result<warp::reply::Response, warp::Rejection> {
    let Some(tokens) = rotated else {
        return Ok(reply.into_response());
    };
    let mut response = no_store(reply);
    let headers = response.headers_mut();
    headers.insert(ACCESS_TOKEN_HEADER, header_value(&tokens.access_token.0)?);
    headers.insert(REFRESH_TOKEN_HEADER, header_value(&tokens.refresh_token.0)?);
    Ok(response)
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub secret: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub identity: PublicIdentity,
    pub tokens: AuthTokens,
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let login_input = LoginInput {
        email: body.email,
        secret: body.secret,
    };
    let login_result = auth_service
        .login(login_input)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let login_response = LoginResponse {
        identity: login_result.identity,
        tokens: login_result.tokens,
    };
    Ok(no_store(warp::reply::json(&ApiResponse::ok(login_response))))
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    body: RefreshRequest,
    token_codec: Arc<dyn TokenCodec>,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let claims = token_codec
        .verify(&body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let tokens = auth_service
        .refresh_tokens(claims.subject, &body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(no_store(warp::reply::json(&ApiResponse::ok(tokens))))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse;

pub async fn logout(
    admission: Admission,
    auth_service: Arc<dyn AuthService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    // a pair rotated on the way in dies with the session, so it is not returned
    auth_service
        .logout(admission.identity.id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(LogoutResponse)))
}

pub async fn me(admission: Admission) -> Result<impl warp::Reply, warp::Rejection> {
    let Admission { identity, rotated } = admission;
    with_rotated_tokens(warp::reply::json(&ApiResponse::ok(identity)), rotated)
}

#[derive(Debug, Serialize)]
pub struct WhoAmIResponse {
    pub id: UserId,
}

pub async fn whoami(admission: Admission) -> Result<impl warp::Reply, warp::Rejection> {
    let response = WhoAmIResponse {
        id: admission.identity.id,
    };
    with_rotated_tokens(warp::reply::json(&ApiResponse::ok(response)), admission.rotated)
}

#[derive(Deserialize)]
pub struct IntrospectRequest {
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct IntrospectResponse {
    pub active: bool,
    pub kind: Option<TokenKind>,
    pub claims: Option<TokenClaims>,
    pub reason: Option<ApiErrorCode>,
}

/// Reports what a token says and whether it would currently verify.
/// Nothing here admits a request.
pub async fn introspect(
    body: IntrospectRequest,
    token_codec: Arc<dyn TokenCodec>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let decoded = token_codec.decode(&body.token).await.ok();
    let verified = token_codec.verify(&body.token).await;

    let reason = match &verified {
        Ok(_) => None,
        Err(AuthError::TokenExpired) => Some(ApiErrorCode::TokenExpired),
        Err(_) => Some(ApiErrorCode::TokenInvalid),
    };
    let response = IntrospectResponse {
        active: verified.is_ok(),
        kind: decoded.as_ref().map(|c| c.kind),
        claims: decoded,
        reason,
    };
    Ok(warp::reply::json(&ApiResponse::ok(response)))
}
