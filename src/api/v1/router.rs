use super::error::*;
use super::handler::{self, REFRESH_TOKEN_HEADER};
use crate::application_port::{Admission, AuthGate, GateMode, PresentedTokens};
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, reject};

const AUTHORIZATION_HEADER: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let login = warp::path("login")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and_then(handler::login);

    let refresh = warp::path("refresh")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.token_codec.clone()))
        .and(with(server.auth_service.clone()))
        .and_then(handler::refresh);

    let logout = warp::path("logout")
        .and(warp::path::end())
        .and(warp::post())
        .and(with_gate(server.auth_gate.clone(), GateMode::Rotating))
        .and(with(server.auth_service.clone()))
        .and_then(handler::logout);

    let me = warp::path("me")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_gate(server.auth_gate.clone(), GateMode::Rotating))
        .and_then(handler::me);

    let whoami = warp::path("whoami")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_gate(server.auth_gate.clone(), GateMode::AccessOnly))
        .and_then(handler::whoami);

    let introspect = warp::path("introspect")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::json())
        .and(with(server.token_codec.clone()))
        .and_then(handler::introspect);

    login.or(refresh).or(logout).or(me).or(whoami).or(introspect)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// Run the gate before the handler and pass the admission along.
fn with_gate(
    auth_gate: Arc<dyn AuthGate>,
    mode: GateMode,
) -> impl Filter<Extract = (Admission,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(AUTHORIZATION_HEADER)
        .and(warp::header::optional::<String>(REFRESH_TOKEN_HEADER))
        .and_then(move |authorization: Option<String>, refresh_token: Option<String>| {
            let auth_gate = auth_gate.clone();
            async move {
                let access_token = authorization
                    .as_deref()
                    .and_then(|value| value.strip_prefix(BEARER_PREFIX))
                    .map(str::to_string);
                let presented = PresentedTokens::new(access_token, refresh_token);
                auth_gate
                    .admit(presented, mode)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)
            }
        })
}
