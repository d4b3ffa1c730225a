//! `/api/users` handlers.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, State},
    Json,
};

use crate::accounts::{AuthSession, CredentialsRequest};
use crate::error::ApiError;
use crate::http::request::ApiJson;
use crate::http::server::AppState;

pub async fn register(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ApiJson(body): ApiJson<CredentialsRequest>,
) -> Result<Json<AuthSession>, ApiError> {
    let session = state.accounts.register(&addr.ip().to_string(), body).await?;
    Ok(Json(session))
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    ApiJson(body): ApiJson<CredentialsRequest>,
) -> Result<Json<AuthSession>, ApiError> {
    let session = state.accounts.login(&addr.ip().to_string(), body).await?;
    Ok(Json(session))
}
