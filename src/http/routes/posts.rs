//! `/api/posts` handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::generation::{GenerateRequest, GenerateResponse};
use crate::http::request::ApiJson;
use crate::http::server::AppState;
use crate::posts::{parse_post_id, DeletedPost, PageQuery, PostInput, PostPage, PostView};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub msg: &'static str,
    pub deleted_post: DeletedPost,
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<PostPage>, ApiError> {
    let (page, limit) = query.resolve()?;
    Ok(Json(state.posts.list(page, limit).await?))
}

pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<PostView>, ApiError> {
    let id = parse_post_id(&id)?;
    Ok(Json(state.posts.get(&id).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<PostInput>,
) -> Result<(StatusCode, Json<PostView>), ApiError> {
    let post = state.posts.create(&user.id, body).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<PostInput>,
) -> Result<Json<PostView>, ApiError> {
    let id = parse_post_id(&id)?;
    Ok(Json(state.posts.update(&user.id, &id, body).await?))
}

pub async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let id = parse_post_id(&id)?;
    let deleted_post = state.posts.delete(&user.id, &id).await?;
    Ok(Json(DeleteResponse {
        msg: "Post deleted successfully",
        deleted_post,
    }))
}

pub async fn generate_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiJson(body): ApiJson<GenerateRequest>,
) -> Result<Json<GenerateResponse>, ApiError> {
    Ok(Json(state.generation.generate(&user.id, body).await?))
}
