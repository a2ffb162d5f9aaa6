use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::error::AppResult;
use crate::service::Paginated;
use crate::state::AppState;
use crate::store::{Record, RecordId};
use crate::types::{CreatePostRequest, UpdatePostRequest};

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> AppResult<Json<Paginated<Record>>> {
    Ok(Json(state.posts.list(&query).await?))
}

pub async fn get_post(State(state): State<AppState>, Path(id): Path<RecordId>) -> AppResult<Json<Record>> {
    Ok(Json(state.posts.get(id).await?))
}

pub async fn create_post(
    State(state): State<AppState>,
    Json(req): Json<CreatePostRequest>,
) -> AppResult<impl IntoResponse> {
    let post = state.posts.create(req).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<RecordId>,
    Json(req): Json<UpdatePostRequest>,
) -> AppResult<Json<Record>> {
    Ok(Json(state.posts.update(id, req).await?))
}

pub async fn delete_post(State(state): State<AppState>, Path(id): Path<RecordId>) -> AppResult<StatusCode> {
    state.posts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
