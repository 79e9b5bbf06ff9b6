use axum::extract::{Path, State};
use axum::Json;

use domains::{CategoryId, CategoryNode, CategoryPath};

use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /api/categories`
pub async fn tree(State(state): State<AppState>) -> ApiResult<Json<Vec<CategoryNode>>> {
    Ok(Json(state.categories.tree().await?))
}

/// `GET /api/categories/{id}/path`
pub async fn path(
    State(state): State<AppState>,
    Path(id): Path<CategoryId>,
) -> ApiResult<Json<CategoryPath>> {
    Ok(Json(state.categories.resolve_path(id).await?))
}
