use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::db::PgItemRepository;
use crate::error::AppResult;
use crate::extract::{ValidJson, ValidPath, ValidQuery};
use crate::models::{CreateItem, Item, ItemList, ListParams, UpdateItem};
use crate::routes::AppState;
use crate::services::ItemService;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route(
            "/items/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
}

async fn list_items(
    State(state): State<AppState>,
    ValidQuery(params): ValidQuery<ListParams>,
) -> AppResult<Json<ItemList>> {
    let mut session = state.sessions.acquire().await?;
    let mut service = ItemService::new(PgItemRepository::new(&mut session));
    Ok(Json(service.list(params).await?))
}

async fn get_item(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> AppResult<Json<Item>> {
    let mut session = state.sessions.acquire().await?;
    let mut service = ItemService::new(PgItemRepository::new(&mut session));
    Ok(Json(service.get_by_id(id).await?))
}

async fn create_item(
    State(state): State<AppState>,
    ValidJson(input): ValidJson<CreateItem>,
) -> AppResult<(StatusCode, Json<Item>)> {
    let mut session = state.sessions.acquire().await?;
    let mut service = ItemService::new(PgItemRepository::new(&mut session));
    let item = service.create(input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

// PUT keeps patch semantics: only the fields present in the body change.
async fn update_item(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
    ValidJson(input): ValidJson<UpdateItem>,
) -> AppResult<Json<Item>> {
    let mut session = state.sessions.acquire().await?;
    let mut service = ItemService::new(PgItemRepository::new(&mut session));
    Ok(Json(service.update(id, input).await?))
}

async fn delete_item(
    State(state): State<AppState>,
    ValidPath(id): ValidPath<Uuid>,
) -> AppResult<StatusCode> {
    let mut session = state.sessions.acquire().await?;
    let mut service = ItemService::new(PgItemRepository::new(&mut session));
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
