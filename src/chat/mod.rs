pub mod events;
pub mod registry;
pub mod store;
mod ws;

use axum::{
    Json, Router, debug_handler,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::AppState;
use crate::error::ApiResult;
use events::ServerEvent;
use registry::RoomRegistry;
use store::ChatMessage;

/// REST surface, nested under `/api/chat`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/byPatient/{patient_id}", get(list_by_patient))
        .route("/{id}", get(get_one).delete(delete_one))
}

/// Socket surface, nested under `/hubs`.
pub fn hub_router() -> Router<AppState> {
    Router::new().route("/chat", get(ws::chat_ws))
}

#[derive(Deserialize)]
pub(crate) struct ListQuery {
    room: Option<String>,
    take: Option<i64>,
}

#[debug_handler]
async fn list(
    State(db_pool): State<SqlitePool>,
    Query(ListQuery { room, take }): Query<ListQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    let room = store::normalize_room(room.as_deref());
    Ok(Json(store::recent_by_room(&db_pool, &room, take).await?))
}

#[derive(Deserialize)]
pub(crate) struct TakeQuery {
    take: Option<i64>,
}

#[debug_handler]
async fn list_by_patient(
    State(db_pool): State<SqlitePool>,
    Path(patient_id): Path<i64>,
    Query(TakeQuery { take }): Query<TakeQuery>,
) -> ApiResult<Json<Vec<ChatMessage>>> {
    Ok(Json(
        store::recent_by_patient(&db_pool, patient_id, take).await?,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewMessageBody {
    room: Option<String>,
    sender: Option<String>,
    #[serde(default)]
    text: String,
    patient_id: Option<i64>,
}

/// Same append-then-broadcast sequence as the socket `sendMessage`, so
/// non-socket clients behave identically to connected ones.
#[debug_handler(state = AppState)]
async fn create(
    State(db_pool): State<SqlitePool>,
    State(registry): State<RoomRegistry>,
    Json(body): Json<NewMessageBody>,
) -> ApiResult<Response> {
    let msg = store::append(
        &db_pool,
        body.room.as_deref(),
        body.sender.as_deref(),
        &body.text,
        body.patient_id,
    )
    .await?;

    registry.broadcast(
        &msg.room,
        ServerEvent::NewMessage {
            message: msg.clone(),
        },
    );

    let location = format!("/api/chat/{}", msg.id);
    Ok((
        StatusCode::CREATED,
        [(header::LOCATION, location)],
        Json(msg),
    )
        .into_response())
}

#[debug_handler]
async fn get_one(
    State(db_pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> ApiResult<Json<ChatMessage>> {
    Ok(Json(store::get(&db_pool, id).await?))
}

/// Hard delete. Connected clients are not notified that a message
/// disappeared; there is no retraction event.
#[debug_handler]
async fn delete_one(
    State(db_pool): State<SqlitePool>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    store::delete(&db_pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
