use axum::{
    debug_handler,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tokio::sync::mpsc::{self, UnboundedSender};
use uuid::Uuid;

use super::events::{ClientOp, ServerEvent};
use super::registry::RoomRegistry;
use super::store;

#[derive(Deserialize)]
pub(crate) struct HandshakeQuery {
    /// Initial room declared on the handshake; blank or absent means the
    /// fallback room.
    room: Option<String>,
}

/// `GET /hubs/chat`. The gate has already authenticated the handshake by
/// the time this handler runs.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    Query(HandshakeQuery { room }): Query<HandshakeQuery>,
    State(db_pool): State<SqlitePool>,
    State(registry): State<RoomRegistry>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let initial_room = store::normalize_room(room.as_deref());
    ws.on_upgrade(async move |socket| {
        handle_socket(socket, db_pool, registry, initial_room).await;
    })
}

async fn handle_socket(
    socket: WebSocket,
    db_pool: SqlitePool,
    registry: RoomRegistry,
    initial_room: String,
) {
    let conn_id = Uuid::now_v7();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let (mut sink, mut stream) = socket.split();

    // Writer task: drains this connection's event queue into the sink.
    // Fan-out senders never wait on the transport.
    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let Ok(json) = serde_json::to_string(&event) else {
                continue;
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    registry.join(conn_id, tx.clone(), &initial_room);
    tracing::debug!(%conn_id, room = %initial_room, "socket connected");

    while let Some(Ok(frame)) = stream.next().await {
        match frame {
            Message::Text(text) => {
                // Malformed frames are skipped, not fatal.
                let Ok(op) = serde_json::from_str::<ClientOp>(&text) else {
                    continue;
                };
                handle_op(op, conn_id, &tx, &db_pool, &registry).await;
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    registry.disconnect(conn_id);
    writer.abort();
    tracing::debug!(%conn_id, "socket disconnected");
}

/// Operations are processed in the order received on each connection.
async fn handle_op(
    op: ClientOp,
    conn_id: Uuid,
    tx: &UnboundedSender<ServerEvent>,
    db_pool: &SqlitePool,
    registry: &RoomRegistry,
) {
    match op {
        ClientOp::JoinRoom { room } => {
            registry.join(conn_id, tx.clone(), &store::normalize_room(Some(&room)));
        }
        ClientOp::LeaveRoom { room } => {
            registry.leave(conn_id, &store::normalize_room(Some(&room)));
        }
        ClientOp::SendMessage {
            room,
            sender,
            text,
            patient_id,
        } => {
            match store::append(
                db_pool,
                room.as_deref(),
                sender.as_deref(),
                &text,
                patient_id,
            )
            .await
            {
                Ok(msg) => {
                    let room = msg.room.clone();
                    registry.broadcast(&room, ServerEvent::NewMessage { message: msg });
                }
                // Persistence failed: nothing is broadcast, only the
                // invoking connection hears about it.
                Err(err) => {
                    let _ = tx.send(ServerEvent::Error {
                        message: err.to_string(),
                    });
                }
            }
        }
        ClientOp::GetRecent { room, take } => {
            let room = store::normalize_room(room.as_deref());
            match store::recent_by_room(db_pool, &room, take).await {
                Ok(messages) => {
                    let _ = tx.send(ServerEvent::Recent { room, messages });
                }
                Err(err) => {
                    let _ = tx.send(ServerEvent::Error {
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}
