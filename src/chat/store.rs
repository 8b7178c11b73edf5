use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use time::OffsetDateTime;

use crate::error::{ApiError, ApiResult};

/// Room substituted whenever a caller supplies no room or a blank one.
pub const DEFAULT_ROOM: &str = "general";

/// Number of messages returned when the caller gives no `take`.
pub const DEFAULT_TAKE: i64 = 50;
/// Clamp ceiling for room-scoped reads.
pub const ROOM_TAKE_MAX: i64 = 200;
/// Clamp ceiling for patient-scoped reads.
pub const PATIENT_TAKE_MAX: i64 = 500;

/// A persisted chat message. Immutable once written; hard delete is the
/// only mutation.
#[derive(Clone, Debug, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub room: String,
    pub sender: String,
    pub text: String,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: OffsetDateTime,
    /// Loose association only; patient existence is deliberately not
    /// checked here, unlike the portal's CRUD controllers.
    pub patient_id: Option<i64>,
}

pub async fn init_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS chat_messages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            room TEXT NOT NULL,
            sender TEXT NOT NULL DEFAULT '',
            text TEXT NOT NULL,
            sent_at TEXT NOT NULL,
            patient_id INTEGER
        )",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_room
         ON chat_messages (room, sent_at)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_patient
         ON chat_messages (patient_id, sent_at)",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Trims and defaults a caller-supplied room name.
pub fn normalize_room(room: Option<&str>) -> String {
    match room.map(str::trim) {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => DEFAULT_ROOM.to_string(),
    }
}

fn clamp_take(take: Option<i64>, max: i64) -> i64 {
    take.unwrap_or(DEFAULT_TAKE).clamp(1, max)
}

/// Persists one message. `sent_at` is assigned server-side at the moment
/// of the insert; clients may not set it.
pub async fn append(
    pool: &SqlitePool,
    room: Option<&str>,
    sender: Option<&str>,
    text: &str,
    patient_id: Option<i64>,
) -> ApiResult<ChatMessage> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ApiError::Validation("text must not be empty".to_string()));
    }

    let room = normalize_room(room);
    let sender = sender.unwrap_or_default();
    let sent_at = OffsetDateTime::now_utc();

    let msg = sqlx::query_as::<_, ChatMessage>(
        "INSERT INTO chat_messages (room, sender, text, sent_at, patient_id)
         VALUES (?, ?, ?, ?, ?)
         RETURNING id, room, sender, text, sent_at, patient_id",
    )
    .bind(&room)
    .bind(sender)
    .bind(text)
    .bind(sent_at)
    .bind(patient_id)
    .fetch_one(pool)
    .await?;

    Ok(msg)
}

/// The most recent `take` messages for `room`, oldest first for natural
/// chat-log reading. `take` is clamped to `1..=200`.
pub async fn recent_by_room(
    pool: &SqlitePool,
    room: &str,
    take: Option<i64>,
) -> ApiResult<Vec<ChatMessage>> {
    let take = clamp_take(take, ROOM_TAKE_MAX);
    let mut msgs = sqlx::query_as::<_, ChatMessage>(
        "SELECT id, room, sender, text, sent_at, patient_id
         FROM chat_messages WHERE room = ?
         ORDER BY sent_at DESC, id DESC LIMIT ?",
    )
    .bind(room)
    .bind(take)
    .fetch_all(pool)
    .await?;
    msgs.reverse();
    Ok(msgs)
}

/// Same contract as [`recent_by_room`] but filtered by patient; clamped
/// to `1..=500`.
pub async fn recent_by_patient(
    pool: &SqlitePool,
    patient_id: i64,
    take: Option<i64>,
) -> ApiResult<Vec<ChatMessage>> {
    let take = clamp_take(take, PATIENT_TAKE_MAX);
    let mut msgs = sqlx::query_as::<_, ChatMessage>(
        "SELECT id, room, sender, text, sent_at, patient_id
         FROM chat_messages WHERE patient_id = ?
         ORDER BY sent_at DESC, id DESC LIMIT ?",
    )
    .bind(patient_id)
    .bind(take)
    .fetch_all(pool)
    .await?;
    msgs.reverse();
    Ok(msgs)
}

pub async fn get(pool: &SqlitePool, id: i64) -> ApiResult<ChatMessage> {
    sqlx::query_as::<_, ChatMessage>(
        "SELECT id, room, sender, text, sent_at, patient_id
         FROM chat_messages WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(ApiError::NotFound)
}

pub async fn delete(pool: &SqlitePool, id: i64) -> ApiResult<()> {
    let result = sqlx::query("DELETE FROM chat_messages WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::NotFound);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn blank_room_falls_back_to_default() {
        let pool = test_pool().await;
        for room in [None, Some(""), Some("   ")] {
            let msg = append(&pool, room, Some("s"), "hi", None).await.unwrap();
            assert_eq!(msg.room, DEFAULT_ROOM);
        }
    }

    #[tokio::test]
    async fn text_is_trimmed_and_blank_text_rejected() {
        let pool = test_pool().await;

        let err = append(&pool, Some("room"), Some("s"), "  ", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let msg = append(&pool, Some("room"), Some("s"), "  hi  ", None)
            .await
            .unwrap();
        assert_eq!(msg.text, "hi");
    }

    #[tokio::test]
    async fn recent_by_room_returns_newest_ascending() {
        let pool = test_pool().await;
        for i in 0..5 {
            append(&pool, Some("lobby"), Some("s"), &format!("m{i}"), None)
                .await
                .unwrap();
        }

        let msgs = recent_by_room(&pool, "lobby", Some(2)).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].text, "m3");
        assert_eq!(msgs[1].text, "m4");
        assert!(msgs[0].sent_at <= msgs[1].sent_at);
        assert!(msgs[0].id < msgs[1].id);
    }

    #[tokio::test]
    async fn take_is_clamped_to_configured_range() {
        let pool = test_pool().await;
        for i in 0..3 {
            append(&pool, Some("lobby"), Some("s"), &format!("m{i}"), None)
                .await
                .unwrap();
        }

        // Oversized takes are capped, zero is raised to one.
        let msgs = recent_by_room(&pool, "lobby", Some(10_000)).await.unwrap();
        assert_eq!(msgs.len(), 3);
        let msgs = recent_by_room(&pool, "lobby", Some(0)).await.unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].text, "m2");
    }

    #[tokio::test]
    async fn recent_by_patient_filters_on_patient() {
        let pool = test_pool().await;
        append(&pool, Some("a"), Some("s"), "for 1", Some(1)).await.unwrap();
        append(&pool, Some("b"), Some("s"), "for 2", Some(2)).await.unwrap();
        append(&pool, Some("c"), Some("s"), "for 2 too", Some(2))
            .await
            .unwrap();

        let msgs = recent_by_patient(&pool, 2, None).await.unwrap();
        assert_eq!(msgs.len(), 2);
        assert!(msgs.iter().all(|m| m.patient_id == Some(2)));
        assert_eq!(msgs[0].text, "for 2");
    }

    #[tokio::test]
    async fn get_and_delete_report_missing_rows() {
        let pool = test_pool().await;
        let msg = append(&pool, Some("lobby"), Some("s"), "hi", None)
            .await
            .unwrap();

        assert_eq!(get(&pool, msg.id).await.unwrap().text, "hi");
        delete(&pool, msg.id).await.unwrap();
        assert!(matches!(get(&pool, msg.id).await, Err(ApiError::NotFound)));
        assert!(matches!(delete(&pool, msg.id).await, Err(ApiError::NotFound)));
        assert!(matches!(delete(&pool, 999).await, Err(ApiError::NotFound)));
    }
}
