use serde::{Deserialize, Serialize};

use super::store::ChatMessage;

/// Operations a connected socket client may invoke.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ClientOp {
    #[serde(rename_all = "camelCase")]
    JoinRoom { room: String },
    #[serde(rename_all = "camelCase")]
    LeaveRoom { room: String },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        room: Option<String>,
        sender: Option<String>,
        text: String,
        patient_id: Option<i64>,
    },
    #[serde(rename_all = "camelCase")]
    GetRecent {
        room: Option<String>,
        take: Option<i64>,
    },
}

/// Events the server pushes to socket clients. A closed union rather than
/// free-text event names so every kind is handled exhaustively.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    #[serde(rename_all = "camelCase")]
    NewMessage { message: ChatMessage },
    /// Reply to `getRecent`; delivered only to the invoking connection.
    #[serde(rename_all = "camelCase")]
    Recent {
        room: String,
        messages: Vec<ChatMessage>,
    },
    #[serde(rename_all = "camelCase")]
    Error { message: String },
}
