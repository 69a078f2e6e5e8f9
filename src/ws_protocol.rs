use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::view::SessionView;

pub const STATE_UPDATE: &str = "state_update";
pub const KEY_PRESS: &str = "key";
pub const COMMAND_ERROR: &str = "error";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    pub event: String,
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ts: Option<String>,
}

impl WsEnvelope {
    pub fn new(event: &str, payload: Value, request_id: Option<String>) -> Self {
        Self {
            event: event.to_string(),
            payload,
            request_id,
            ts: Some(Utc::now().to_rfc3339()),
        }
    }

    pub fn state_update(view: &SessionView) -> Self {
        let payload = serde_json::to_value(view).unwrap_or(Value::Null);
        Self::new(STATE_UPDATE, payload, None)
    }
}
