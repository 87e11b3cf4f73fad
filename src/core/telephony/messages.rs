//! Vapi REST request and response bodies.

use serde::{Deserialize, Serialize};
use url::Url;

use super::base::{TelephonyError, TelephonyResult};

/// Transport provider that streams call audio over a WebSocket.
pub const WEBSOCKET_TRANSPORT_PROVIDER: &str = "vapi.websocket";

/// Body of `POST /call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCallRequest {
    pub assistant_id: String,
    pub transport: TransportRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportRequest {
    pub provider: String,
}

impl CreateCallRequest {
    /// Request a call for `assistant_id` on the WebSocket transport.
    pub fn websocket(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            transport: TransportRequest {
                provider: WEBSOCKET_TRANSPORT_PROVIDER.to_string(),
            },
        }
    }
}

/// Call object returned by the API. Only the fields the relay reads are typed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Call {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub assistant_id: Option<String>,
    #[serde(default)]
    pub transport: Option<serde_json::Value>,
}

impl Call {
    /// The call id, which must be present and non-empty.
    pub fn call_id(&self) -> TelephonyResult<&str> {
        match self.id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(TelephonyError::InvalidResponse(
                "call response has no id".to_string(),
            )),
        }
    }

    /// The audio WebSocket URL from `transport.websocketCallUrl`.
    ///
    /// The transport must be a JSON object and the URL must use `ws` or `wss`.
    pub fn websocket_call_url(&self) -> TelephonyResult<Url> {
        let transport = self
            .transport
            .as_ref()
            .and_then(|t| t.as_object())
            .ok_or_else(|| {
                TelephonyError::InvalidResponse(
                    "call response has no transport object".to_string(),
                )
            })?;

        let raw = transport
            .get("websocketCallUrl")
            .and_then(|u| u.as_str())
            .ok_or_else(|| {
                TelephonyError::InvalidResponse(
                    "transport has no websocketCallUrl".to_string(),
                )
            })?;

        let url = Url::parse(raw).map_err(|e| {
            TelephonyError::InvalidResponse(format!("invalid websocketCallUrl '{raw}': {e}"))
        })?;

        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(TelephonyError::InvalidResponse(format!(
                "websocketCallUrl must use ws or wss, got '{other}'"
            ))),
        }
    }
}
