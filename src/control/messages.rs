//! Control channel wire format.
//!
//! Every frame is a JSON text message tagged by `type`:
//!
//! ```text
//! {"type":"NewSessionAuthorized","payload":{"contentToken":"...","internalUri":"...","publicUri":"..."}}
//! {"type":"ProxyConfigurationReport","payload":{"connectionId":"...","snapshot":{"routes":[...],"clusters":[...]}}}
//! ```

use serde::{Deserialize, Serialize};

use crate::routing::Snapshot;

/// A session lifecycle event pushed by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEvent {
    /// Opaque token clients send to reach this session's backend.
    pub content_token: String,
    /// Backend instance address, reachable from the proxy.
    pub internal_uri: String,
    /// Address the client uses.
    pub public_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requesting_host: Option<String>,
}

/// Messages received from the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum InboundMessage {
    NewSessionAuthorized(SessionEvent),
    SessionActivity(SessionEvent),
    SessionClosed(SessionEvent),
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::NewSessionAuthorized(_) => "new_session_authorized",
            InboundMessage::SessionActivity(_) => "session_activity",
            InboundMessage::SessionClosed(_) => "session_closed",
        }
    }
}

/// Messages sent to the orchestrator.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "payload")]
pub enum OutboundMessage<'a> {
    #[serde(rename_all = "camelCase")]
    ProxyConfigurationReport {
        connection_id: &'a str,
        snapshot: &'a Snapshot,
    },
}
