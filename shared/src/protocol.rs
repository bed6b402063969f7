use serde::{Serialize, Deserialize};
use crate::types::ServiceInfo;

/// Separator between service name and clusters in rendered keys
pub const KEY_SEPARATOR: &str = "@@";

/// Staleness budget used when the backend does not send one
pub const DEFAULT_CACHE_MILLIS: u64 = 1000;

/// Default width of the refresh permit pool
pub const DEFAULT_UPDATE_THREAD_NUM: usize = 20;

/// Pause between two scheduler passes
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 1000;

/// Push packet types
pub const PUSH_TYPE_DOM: &str = "dom";
pub const PUSH_TYPE_SERVICE: &str = "service";
pub const PUSH_TYPE_DUMP: &str = "dump";

/// Push acknowledgement types
pub const ACK_PUSH: &str = "push-ack";
pub const ACK_DUMP: &str = "dump-ack";
pub const ACK_UNKNOWN: &str = "unknown-ack";

/// API path prefix
pub const API_PREFIX: &str = "/v1";

/// Datagram sent by the backend to the push listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPacket {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub data: String,

    #[serde(default)]
    pub last_ref_time: u64,
}

/// Reply to every push packet, echoing its `lastRefTime`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAck {
    #[serde(rename = "type")]
    pub kind: String,

    pub last_ref_time: u64,

    pub data: String,
}

impl PushAck {
    pub fn for_packet(packet: &PushPacket) -> Self {
        let kind = match packet.kind.as_str() {
            PUSH_TYPE_DOM | PUSH_TYPE_SERVICE => ACK_PUSH,
            PUSH_TYPE_DUMP => ACK_DUMP,
            _ => ACK_UNKNOWN,
        };
        Self {
            kind: kind.to_string(),
            last_ref_time: packet.last_ref_time,
            data: String::new(),
        }
    }
}

/// Parses one service document. Blank input, malformed JSON and documents
/// without a service name all yield `None`.
pub fn parse_service(raw: &str) -> Option<ServiceInfo> {
    if raw.trim().is_empty() {
        return None;
    }
    let service: ServiceInfo = serde_json::from_str(raw).ok()?;
    if service.name.is_empty() {
        return None;
    }
    Some(service)
}

/// Parses a JSON array of service documents.
pub fn parse_service_list(raw: &str) -> Option<Vec<ServiceInfo>> {
    serde_json::from_str(raw).ok()
}

/// Parses a multi-group reply: a JSON array of strings, each one a service
/// document on its own.
pub fn parse_fragments(raw: &str) -> Option<Vec<String>> {
    serde_json::from_str(raw).ok()
}
