//! WebSocket wire protocol.
//!
//! Every frame is a JSON object `{appId, sectionId?, message?, …}`. Frames
//! addressed to the core application carry topology actions
//! (`{action: "create"|"read"|"update"|"delete", …}`) or clock traffic
//! (`clockReSync`, `clockDiff`, `syncResults`). Frames relayed between
//! servers additionally carry `forwardedBy`, the list of server IDs that
//! have already forwarded them.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};

use crate::errors::ProtocolError;
use crate::ids::{SectionId, ServerId};
use crate::topology::{App, SpaceFrames};

/// Application ID of the coordination core itself.
pub const CORE_APP: &str = "core";

/// Handshake function name sent on every newly opened socket.
pub const HANDSHAKE_FUNC: &str = "connect";

/// Topology action carried in a core message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// A section was created (or is being replayed).
    Create,
    /// A client asks for the full section list.
    Read,
    /// A section changed, or its app should be (re)loaded.
    Update,
    /// A section was removed.
    Delete,
}

/// A decoded inbound frame.
///
/// Any JSON object decodes. Fields of an unexpected type are kept as raw
/// values (or, for `forwardedBy`, filtered) rather than rejecting the
/// frame. Unknown top-level fields are retained in `extra` so a frame can
/// be re-serialized for peers without losing anything.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Target application, as sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<Value>,
    /// Section the sender lives in, if it is embedded in one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<Value>,
    /// Application payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
    /// Servers that have already forwarded this frame, in hop order.
    #[serde(
        default,
        deserialize_with = "lenient_server_ids",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub forwarded_by: Vec<ServerId>,
    /// Remaining fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Envelope {
    /// Decode a text frame.
    ///
    /// Fails only on invalid JSON or a top-level value that is not an
    /// object.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        if !value.is_object() {
            return Err(ProtocolError::NotAnObject);
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Target application, when it is a string.
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_ref().and_then(Value::as_str)
    }

    /// Whether this frame is addressed to `app_name`.
    pub fn is_for(&self, app_name: &str) -> bool {
        self.app_id() == Some(app_name)
    }

    /// The `message.action` field, if present and recognised.
    pub fn action(&self) -> Option<Action> {
        let action = self.message.as_ref()?.get("action")?;
        serde_json::from_value(action.clone()).ok()
    }

    /// Whether this is a topology replay request for `app_name`.
    pub fn is_replay_request(&self, app_name: &str) -> bool {
        self.is_for(app_name) && self.action() == Some(Action::Read)
    }

    /// Whether the sender identified itself as living inside a section.
    pub fn has_section_id(&self) -> bool {
        self.section_id.is_some()
    }

    /// Whether `server` already forwarded this frame.
    pub fn was_forwarded_by(&self, server: &ServerId) -> bool {
        self.forwarded_by.iter().any(|s| s == server)
    }

    /// Whether any server has forwarded this frame.
    pub fn is_forwarded(&self) -> bool {
        !self.forwarded_by.is_empty()
    }

    /// Record that `server` is forwarding this frame.
    pub fn mark_forwarded_by(&mut self, server: &ServerId) {
        self.forwarded_by.push(server.clone());
    }

    /// Clock samples carried in a `syncResults` frame.
    ///
    /// Entries that do not decode are skipped.
    pub fn sync_samples(&self) -> Vec<SyncSample> {
        let Some(Value::Array(results)) = self.extra.get("syncResults") else {
            return Vec::new();
        };
        results
            .iter()
            .filter_map(|r| serde_json::from_value(r.clone()).ok())
            .collect()
    }

    /// Serialize back to a text frame.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// `forwardedBy` entries that are not strings are skipped; a non-array
/// value counts as empty.
fn lenient_server_ids<'de, D>(deserializer: D) -> Result<Vec<ServerId>, D::Error>
where
    D: Deserializer<'de>,
{
    let ids = match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(ServerId::from_string(s)),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    Ok(ids)
}

/// One client-measured clock offset observation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSample {
    /// Client clock identity (a UUID chosen by the client).
    pub id: String,
    /// Measured offset in milliseconds.
    pub diff: i64,
}

/// The handshake frame a server sends when a socket opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Always [`HANDSHAKE_FUNC`].
    pub func: String,
    /// Identity of the sending server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<ServerId>,
}

impl Handshake {
    /// Handshake announcing `server`.
    pub fn new(server: &ServerId) -> Self {
        Self {
            func: HANDSHAKE_FUNC.to_string(),
            server_id: Some(server.clone()),
        }
    }

    /// Try to read a handshake out of an arbitrary frame.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str::<Self>(raw)
            .ok()
            .filter(|h| h.func == HANDSHAKE_FUNC)
    }
}

/// `CREATE` replay frame for one section.
pub fn section_create(app_name: &str, id: SectionId, spaces: &SpaceFrames) -> Value {
    json!({
        "appId": app_name,
        "message": { "action": Action::Create, "id": id, "spaces": spaces },
    })
}

/// `UPDATE` frame that (re)loads a section's app.
pub fn section_update(app_name: &str, id: SectionId, app: &App) -> Value {
    json!({
        "appId": app_name,
        "message": { "action": Action::Update, "id": id, "app": app },
    })
}

/// Instructs every client to restart clock measurement.
pub fn clock_resync(app_name: &str) -> Value {
    json!({ "appId": app_name, "clockReSync": true })
}

/// Per-client clock corrections, keyed by client clock ID.
pub fn clock_diff(app_name: &str, corrections: &BTreeMap<String, i64>) -> Value {
    json!({ "appId": app_name, "clockDiff": corrections })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parse_minimal_envelope() {
        let env = Envelope::parse(r#"{"appId":"core","message":{"action":"read"}}"#).unwrap();
        assert!(env.is_for(CORE_APP));
        assert_eq!(env.action(), Some(Action::Read));
        assert!(env.is_replay_request(CORE_APP));
        assert!(!env.has_section_id());
    }

    #[test]
    fn replay_request_requires_core_app() {
        let env = Envelope::parse(r#"{"appId":"maps","message":{"action":"read"}}"#).unwrap();
        assert!(!env.is_replay_request(CORE_APP));
    }

    #[test]
    fn section_zero_counts_as_present() {
        let env =
            Envelope::parse(r#"{"appId":"core","sectionId":0,"message":{"action":"read"}}"#)
                .unwrap();
        assert!(env.has_section_id());
    }

    #[test]
    fn unknown_action_is_none() {
        let env = Envelope::parse(r#"{"appId":"core","message":{"action":"explode"}}"#).unwrap();
        assert_eq!(env.action(), None);
    }

    #[test]
    fn frame_without_message_parses() {
        let env = Envelope::parse(r#"{"appId":"core","clockReSync":true}"#).unwrap();
        assert!(env.message.is_none());
        assert_eq!(env.extra["clockReSync"], true);
    }

    #[test]
    fn non_object_is_rejected() {
        assert_matches!(Envelope::parse("[1,2]"), Err(ProtocolError::NotAnObject));
        assert_matches!(Envelope::parse("\"core\""), Err(ProtocolError::NotAnObject));
        assert_matches!(Envelope::parse("nope"), Err(ProtocolError::Malformed(_)));
    }

    #[test]
    fn odd_field_types_still_parse() {
        let env = Envelope::parse(r#"{"appId":5,"message":"hi"}"#).unwrap();
        assert_eq!(env.app_id(), None);
        assert!(!env.is_for(CORE_APP));
        assert_eq!(env.action(), None);
        assert_eq!(env.to_json().unwrap(), r#"{"appId":5,"message":"hi"}"#);

        let env = Envelope::parse(r#"{"appId":"maps","forwardedBy":null}"#).unwrap();
        assert!(!env.is_forwarded());

        let id = ServerId::new();
        let raw = format!(r#"{{"appId":"maps","forwardedBy":[1,"{id}",{{}}]}}"#);
        let env = Envelope::parse(&raw).unwrap();
        assert_eq!(env.forwarded_by, vec![id.clone()]);
        assert!(env.was_forwarded_by(&id));

        let env = Envelope::parse(r#"{"forwardedBy":"x","sectionId":"s"}"#).unwrap();
        assert!(env.forwarded_by.is_empty());
        assert!(env.has_section_id());
    }

    #[test]
    fn forwarded_by_roundtrip_preserves_extra_fields() {
        let a = ServerId::new();
        let b = ServerId::new();
        let mut env =
            Envelope::parse(r#"{"appId":"videos","message":{"op":"play"},"custom":42}"#).unwrap();
        assert!(!env.was_forwarded_by(&a));
        env.mark_forwarded_by(&a);
        env.mark_forwarded_by(&b);
        let json: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["custom"], 42);
        assert_eq!(json["forwardedBy"][0], a.as_str());
        assert_eq!(json["forwardedBy"][1], b.as_str());
        let back = Envelope::parse(&json.to_string()).unwrap();
        assert!(back.was_forwarded_by(&a));
        assert!(back.was_forwarded_by(&b));
    }

    #[test]
    fn sync_samples_skip_bad_entries() {
        let env = Envelope::parse(
            r#"{"appId":"core","syncResults":[{"id":"c1","diff":12},{"id":"c1"},{"id":"c1","diff":-3}]}"#,
        )
        .unwrap();
        let samples = env.sync_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1], SyncSample { id: "c1".into(), diff: -3 });
    }

    #[test]
    fn handshake_carries_server_id() {
        let id = ServerId::new();
        let raw = serde_json::to_string(&Handshake::new(&id)).unwrap();
        let parsed = Handshake::parse(&raw).unwrap();
        assert_eq!(parsed.server_id, Some(id));
        assert!(Handshake::parse(r#"{"func":"other"}"#).is_none());
        assert!(Handshake::parse(r#"{"appId":"core"}"#).is_none());
    }

    #[test]
    fn legacy_handshake_without_server_id() {
        let parsed = Handshake::parse(r#"{"func":"connect"}"#).unwrap();
        assert!(parsed.server_id.is_none());
    }

    #[test]
    fn clock_frames_shape() {
        let resync = clock_resync(CORE_APP);
        assert_eq!(resync["clockReSync"], true);
        let mut corrections = BTreeMap::new();
        let _ = corrections.insert("c9".to_string(), 400);
        let diff = clock_diff(CORE_APP, &corrections);
        assert_eq!(diff["appId"], "core");
        assert_eq!(diff["clockDiff"]["c9"], 400);
    }
}
