//! Wire messages exchanged over the hub's duplex channel.
//!
//! Every frame is a JSON object `{"type": string, "payload": any}`. The hub
//! interprets exactly two types:
//!
//! | Type | Direction | Payload |
//! |------|-----------|---------|
//! | `USER_CONNECT` | client → hub | `{name, photoUrl}` |
//! | `CONNECTED_USERS` | hub → client | `{count, users: [{name, connectedAt, photoUrl}]}` |
//!
//! Everything else describes a mutation in the external CRUD layer and is
//! opaque to the hub.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ProtocolError, Result};

/// Event tag of an [`ApplicationMessage`].
///
/// A closed vocabulary plus [`MessageKind::Unknown`], so newer CRUD events
/// pass through an older hub untouched.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageKind {
    /// Identity announcement (client → hub).
    UserConnect,
    /// Presence snapshot (hub → client).
    ConnectedUsers,
    /// An order was placed.
    NewOrder,
    /// An order's items or status changed.
    OrderUpdated,
    /// An order was completed.
    OrderCompleted,
    /// A table was seated / opened.
    TableActivated,
    /// A table was closed.
    TableDeactivated,
    /// The menu changed.
    MenuUpdated,
    /// A staff reminder was created.
    ReminderCreated,
    /// Any type the hub does not know about.
    Unknown(String),
}

impl MessageKind {
    /// Wire tag for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::UserConnect => "USER_CONNECT",
            Self::ConnectedUsers => "CONNECTED_USERS",
            Self::NewOrder => "NEW_ORDER",
            Self::OrderUpdated => "ORDER_UPDATED",
            Self::OrderCompleted => "ORDER_COMPLETED",
            Self::TableActivated => "TABLE_ACTIVATED",
            Self::TableDeactivated => "TABLE_DEACTIVATED",
            Self::MenuUpdated => "MENU_UPDATED",
            Self::ReminderCreated => "REMINDER_CREATED",
            Self::Unknown(tag) => tag,
        }
    }

    /// Whether the hub itself interprets this kind.
    pub fn is_hub_internal(&self) -> bool {
        matches!(self, Self::UserConnect | Self::ConnectedUsers)
    }

    /// Whether this kind belongs to the known vocabulary.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<&str> for MessageKind {
    fn from(tag: &str) -> Self {
        match tag {
            "USER_CONNECT" => Self::UserConnect,
            "CONNECTED_USERS" => Self::ConnectedUsers,
            "NEW_ORDER" => Self::NewOrder,
            "ORDER_UPDATED" => Self::OrderUpdated,
            "ORDER_COMPLETED" => Self::OrderCompleted,
            "TABLE_ACTIVATED" => Self::TableActivated,
            "TABLE_DEACTIVATED" => Self::TableDeactivated,
            "MENU_UPDATED" => Self::MenuUpdated,
            "REMINDER_CREATED" => Self::ReminderCreated,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl From<String> for MessageKind {
    fn from(tag: String) -> Self {
        match Self::from(tag.as_str()) {
            Self::Unknown(_) => Self::Unknown(tag),
            known => known,
        }
    }
}

impl From<MessageKind> for String {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Unknown(tag) => tag,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One frame on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApplicationMessage {
    /// Event tag.
    #[serde(rename = "type")]
    pub kind: MessageKind,
    /// Opaque payload; shape is determined by `kind`.
    #[serde(default)]
    pub payload: Value,
}

impl ApplicationMessage {
    /// Build a message from a kind and payload.
    pub fn new(kind: impl Into<MessageKind>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
        }
    }

    /// Parse a text frame.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to a text frame.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Build the `USER_CONNECT` frame for an identity.
    pub fn identity_announcement(identity: &Identity) -> Self {
        Self::new(MessageKind::UserConnect, identity.to_payload())
    }

    /// Build the `CONNECTED_USERS` frame for a snapshot.
    pub fn presence(snapshot: &PresenceSnapshot) -> serde_json::Result<Self> {
        Ok(Self::new(
            MessageKind::ConnectedUsers,
            serde_json::to_value(snapshot)?,
        ))
    }
}

/// Display metadata a client binds to its session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Name shown in presence lists.
    pub display_name: String,
    /// Optional avatar URL.
    pub avatar_url: Option<String>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserConnectPayload {
    name: String,
    #[serde(default)]
    photo_url: Option<String>,
}

impl Identity {
    /// Create an identity without an avatar.
    pub fn named(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_url: None,
        }
    }

    /// Attach an avatar URL.
    #[must_use]
    pub fn with_avatar(mut self, url: impl Into<String>) -> Self {
        self.avatar_url = Some(url.into());
        self
    }

    /// Parse a `USER_CONNECT` payload.
    ///
    /// The name is trimmed and must not be empty. An empty `photoUrl` is
    /// treated as absent.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let raw: UserConnectPayload = serde_json::from_value(payload.clone())
            .map_err(|e| ProtocolError::InvalidIdentity(e.to_string()))?;
        let name = raw.name.trim();
        if name.is_empty() {
            return Err(ProtocolError::InvalidIdentity("name is empty".into()));
        }
        Ok(Self {
            display_name: name.to_owned(),
            avatar_url: raw.photo_url.filter(|u| !u.is_empty()),
        })
    }

    /// Wire payload for a `USER_CONNECT` frame.
    pub fn to_payload(&self) -> Value {
        serde_json::json!({
            "name": self.display_name,
            "photoUrl": self.avatar_url,
        })
    }
}

/// One announced session in a presence snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Announced display name.
    #[serde(rename = "name")]
    pub display_name: String,
    /// When the session was admitted.
    #[serde(rename = "connectedAt")]
    pub connected_at: DateTime<Utc>,
    /// Announced avatar URL.
    #[serde(rename = "photoUrl")]
    pub avatar_url: Option<String>,
}

/// Point-in-time view of who is connected.
///
/// `count` includes sessions that have not announced an identity yet;
/// `entries` lists only announced ones.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    /// Number of admitted sessions.
    pub count: usize,
    /// Announced sessions, oldest first.
    #[serde(rename = "users")]
    pub entries: Vec<PresenceEntry>,
}

impl PresenceSnapshot {
    /// Parse a `CONNECTED_USERS` payload.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        Ok(serde_json::from_value(payload.clone())?)
    }

    /// Display names in snapshot order.
    pub fn names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.display_name.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_kinds_parse_from_tags() {
        assert_eq!(MessageKind::from("USER_CONNECT"), MessageKind::UserConnect);
        assert_eq!(MessageKind::from("CONNECTED_USERS"), MessageKind::ConnectedUsers);
        assert_eq!(MessageKind::from("NEW_ORDER"), MessageKind::NewOrder);
        assert_eq!(MessageKind::from("TABLE_DEACTIVATED"), MessageKind::TableDeactivated);
    }

    #[test]
    fn unknown_kind_keeps_its_tag() {
        let kind = MessageKind::from("KITCHEN_FIRE".to_string());
        assert_eq!(kind, MessageKind::Unknown("KITCHEN_FIRE".into()));
        assert_eq!(kind.as_str(), "KITCHEN_FIRE");
        assert!(!kind.is_known());
        assert!(!kind.is_hub_internal());
    }

    #[test]
    fn tags_are_case_sensitive() {
        assert!(matches!(MessageKind::from("new_order"), MessageKind::Unknown(_)));
    }

    #[test]
    fn hub_internal_kinds() {
        assert!(MessageKind::UserConnect.is_hub_internal());
        assert!(MessageKind::ConnectedUsers.is_hub_internal());
        assert!(!MessageKind::NewOrder.is_hub_internal());
    }

    #[test]
    fn parse_message_with_payload() {
        let msg = ApplicationMessage::parse(r#"{"type":"NEW_ORDER","payload":{"tableId":7}}"#)
            .unwrap();
        assert_eq!(msg.kind, MessageKind::NewOrder);
        assert_eq!(msg.payload["tableId"], 7);
    }

    #[test]
    fn parse_message_without_payload_defaults_to_null() {
        let msg = ApplicationMessage::parse(r#"{"type":"MENU_UPDATED"}"#).unwrap();
        assert_eq!(msg.payload, Value::Null);
    }

    #[test]
    fn parse_rejects_missing_type() {
        let err = ApplicationMessage::parse(r#"{"payload":{}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(ApplicationMessage::parse("hello kitchen").is_err());
        assert!(ApplicationMessage::parse("[1,2]").is_err());
        assert!(ApplicationMessage::parse("").is_err());
    }

    #[test]
    fn encode_uses_type_field() {
        let msg = ApplicationMessage::new(MessageKind::TableActivated, json!({"tableId": 3}));
        let parsed: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(parsed["type"], "TABLE_ACTIVATED");
        assert_eq!(parsed["payload"]["tableId"], 3);
    }

    #[test]
    fn unknown_kind_encodes_verbatim() {
        let msg = ApplicationMessage::new("SHIFT_SWAP", json!(null));
        let parsed: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(parsed["type"], "SHIFT_SWAP");
    }

    #[test]
    fn identity_from_payload() {
        let identity =
            Identity::from_payload(&json!({"name": "Alice", "photoUrl": "https://a.png"})).unwrap();
        assert_eq!(identity.display_name, "Alice");
        assert_eq!(identity.avatar_url.as_deref(), Some("https://a.png"));
    }

    #[test]
    fn identity_photo_is_optional() {
        let identity = Identity::from_payload(&json!({"name": "Bob"})).unwrap();
        assert!(identity.avatar_url.is_none());
        let identity = Identity::from_payload(&json!({"name": "Bob", "photoUrl": null})).unwrap();
        assert!(identity.avatar_url.is_none());
        let identity = Identity::from_payload(&json!({"name": "Bob", "photoUrl": ""})).unwrap();
        assert!(identity.avatar_url.is_none());
    }

    #[test]
    fn identity_name_is_trimmed() {
        let identity = Identity::from_payload(&json!({"name": "  Carol "})).unwrap();
        assert_eq!(identity.display_name, "Carol");
    }

    #[test]
    fn identity_rejects_missing_or_blank_name() {
        assert!(matches!(
            Identity::from_payload(&json!({"photoUrl": "x"})),
            Err(ProtocolError::InvalidIdentity(_))
        ));
        assert!(matches!(
            Identity::from_payload(&json!({"name": "   "})),
            Err(ProtocolError::InvalidIdentity(_))
        ));
        assert!(Identity::from_payload(&json!("Alice")).is_err());
    }

    #[test]
    fn identity_announcement_shape() {
        let msg = ApplicationMessage::identity_announcement(
            &Identity::named("Dana").with_avatar("https://d.png"),
        );
        assert_eq!(msg.kind, MessageKind::UserConnect);
        assert_eq!(msg.payload, json!({"name": "Dana", "photoUrl": "https://d.png"}));
    }

    #[test]
    fn presence_wire_shape() {
        let at = DateTime::parse_from_rfc3339("2026-03-01T18:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let snapshot = PresenceSnapshot {
            count: 2,
            entries: vec![PresenceEntry {
                display_name: "Alice".into(),
                connected_at: at,
                avatar_url: None,
            }],
        };
        let msg = ApplicationMessage::presence(&snapshot).unwrap();
        assert_eq!(msg.kind, MessageKind::ConnectedUsers);
        assert_eq!(msg.payload["count"], 2);
        assert_eq!(msg.payload["users"][0]["name"], "Alice");
        assert!(msg.payload["users"][0]["photoUrl"].is_null());
        assert!(msg.payload["users"][0]["connectedAt"].is_string());

        let back = PresenceSnapshot::from_payload(&msg.payload).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.names(), vec!["Alice"]);
    }
}
