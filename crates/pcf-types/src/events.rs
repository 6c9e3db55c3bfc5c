use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Event type name carried by every peer notification on the shared channel
pub const PEER_EVENT_TYPE: &str = "pcfPeerCommunication";

/// Notification exchanged between controls on the same page
///
/// All four fields are required; deserializing a payload with a missing
/// field fails instead of producing a partially filled record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    /// Human-readable message
    pub message: String,
    /// Creation time, serialized as RFC 3339 / ISO-8601
    pub timestamp: DateTime<Utc>,
    /// Kind of control that produced the notification
    pub component_type: String,
    /// Identifier of the control that published the notification
    pub source_component: String,
}

impl NotificationPayload {
    /// Build a payload stamped with the current time
    pub fn new(
        message: impl Into<String>,
        component_type: impl Into<String>,
        source_component: impl Into<String>,
    ) -> Self {
        Self::at(Utc::now(), message, component_type, source_component)
    }

    /// Build a payload with an explicit timestamp
    pub fn at(
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        component_type: impl Into<String>,
        source_component: impl Into<String>,
    ) -> Self {
        Self {
            message: message.into(),
            timestamp,
            component_type: component_type.into(),
            source_component: source_component.into(),
        }
    }

    /// Whether this payload was published by `component_id`
    pub fn is_from(&self, component_id: &str) -> bool {
        self.source_component == component_id
    }

    /// Timestamp formatted the way browsers print `Date.toISOString()`
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}
