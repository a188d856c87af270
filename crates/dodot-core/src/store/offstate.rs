//! Serialized pack state captured when a pack is turned off.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current off-state schema version.
pub const OFF_STATE_VERSION: &str = "1";

/// One artifact removed while turning a pack off.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearedItem {
    /// What kind of artifact was removed (`user-link`, `intermediate-link`).
    pub item_type: String,
    /// Absolute path of the removed artifact.
    pub path: String,
}

/// Per-handler slice of the off-state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandlerState {
    /// Handler name, repeated for self-describing JSON.
    pub handler_name: String,
    /// Artifacts removed on behalf of this handler.
    pub cleared_items: Vec<ClearedItem>,
    /// Open-ended handler data.
    #[serde(default)]
    pub state_data: BTreeMap<String, serde_json::Value>,
}

/// Everything captured when a pack is turned off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackState {
    /// The pack this state belongs to.
    pub pack_name: String,
    /// Per-handler cleared artifacts.
    pub handlers: BTreeMap<String, HandlerState>,
    /// User confirmations recorded during the off run.
    #[serde(default)]
    pub confirmations: BTreeMap<String, bool>,
    /// Schema version, currently [`OFF_STATE_VERSION`].
    pub version: String,
    /// When the pack was turned off (RFC 3339).
    pub turned_off_at: DateTime<Utc>,
}

impl PackState {
    /// Fresh state for a pack being turned off now.
    pub fn new(pack_name: &str) -> Self {
        Self {
            pack_name: pack_name.to_string(),
            handlers: BTreeMap::new(),
            confirmations: BTreeMap::new(),
            version: OFF_STATE_VERSION.to_string(),
            turned_off_at: Utc::now(),
        }
    }

    /// Record a cleared artifact under a handler.
    pub fn record_cleared(&mut self, handler: &str, item_type: &str, path: &str) {
        let entry = self
            .handlers
            .entry(handler.to_string())
            .or_insert_with(|| HandlerState {
                handler_name: handler.to_string(),
                ..HandlerState::default()
            });
        entry.cleared_items.push(ClearedItem {
            item_type: item_type.to_string(),
            path: path.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_uses_camel_case_keys() {
        let mut state = PackState::new("tools");
        state.record_cleared("symlink", "user-link", "/home/t/.gitconfig");
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["packName"], "tools");
        assert_eq!(json["version"], "1");
        assert!(json["turnedOffAt"].is_string());
        assert_eq!(json["handlers"]["symlink"]["handlerName"], "symlink");
        assert_eq!(
            json["handlers"]["symlink"]["clearedItems"][0]["path"],
            "/home/t/.gitconfig"
        );
    }

    #[test]
    fn round_trips_through_json() {
        let mut state = PackState::new("tools");
        state.record_cleared("shell", "intermediate-link", "/data/packs/tools/shell/a.sh");
        let json = serde_json::to_string(&state).unwrap();
        let back: PackState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pack_name, "tools");
        assert_eq!(back.handlers["shell"].cleared_items.len(), 1);
    }
}
