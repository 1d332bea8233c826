//! Persisted session snapshots.
//!
//! A snapshot is the serialized form of a session's usage trie, written by
//! checkpoints and read back on restore. The JSON layout is:
//!
//! ```json
//! {
//!   "session_name": "work",
//!   "data": {
//!     "news.site": {
//!       "segment": "news.site",
//!       "aggregate_time": 42000,
//!       "instances": [{ "tab_id": 7, "active_ms": 0, "focused_since": 1754316069547 }],
//!       "children": {}
//!     }
//!   }
//! }
//! ```
//!
//! `instances` is omitted when the checkpoint was taken without tab state.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{Millis, TabId};

/// Serialized session: its name and the trie roots keyed by hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_name: String,
    #[serde(default)]
    pub data: BTreeMap<String, NodeSnapshot>,
}

/// Serialized trie node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub segment: String,
    #[serde(default)]
    pub aggregate_time: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<Vec<InstanceSnapshot>>,
    #[serde(default)]
    pub children: BTreeMap<String, NodeSnapshot>,
}

/// Serialized tab instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSnapshot {
    pub tab_id: TabId,
    #[serde(default)]
    pub active_ms: Millis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused_since: Option<Millis>,
}

impl SessionSnapshot {
    /// Total number of nodes in the snapshot.
    pub fn node_count(&self) -> usize {
        fn count(node: &NodeSnapshot) -> usize {
            1 + node.children.values().map(count).sum::<usize>()
        }
        self.data.values().map(count).sum()
    }
}
