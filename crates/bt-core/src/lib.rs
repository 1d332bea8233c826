//! Core domain logic for the browser usage timer.
//!
//! This crate contains the fundamental types and logic for:
//! - Path keys: splitting URLs into hostname and path segments
//! - Usage trie: per-segment focus time across concurrently open tabs
//! - Sessions: named tries with tab events, flat reports, and snapshots
//! - Lifecycle: the single active session and its persistence

pub mod clock;
pub mod controller;
pub mod path_key;
pub mod session;
pub mod snapshot;
pub mod store;
pub mod trie;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{ACTIVE_SESSION_KEY, ControlError, SessionController, StartOutcome};
pub use path_key::{PathKeyError, PathKeys, extract_parts};
pub use session::{EventOutcome, PathUsage, Session, TrackerError};
pub use snapshot::{InstanceSnapshot, NodeSnapshot, SessionSnapshot};
pub use store::{BlobStore, MemoryStore, StoreError};
pub use trie::{DrainMode, TabInstance, TrieNode, UsageTrie};
pub use types::{Millis, SessionName, TabId, ValidationError};
