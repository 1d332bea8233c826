//! Hierarchical usage-time trie.
//!
//! Each node stands for one URL path segment and accumulates focus time for
//! the tabs open on exactly that path. Tabs never emit ticks: time is derived
//! only when the trie is inspected (report, checkpoint) or when a tab loses
//! focus or closes.
//!
//! # Draining
//!
//! A [`TabInstance`] carries the time accrued during the current drain cycle
//! (`active_ms`) and, while focused, the instant focus began
//! (`focused_since`). Two drain modes convert that into node time:
//!
//! - [`DrainMode::Stop`]: the tab lost focus or closed. Elapsed time moves
//!   into `active_ms` and the tab becomes dormant.
//! - [`DrainMode::Cycle`]: the trie is being inspected. Elapsed time moves
//!   into `active_ms`, `focused_since` restarts at `now` so the focus interval
//!   keeps running, and `active_ms` is handed to the node and zeroed.
//!
//! Every interval is therefore counted in exactly one drain, and a tab that
//! stays focused across many inspections keeps accruing without gaps.

use std::collections::{BTreeMap, HashMap};

use crate::path_key::PathKeys;
use crate::snapshot::{InstanceSnapshot, NodeSnapshot};
use crate::types::{Millis, TabId};

/// How [`TabInstance::drain`] treats an in-progress focus interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    /// End the focus interval; returns the elapsed time it contributed.
    Stop,
    /// Flush accrued time without ending focus; returns the flushed total.
    Cycle,
}

/// One open browser tab resolved to a trie node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInstance {
    tab_id: TabId,
    active_ms: Millis,
    focused_since: Option<Millis>,
}

impl TabInstance {
    /// Creates a live instance whose focus began at `now`.
    pub fn focused(tab_id: TabId, now: Millis) -> Self {
        Self {
            tab_id,
            active_ms: 0,
            focused_since: Some(now),
        }
    }

    pub fn tab_id(&self) -> TabId {
        self.tab_id
    }

    /// Time accrued in the current drain cycle, not yet folded into the node.
    pub fn active_ms(&self) -> Millis {
        self.active_ms
    }

    pub fn focused_since(&self) -> Option<Millis> {
        self.focused_since
    }

    /// Whether the tab is currently focused.
    pub fn is_live(&self) -> bool {
        self.focused_since.is_some()
    }

    /// Starts a focus interval at `now` unless one is already running.
    ///
    /// Returns `true` if the instance went from dormant to live.
    pub fn focus(&mut self, now: Millis) -> bool {
        if self.focused_since.is_some() {
            return false;
        }
        self.focused_since = Some(now);
        true
    }

    /// Converts elapsed focus time into accrued time. See [`DrainMode`].
    pub fn drain(&mut self, mode: DrainMode, now: Millis) -> Millis {
        match mode {
            DrainMode::Stop => match self.focused_since.take() {
                Some(since) => {
                    let elapsed = now.saturating_sub(since);
                    self.active_ms = self.active_ms.saturating_add(elapsed);
                    elapsed
                }
                None => 0,
            },
            DrainMode::Cycle => {
                if let Some(since) = self.focused_since {
                    let elapsed = now.saturating_sub(since);
                    self.active_ms = self.active_ms.saturating_add(elapsed);
                    // A clock that stepped backwards must not move the start forward.
                    self.focused_since = Some(now.max(since));
                }
                std::mem::take(&mut self.active_ms)
            }
        }
    }

    fn to_snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            tab_id: self.tab_id,
            active_ms: self.active_ms,
            focused_since: self.focused_since,
        }
    }

    fn from_snapshot(snapshot: InstanceSnapshot) -> Self {
        Self {
            tab_id: snapshot.tab_id,
            active_ms: snapshot.active_ms,
            focused_since: snapshot.focused_since,
        }
    }
}

/// Aggregate state for one URL path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrieNode {
    segment: String,
    accumulated_ms: Millis,
    instances: BTreeMap<TabId, TabInstance>,
    children: HashMap<String, TrieNode>,
}

impl TrieNode {
    /// Creates an empty node for `segment`.
    pub fn new(segment: impl Into<String>) -> Self {
        Self {
            segment: segment.into(),
            accumulated_ms: 0,
            instances: BTreeMap::new(),
            children: HashMap::new(),
        }
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Time folded in from closed tabs and previous drains.
    pub fn accumulated_ms(&self) -> Millis {
        self.accumulated_ms
    }

    pub fn instance(&self, tab_id: TabId) -> Option<&TabInstance> {
        self.instances.get(&tab_id)
    }

    pub fn instances(&self) -> impl Iterator<Item = &TabInstance> {
        self.instances.values()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn live_count(&self) -> usize {
        self.instances.values().filter(|i| i.is_live()).count()
    }

    pub fn child(&self, segment: &str) -> Option<&TrieNode> {
        self.children.get(segment)
    }

    pub fn children(&self) -> impl Iterator<Item = &TrieNode> {
        self.children.values()
    }

    /// Focuses `tab_id` on this node, creating the instance if needed.
    ///
    /// An already-live instance keeps its running interval.
    pub fn focus_tab(&mut self, tab_id: TabId, now: Millis) {
        self.instances
            .entry(tab_id)
            .and_modify(|instance| {
                instance.focus(now);
            })
            .or_insert_with(|| TabInstance::focused(tab_id, now));
    }

    /// Stop-drains `tab_id`. Returns `None` if the tab is not on this node.
    pub fn unfocus_tab(&mut self, tab_id: TabId, now: Millis) -> Option<Millis> {
        self.instances
            .get_mut(&tab_id)
            .map(|instance| instance.drain(DrainMode::Stop, now))
    }

    /// Removes `tab_id`, folding everything it accrued into this node.
    ///
    /// Returns the time folded, or `None` if the tab is not on this node.
    pub fn close_tab(&mut self, tab_id: TabId, now: Millis) -> Option<Millis> {
        let mut instance = self.instances.remove(&tab_id)?;
        instance.drain(DrainMode::Stop, now);
        let folded = instance.active_ms;
        self.accumulated_ms = self.accumulated_ms.saturating_add(folded);
        Some(folded)
    }

    /// Cycle-drains every instance into `accumulated_ms`.
    ///
    /// Returns the amount folded in by this call.
    pub fn fold(&mut self, now: Millis) -> Millis {
        let drained = self
            .instances
            .values_mut()
            .map(|instance| instance.drain(DrainMode::Cycle, now))
            .fold(0, Millis::saturating_add);
        self.accumulated_ms = self.accumulated_ms.saturating_add(drained);
        drained
    }

    /// Folds this node and its whole subtree.
    fn fold_subtree(&mut self, now: Millis) {
        self.fold(now);
        for child in self.children.values_mut() {
            child.fold_subtree(now);
        }
    }

    fn to_snapshot(&self, include_instances: bool) -> NodeSnapshot {
        NodeSnapshot {
            segment: self.segment.clone(),
            aggregate_time: self.accumulated_ms,
            instances: include_instances
                .then(|| self.instances.values().map(TabInstance::to_snapshot).collect()),
            children: self
                .children
                .iter()
                .map(|(key, child)| (key.clone(), child.to_snapshot(include_instances)))
                .collect(),
        }
    }

    fn from_snapshot(snapshot: NodeSnapshot, discard_instances: bool) -> Self {
        let instances = if discard_instances {
            BTreeMap::new()
        } else {
            snapshot
                .instances
                .unwrap_or_default()
                .into_iter()
                .map(|i| (i.tab_id, TabInstance::from_snapshot(i)))
                .collect()
        };

        Self {
            segment: snapshot.segment,
            accumulated_ms: snapshot.aggregate_time,
            instances,
            children: snapshot
                .children
                .into_iter()
                .map(|(key, child)| (key, Self::from_snapshot(child, discard_instances)))
                .collect(),
        }
    }
}

/// One visited node in a [`UsageTrie::drain_walk`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainedNode {
    /// Segment keys from the root joined with `/`.
    pub path: String,
    pub accumulated_ms: Millis,
    pub live_instances: usize,
    pub total_instances: usize,
}

/// Segment-keyed forest of [`TrieNode`]s, one root per hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsageTrie {
    roots: HashMap<String, TrieNode>,
}

impl UsageTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn root(&self, key: &str) -> Option<&TrieNode> {
        self.roots.get(key)
    }

    pub fn roots(&self) -> impl Iterator<Item = &TrieNode> {
        self.roots.values()
    }

    /// Walks to the node for `keys`, creating every missing node on the way.
    pub fn find_or_create_path(&mut self, keys: &PathKeys) -> &mut TrieNode {
        let mut node = self
            .roots
            .entry(keys.root().to_string())
            .or_insert_with(|| TrieNode::new(keys.root()));
        for key in keys.rest() {
            node = node
                .children
                .entry(key.clone())
                .or_insert_with(|| TrieNode::new(key.as_str()));
        }
        node
    }

    /// Looks up the node for `keys` without creating anything.
    pub fn find_path(&self, keys: &PathKeys) -> Option<&TrieNode> {
        let mut node = self.roots.get(keys.root())?;
        for key in keys.rest() {
            node = node.children.get(key)?;
        }
        Some(node)
    }

    /// Mutable variant of [`find_path`](Self::find_path).
    pub fn find_path_mut(&mut self, keys: &PathKeys) -> Option<&mut TrieNode> {
        let mut node = self.roots.get_mut(keys.root())?;
        for key in keys.rest() {
            node = node.children.get_mut(key)?;
        }
        Some(node)
    }

    /// Folds every node in the trie.
    pub fn fold_all(&mut self, now: Millis) {
        for root in self.roots.values_mut() {
            root.fold_subtree(now);
        }
    }

    /// Depth-first walk that folds each node before reporting it.
    ///
    /// Every node is visited, including ones with no accumulated time.
    pub fn drain_walk(&mut self, now: Millis) -> Vec<DrainedNode> {
        fn visit(node: &mut TrieNode, now: Millis, path: &mut String, out: &mut Vec<DrainedNode>) {
            let original_len = path.len();
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&node.segment);

            node.fold(now);
            out.push(DrainedNode {
                path: path.clone(),
                accumulated_ms: node.accumulated_ms,
                live_instances: node.live_count(),
                total_instances: node.instance_count(),
            });

            for child in node.children.values_mut() {
                visit(child, now, path, out);
            }
            path.truncate(original_len);
        }

        let mut out = Vec::new();
        let mut path = String::with_capacity(256);
        for root in self.roots.values_mut() {
            visit(root, now, &mut path, &mut out);
        }
        out
    }

    /// Serializes the trie, optionally including tab instances.
    ///
    /// Callers that need current figures should [`fold_all`](Self::fold_all) first.
    pub fn to_snapshot(&self, include_instances: bool) -> BTreeMap<String, NodeSnapshot> {
        self.roots
            .iter()
            .map(|(key, node)| (key.clone(), node.to_snapshot(include_instances)))
            .collect()
    }

    /// Rebuilds a trie from serialized roots.
    pub fn from_snapshot(data: BTreeMap<String, NodeSnapshot>, discard_instances: bool) -> Self {
        Self {
            roots: data
                .into_iter()
                .map(|(key, node)| (key, TrieNode::from_snapshot(node, discard_instances)))
                .collect(),
        }
    }

    /// Whether any instance anywhere in the trie is focused.
    pub fn has_live_instances(&self) -> bool {
        fn any_live(node: &TrieNode) -> bool {
            node.live_count() > 0 || node.children.values().any(any_live)
        }
        self.roots.values().any(any_live)
    }
}
