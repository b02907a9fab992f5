//! Stream Priority Dependency Tree (RFC 7540 §5.3)
//!
//! This module stores the parent/child/weight relationships among the
//! streams of one connection and computes each schedulable stream's
//! effective bandwidth share from them.
//!
//! ## Structure
//!
//! Nodes live in an arena keyed by stream id; edges are stored as ids in
//! both directions (parent id on the node, child ids on the parent), so
//! reparenting never chases pointers. Stream 0 is the virtual root and has
//! no node of its own.
//!
//! ## Ghost nodes
//!
//! A closed stream whose descendants are still open is retained as a
//! *ghost*: it keeps its weight so the descendants' share math is
//! unchanged, but it is never schedulable itself. Ghosts are removed once
//! their whole subtree has closed.
//!
//! ## Effective share
//!
//! The share of a schedulable stream is the product of its local shares on
//! the path from the root, where the local share at each level is
//! `weight / sum(weights of live siblings)`. A sibling is *live* when it is
//! schedulable itself or has a schedulable descendant. All arithmetic is
//! integer, scaled by [`SHARE_SCALE`]; only ordering and coarse ratios are
//! meaningful.

use crate::error::{Error, Result};
use crate::stream::StreamId;
use serde::Serialize;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Default priority weight for streams that never carried a PRIORITY frame.
pub const DEFAULT_WEIGHT: u16 = 16;

/// Lowest legal weight.
pub const MIN_WEIGHT: u16 = 1;

/// Highest legal weight.
pub const MAX_WEIGHT: u16 = 256;

/// Fixed-point scale for effective shares: the root holds `SHARE_SCALE`.
pub const SHARE_SCALE: u64 = 1 << 16;

type Children = SmallVec<[StreamId; 4]>;

#[derive(Debug, Clone)]
struct PriorityNode {
    parent: StreamId,
    weight: u16,
    closed: bool,
    children: Children,
}

/// Read-only structural view of one tree node, for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct PrioritySnapshot {
    pub stream_id: StreamId,
    pub parent: StreamId,
    pub weight: u16,
    pub closed: bool,
    pub children: Vec<StreamId>,
}

/// Priority dependency tree for one connection.
#[derive(Debug, Default)]
pub struct PriorityTree {
    nodes: HashMap<StreamId, PriorityNode>,
    root_children: Children,
}

impl PriorityTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams currently in the tree (ghosts included).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree holds no streams.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `id` is present (possibly as a ghost).
    pub fn contains(&self, id: StreamId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Weight of `id`, if present.
    pub fn weight(&self, id: StreamId) -> Option<u16> {
        self.nodes.get(&id).map(|n| n.weight)
    }

    /// Parent of `id`, if present.
    pub fn parent(&self, id: StreamId) -> Option<StreamId> {
        self.nodes.get(&id).map(|n| n.parent)
    }

    /// Whether `id` has been marked closed (ghost or prunable).
    pub fn is_closed(&self, id: StreamId) -> bool {
        self.nodes.get(&id).map(|n| n.closed).unwrap_or(false)
    }

    fn children_of(&self, parent: StreamId) -> &[StreamId] {
        if parent == 0 {
            &self.root_children
        } else {
            self.nodes
                .get(&parent)
                .map(|n| n.children.as_slice())
                .unwrap_or(&[])
        }
    }

    fn attach(&mut self, parent: StreamId, id: StreamId) {
        if parent == 0 {
            self.root_children.push(id);
        } else if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(id);
        }
    }

    fn detach(&mut self, parent: StreamId, id: StreamId) {
        if parent == 0 {
            self.root_children.retain(|&mut c| c != id);
        } else if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|&mut c| c != id);
        }
    }

    fn validate(&self, id: StreamId, parent_id: StreamId, weight: u16) -> Result<()> {
        if id == 0 {
            return Err(Error::Protocol("stream 0 cannot carry priority".into()));
        }
        if parent_id == id {
            return Err(Error::Protocol(format!(
                "stream {} cannot depend on itself",
                id
            )));
        }
        if !(MIN_WEIGHT..=MAX_WEIGHT).contains(&weight) {
            return Err(Error::Protocol(format!(
                "weight {} out of range [{}, {}]",
                weight, MIN_WEIGHT, MAX_WEIGHT
            )));
        }
        Ok(())
    }

    /// True when `id` appears somewhere below `ancestor`.
    pub fn is_descendant(&self, id: StreamId, ancestor: StreamId) -> bool {
        let mut stack: SmallVec<[StreamId; 8]> =
            SmallVec::from_slice(self.children_of(ancestor));
        while let Some(cur) = stack.pop() {
            if cur == id {
                return true;
            }
            stack.extend_from_slice(self.children_of(cur));
        }
        false
    }

    // ------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------

    /// Insert a new stream under `parent_id`.
    ///
    /// An unknown parent is treated as the root. With `exclusive`, every
    /// existing child of the parent becomes a child of the new stream,
    /// keeping relative order and weights.
    pub fn add(
        &mut self,
        id: StreamId,
        parent_id: StreamId,
        weight: u16,
        exclusive: bool,
    ) -> Result<()> {
        self.validate(id, parent_id, weight)?;
        if self.nodes.contains_key(&id) {
            return Err(Error::Protocol(format!("stream {} already in tree", id)));
        }

        let parent = if parent_id != 0 && !self.nodes.contains_key(&parent_id) {
            0
        } else {
            parent_id
        };

        let mut node = PriorityNode {
            parent,
            weight,
            closed: false,
            children: Children::new(),
        };

        if exclusive {
            let displaced: Children = if parent == 0 {
                std::mem::take(&mut self.root_children)
            } else {
                std::mem::take(&mut self.nodes.get_mut(&parent).unwrap().children)
            };
            for &child in &displaced {
                if let Some(c) = self.nodes.get_mut(&child) {
                    c.parent = id;
                }
            }
            node.children = displaced;
        }

        self.nodes.insert(id, node);
        self.attach(parent, id);
        Ok(())
    }

    /// Change an extant stream's parent, weight, and exclusivity.
    ///
    /// If the intended parent is a descendant of `id`, that parent is first
    /// moved (with its subtree) under `id`'s current parent, then `id` is
    /// moved below it (RFC 7540 §5.3.3 dependency inversion).
    pub fn reprioritize(
        &mut self,
        id: StreamId,
        parent_id: StreamId,
        weight: u16,
        exclusive: bool,
    ) -> Result<()> {
        self.validate(id, parent_id, weight)?;
        if !self.nodes.contains_key(&id) {
            return Err(Error::Protocol(format!("stream {} not in tree", id)));
        }

        let new_parent = if parent_id != 0 && !self.nodes.contains_key(&parent_id) {
            0
        } else {
            parent_id
        };

        if new_parent != 0 && self.is_descendant(new_parent, id) {
            let current_parent = self.nodes[&id].parent;
            let displaced_parent = self.nodes[&new_parent].parent;
            self.detach(displaced_parent, new_parent);
            self.nodes.get_mut(&new_parent).unwrap().parent = current_parent;
            self.attach(current_parent, new_parent);
        }

        let old_parent = self.nodes[&id].parent;
        if old_parent != new_parent {
            self.detach(old_parent, id);
            self.nodes.get_mut(&id).unwrap().parent = new_parent;
            self.attach(new_parent, id);
        }
        self.nodes.get_mut(&id).unwrap().weight = weight;

        if exclusive {
            let siblings: SmallVec<[StreamId; 8]> = self
                .children_of(new_parent)
                .iter()
                .copied()
                .filter(|&c| c != id)
                .collect();
            for &sib in &siblings {
                self.detach(new_parent, sib);
                self.nodes.get_mut(&sib).unwrap().parent = id;
                self.nodes.get_mut(&id).unwrap().children.push(sib);
            }
        }
        Ok(())
    }

    /// Turn the stream's schedulable bit off. The node stays in the tree
    /// (as a ghost if it still has descendants). Idempotent; unknown ids
    /// are ignored.
    pub fn mark_closed(&mut self, id: StreamId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.closed = true;
        }
    }

    /// Remove a closed stream whose descendants are all closed.
    ///
    /// Remaining children are reparented to the removed node's parent, each
    /// weight rescaled to `max(1, round(w_child * w_removed / sum))` with
    /// the rescaled sum bounded to 256.
    pub fn prune(&mut self, id: StreamId) -> Result<()> {
        let node = self
            .nodes
            .get(&id)
            .ok_or_else(|| Error::IllegalState(format!("stream {} not in tree", id)))?;
        if !node.closed {
            return Err(Error::IllegalState(format!("stream {} is still open", id)));
        }
        if self.subtree_has_open(id) {
            return Err(Error::IllegalState(format!(
                "stream {} still has open descendants",
                id
            )));
        }

        let node = self.nodes.remove(&id).unwrap();
        self.detach(node.parent, id);

        if !node.children.is_empty() {
            let sum: u64 = node
                .children
                .iter()
                .map(|c| u64::from(self.nodes[c].weight))
                .sum();
            let mut rescaled: Vec<(StreamId, u16)> = node
                .children
                .iter()
                .map(|&c| {
                    let w = u64::from(self.nodes[&c].weight) * u64::from(node.weight);
                    let w = ((w + sum / 2) / sum).max(1) as u16;
                    (c, w)
                })
                .collect();
            bound_weight_sum(&mut rescaled);

            for (child, w) in rescaled {
                let c = self.nodes.get_mut(&child).unwrap();
                c.parent = node.parent;
                c.weight = w;
                self.attach(node.parent, child);
            }
        }
        Ok(())
    }

    /// Remove `from` and then each ancestor that is a closed, childless
    /// leaf. Returns the removed ids so callers can release per-stream
    /// state. Streams that are open or still shelter descendants stay put.
    pub fn sweep_closed(&mut self, from: StreamId) -> Vec<StreamId> {
        let mut removed = Vec::new();
        let mut cur = from;
        while cur != 0 {
            let Some(node) = self.nodes.get(&cur) else { break };
            if !node.closed || !node.children.is_empty() {
                break;
            }
            let parent = node.parent;
            self.nodes.remove(&cur);
            self.detach(parent, cur);
            removed.push(cur);
            cur = parent;
        }
        removed
    }

    fn subtree_has_open(&self, id: StreamId) -> bool {
        let mut stack: SmallVec<[StreamId; 8]> = SmallVec::from_slice(self.children_of(id));
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.nodes.get(&cur) {
                if !node.closed {
                    return true;
                }
                stack.extend_from_slice(&node.children);
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Effective share (fixed point)
    // ------------------------------------------------------------------

    /// Compute the effective share of every schedulable stream.
    ///
    /// `is_schedulable` reports whether a stream currently has data and
    /// window; the tree contributes structure, weights, and the closed
    /// bits. Ghosts enter a sibling denominator only when some descendant
    /// is schedulable, and never appear in the output themselves.
    pub fn effective_shares<F>(&self, is_schedulable: F) -> Vec<(StreamId, u64)>
    where
        F: Fn(StreamId) -> bool,
    {
        let mut live = HashMap::with_capacity(self.nodes.len());
        for &child in self.root_children.iter() {
            self.compute_live(child, &is_schedulable, &mut live);
        }

        let mut shares = Vec::new();
        self.walk_shares(
            SHARE_SCALE,
            &self.root_children,
            &live,
            &is_schedulable,
            &mut shares,
        );
        shares
    }

    fn compute_live<F>(
        &self,
        id: StreamId,
        is_schedulable: &F,
        live: &mut HashMap<StreamId, bool>,
    ) -> bool
    where
        F: Fn(StreamId) -> bool,
    {
        let node = &self.nodes[&id];
        let mut alive = !node.closed && is_schedulable(id);
        for &child in node.children.iter() {
            alive |= self.compute_live(child, is_schedulable, live);
        }
        live.insert(id, alive);
        alive
    }

    fn walk_shares<F>(
        &self,
        parent_share: u64,
        children: &[StreamId],
        live: &HashMap<StreamId, bool>,
        is_schedulable: &F,
        out: &mut Vec<(StreamId, u64)>,
    ) where
        F: Fn(StreamId) -> bool,
    {
        let denom: u64 = children
            .iter()
            .filter(|c| live.get(c).copied().unwrap_or(false))
            .map(|c| u64::from(self.nodes[c].weight))
            .sum();
        if denom == 0 {
            return;
        }
        for &child in children {
            if !live.get(&child).copied().unwrap_or(false) {
                continue;
            }
            let node = &self.nodes[&child];
            let share = parent_share * u64::from(node.weight) / denom;
            if !node.closed && is_schedulable(child) {
                out.push((child, share));
            }
            self.walk_shares(share, &node.children, live, is_schedulable, out);
        }
    }

    /// Read-only structural view for diagnostics, ordered by stream id.
    pub fn snapshot(&self) -> Vec<PrioritySnapshot> {
        let mut out: Vec<PrioritySnapshot> = self
            .nodes
            .iter()
            .map(|(&id, node)| PrioritySnapshot {
                stream_id: id,
                parent: node.parent,
                weight: node.weight,
                closed: node.closed,
                children: node.children.to_vec(),
            })
            .collect();
        out.sort_by_key(|s| s.stream_id);
        out
    }
}

/// Clamp a freshly rescaled sibling set so its weights stay legal and the
/// sum stays within one parent's budget of 256.
fn bound_weight_sum(weights: &mut [(StreamId, u16)]) {
    let mut total: u32 = weights.iter().map(|&(_, w)| u32::from(w)).sum();
    if total <= u32::from(MAX_WEIGHT) {
        return;
    }
    for entry in weights.iter_mut() {
        let scaled = u32::from(entry.1) * u32::from(MAX_WEIGHT) / total;
        entry.1 = (scaled.max(1) as u16).min(MAX_WEIGHT);
    }
    total = weights.iter().map(|&(_, w)| u32::from(w)).sum();
    while total > u32::from(MAX_WEIGHT) {
        let Some(largest) = weights
            .iter_mut()
            .filter(|e| e.1 > MIN_WEIGHT)
            .max_by_key(|e| e.1)
        else {
            break;
        };
        largest.1 -= 1;
        total -= 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all(_: StreamId) -> bool {
        true
    }

    #[test]
    fn test_add_and_contains() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 0, 16, false).unwrap();
        tree.add(5, 1, 32, false).unwrap();

        assert!(tree.contains(1));
        assert_eq!(tree.parent(5), Some(1));
        assert_eq!(tree.weight(5), Some(32));
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_duplicate_add_fails() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        assert!(matches!(
            tree.add(1, 0, 16, false),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_self_dependency_fails() {
        let mut tree = PriorityTree::new();
        assert!(matches!(tree.add(1, 1, 16, false), Err(Error::Protocol(_))));

        tree.add(1, 0, 16, false).unwrap();
        assert!(matches!(
            tree.reprioritize(1, 1, 16, false),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_weight_boundaries() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 1, false).unwrap();
        tree.add(3, 0, 256, false).unwrap();
        assert!(matches!(tree.add(5, 0, 0, false), Err(Error::Protocol(_))));
        assert!(matches!(
            tree.add(5, 0, 257, false),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_unknown_parent_becomes_root() {
        let mut tree = PriorityTree::new();
        tree.add(1, 99, 16, false).unwrap();
        assert_eq!(tree.parent(1), Some(0));
    }

    #[test]
    fn test_exclusive_add_adopts_children() {
        // root -> {1, 3}; exclusive add of 5 => root -> 5 -> {1, 3}
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 0, 16, false).unwrap();
        tree.add(5, 0, 16, true).unwrap();

        assert_eq!(tree.parent(5), Some(0));
        assert_eq!(tree.parent(1), Some(5));
        assert_eq!(tree.parent(3), Some(5));
    }

    #[test]
    fn test_exclusive_add_with_no_children_is_plain_add() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 16, true).unwrap();
        assert_eq!(tree.parent(3), Some(1));

        let mut plain = PriorityTree::new();
        plain.add(1, 0, 16, false).unwrap();
        plain.add(3, 1, 16, false).unwrap();
        assert_eq!(tree.snapshot().len(), plain.snapshot().len());
        assert_eq!(tree.parent(3), plain.parent(3));
    }

    #[test]
    fn test_reprioritize_identical_is_structurally_noop() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 32, false).unwrap();
        let before = format!("{:?}", tree.snapshot());

        tree.reprioritize(3, 1, 32, false).unwrap();
        assert_eq!(before, format!("{:?}", tree.snapshot()));
    }

    #[test]
    fn test_dependency_inversion() {
        // 1 -> 3, reprioritize(1, parent=3): 3 moves to 1's old parent
        // (root), then 1 moves under 3.
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 16, false).unwrap();

        tree.reprioritize(1, 3, 16, false).unwrap();
        assert_eq!(tree.parent(3), Some(0));
        assert_eq!(tree.parent(1), Some(3));
    }

    #[test]
    fn test_deep_dependency_inversion_moves_subtree() {
        // root -> 1 -> 3 -> 5; reprioritize(1, parent=5)
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 16, false).unwrap();
        tree.add(5, 3, 16, false).unwrap();

        tree.reprioritize(1, 5, 16, false).unwrap();
        assert_eq!(tree.parent(5), Some(0));
        assert_eq!(tree.parent(1), Some(5));
        assert_eq!(tree.parent(3), Some(1)); // subtree of 1 moved intact
    }

    #[test]
    fn test_mark_closed_idempotent() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.mark_closed(1);
        tree.mark_closed(1);
        assert!(tree.is_closed(1));
    }

    #[test]
    fn test_ghost_keeps_descendant_shares() {
        // root -> 1(ghost) -> {3 (w=64), 5 (w=192)}; shares split 1:3
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 64, false).unwrap();
        tree.add(5, 1, 192, false).unwrap();
        tree.mark_closed(1);

        let shares = tree.effective_shares(|id| id == 3 || id == 5);
        assert_eq!(shares.len(), 2);
        let s3 = shares.iter().find(|s| s.0 == 3).unwrap().1;
        let s5 = shares.iter().find(|s| s.0 == 5).unwrap().1;
        assert_eq!(s3 + s5, SHARE_SCALE);
        assert_eq!(s5, 3 * s3);
    }

    #[test]
    fn test_ghost_without_schedulable_descendants_excluded_from_denominator() {
        // root -> {1 (ghost, idle child), 3}; 3 should take the full share
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(5, 1, 16, false).unwrap();
        tree.add(3, 0, 16, false).unwrap();
        tree.mark_closed(1);

        let shares = tree.effective_shares(|id| id == 3);
        assert_eq!(shares, vec![(3, SHARE_SCALE)]);
    }

    #[test]
    fn test_shares_split_by_weight() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 192, false).unwrap();
        tree.add(3, 0, 64, false).unwrap();

        let shares = tree.effective_shares(all);
        let s1 = shares.iter().find(|s| s.0 == 1).unwrap().1;
        let s3 = shares.iter().find(|s| s.0 == 3).unwrap().1;
        assert_eq!(s1, SHARE_SCALE * 3 / 4);
        assert_eq!(s3, SHARE_SCALE / 4);
    }

    #[test]
    fn test_prune_rescales_weights() {
        // root -> 1(w=100) -> {3 (w=10), 5 (w=30)}; prune 1 after close
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 100, false).unwrap();
        tree.add(3, 1, 10, false).unwrap();
        tree.add(5, 1, 30, false).unwrap();
        tree.mark_closed(1);
        tree.mark_closed(3);
        tree.mark_closed(5);

        tree.prune(1).unwrap();
        assert!(!tree.contains(1));
        assert_eq!(tree.parent(3), Some(0));
        assert_eq!(tree.parent(5), Some(0));
        // 10/40 and 30/40 of the removed weight 100
        assert_eq!(tree.weight(3), Some(25));
        assert_eq!(tree.weight(5), Some(75));
    }

    #[test]
    fn test_prune_rejects_open_descendants() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 16, false).unwrap();
        tree.mark_closed(1);

        assert!(matches!(tree.prune(1), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_prune_rejects_open_stream() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        assert!(matches!(tree.prune(1), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_sweep_removes_closed_chain() {
        // root -> 1 -> 3; close both, sweep from the leaf
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 16, false).unwrap();
        tree.mark_closed(3);
        tree.mark_closed(1);

        let removed = tree.sweep_closed(3);
        assert_eq!(removed, vec![3, 1]);
        assert!(tree.is_empty());
    }

    #[test]
    fn test_sweep_stops_at_ghost_with_children() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 16, false).unwrap();
        tree.add(5, 1, 16, false).unwrap();
        tree.mark_closed(1);
        tree.mark_closed(3);

        let removed = tree.sweep_closed(3);
        assert_eq!(removed, vec![3]);
        assert!(tree.contains(1)); // ghost still shelters stream 5
        assert!(tree.contains(5));
    }

    #[test]
    fn test_pruning_closed_leaf_preserves_sibling_shares() {
        let mut tree = PriorityTree::new();
        tree.add(1, 0, 64, false).unwrap();
        tree.add(3, 0, 192, false).unwrap();
        tree.add(5, 0, 16, false).unwrap();

        let before = tree.effective_shares(|id| id == 1 || id == 3);

        tree.mark_closed(5);
        tree.sweep_closed(5);
        let after = tree.effective_shares(|id| id == 1 || id == 3);

        assert_eq!(before, after);
    }

    #[test]
    fn test_snapshot_is_ordered_and_complete() {
        let mut tree = PriorityTree::new();
        tree.add(5, 0, 16, false).unwrap();
        tree.add(1, 0, 16, false).unwrap();
        tree.add(3, 1, 8, false).unwrap();

        let snap = tree.snapshot();
        let ids: Vec<StreamId> = snap.iter().map(|s| s.stream_id).collect();
        assert_eq!(ids, vec![1, 3, 5]);
        assert_eq!(snap[0].children, vec![3]);
    }

    #[test]
    fn test_bound_weight_sum_caps_at_256() {
        let mut weights: Vec<(StreamId, u16)> = (0..4).map(|i| (i * 2 + 1, 200)).collect();
        bound_weight_sum(&mut weights);
        let total: u32 = weights.iter().map(|&(_, w)| u32::from(w)).sum();
        assert!(total <= 256);
        assert!(weights.iter().all(|&(_, w)| w >= 1));
    }
}
