use std::collections::{HashMap, VecDeque};

use slab::Slab;

use frame::{StreamDependency, StreamId};

/// Weight given to dependencies on unknown streams.
pub const DEFAULT_WEIGHT: u16 = 16;

/// Virtual-time unit for the weighted fair selection. A node is charged
/// `WEIGHT_UNIT / weight` per selection, so heavier siblings are picked
/// proportionally more often.
const WEIGHT_UNIT: u64 = 65_536;

/// Handle to a scheduler node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Key(usize);

#[cfg(test)]
impl Key {
    pub fn for_test(idx: usize) -> Key {
        Key(idx)
    }
}

/// The weighted dependency tree over streams (RFC 7540, Section 5.3).
///
/// Nodes are kept in an arena and referenced by handle: streams hold a
/// handle, the ring of recently closed streams holds handles, and
/// parent links are handles, so nodes may outlive their stream without
/// back-pointer cycles.
#[derive(Debug)]
pub struct Scheduler {
    slab: Slab<Node>,
    root: usize,

    /// Every live node (open, parked, or placeholder) by stream id.
    /// Stream ids are never reused within a connection.
    by_id: HashMap<StreamId, Key>,

    /// Recently closed streams, preserving their priority for
    /// late-arriving dependency references. Evicted FIFO.
    ring: VecDeque<Key>,
    ring_capacity: usize,

    /// Streams tracked for PRIORITY only, bounded by configuration.
    placeholders: usize,
    max_placeholders: usize,

    /// Whether every observation so far is consistent with the
    /// dependency chains Chromium builds (exclusive, non-increasing
    /// weights). Placement-only heuristic.
    chromium_shape: bool,
}

#[derive(Debug)]
struct Node {
    stream_id: StreamId,
    parent: usize,
    children: Vec<Key>,

    /// 1..=256
    weight: u16,

    /// The stream itself has egress pending.
    active: bool,

    /// Active nodes in this subtree, including self.
    active_count: usize,

    vtime: u64,

    /// Virtual time of the most recently selected child edge; floors
    /// newly activated children.
    vclock: u64,

    /// Moved down by a host-initiated reprioritization.
    demoted: bool,

    /// Closed stream retained in the ring.
    parked: bool,

    /// PRIORITY-only idle stream, not yet opened by HEADERS.
    placeholder: bool,
}

/// The configured cap on PRIORITY-only streams was exceeded.
#[derive(Debug, PartialEq, Eq)]
pub struct TooManyPriorityStreams;

impl Node {
    fn new(stream_id: StreamId, weight: u16) -> Node {
        Node {
            stream_id: stream_id,
            parent: 0,
            children: Vec::new(),
            weight: weight,
            active: false,
            active_count: 0,
            vtime: 0,
            vclock: 0,
            demoted: false,
            parked: false,
            placeholder: false,
        }
    }
}

impl Scheduler {
    pub fn new(ring_capacity: usize, max_placeholders: usize) -> Scheduler {
        let mut slab = Slab::new();
        let root = slab.insert(Node::new(StreamId::ZERO, DEFAULT_WEIGHT));

        Scheduler {
            slab: slab,
            root: root,
            by_id: HashMap::new(),
            ring: VecDeque::with_capacity(ring_capacity),
            ring_capacity: ring_capacity,
            placeholders: 0,
            max_placeholders: max_placeholders,
            chromium_shape: true,
        }
    }

    /// Create (or adopt, if a PRIORITY frame got here first) the node
    /// for a stream opened by HEADERS.
    pub fn open_stream(&mut self, id: StreamId, prio: Option<&StreamDependency>) -> Key {
        if let Some(&key) = self.by_id.get(&id) {
            debug_assert!(self.slab[key.0].placeholder);
            self.slab[key.0].placeholder = false;
            self.placeholders -= 1;

            if let Some(dep) = prio {
                self.reprioritize(key, dep);
            }

            return key;
        }

        let key = Key(self.slab.insert(Node::new(id, DEFAULT_WEIGHT)));
        self.by_id.insert(id, key);
        self.place(key, prio);
        key
    }

    /// Create the node for a locally opened push stream, depending on
    /// its parent pull stream (or the root, for critical pushes).
    pub fn open_pushed(&mut self, id: StreamId, parent_of: Option<StreamId>, weight: u16) -> Key {
        debug_assert!(weight >= 1 && weight <= 256);

        let parent = parent_of
            .and_then(|pid| self.by_id.get(&pid).map(|&Key(k)| k))
            .unwrap_or(self.root);

        let key = Key(self.slab.insert(Node::new(id, weight)));
        self.by_id.insert(id, key);
        self.attach(key, parent, weight, false);
        key
    }

    /// Apply a PRIORITY frame. Unknown ids create bookkeeping-only
    /// placeholder nodes, up to the configured cap.
    pub fn recv_priority(
        &mut self,
        id: StreamId,
        dep: &StreamDependency,
    ) -> Result<(), TooManyPriorityStreams> {
        if let Some(&key) = self.by_id.get(&id) {
            self.reprioritize(key, dep);
            return Ok(());
        }

        if self.placeholders >= self.max_placeholders {
            return Err(TooManyPriorityStreams);
        }

        let key = Key(self.slab.insert(Node::new(id, DEFAULT_WEIGHT)));
        self.slab[key.0].placeholder = true;
        self.placeholders += 1;
        self.by_id.insert(id, key);
        self.place(key, Some(dep));
        Ok(())
    }

    /// Re-parent an existing node per a received dependency.
    pub fn reprioritize(&mut self, key: Key, dep: &StreamDependency) {
        let (mut parent, weight, exclusive) = self.resolve(key, dep);

        if parent == key.0 {
            // Weight-based relocation landed on the node itself; stay
            // put under the current parent.
            parent = self.slab[key.0].parent;
        } else if self.is_descendant(parent, key.0) {
            // Re-parenting under one's own descendant first moves that
            // descendant up to the node's former position (Section 5.3.3).
            let old_parent = self.slab[key.0].parent;
            self.detach(Key(parent));
            self.attach_one(Key(parent), old_parent);
        }

        self.detach(key);
        self.attach(key, parent, weight, exclusive);
    }

    /// Host-initiated reprioritization: move the node under the root
    /// with the given weight and remember the demotion.
    pub fn host_reprioritize(&mut self, key: Key, weight: u16) {
        debug_assert!(weight >= 1 && weight <= 256);

        self.detach(key);
        let root = self.root;
        self.attach(key, root, weight, false);
        self.slab[key.0].demoted = true;
    }

    /// Mark the stream's egress pending.
    pub fn activate(&mut self, key: Key) {
        if self.slab[key.0].active {
            return;
        }

        trace!("scheduler activate; id={:?}", self.slab[key.0].stream_id);
        self.slab[key.0].active = true;
        self.bubble(key.0, 1);
    }

    pub fn deactivate(&mut self, key: Key) {
        if !self.slab[key.0].active {
            return;
        }

        trace!("scheduler deactivate; id={:?}", self.slab[key.0].stream_id);
        self.slab[key.0].active = false;
        self.bubble(key.0, -1);
    }

    pub fn is_active(&self, key: Key) -> bool {
        self.slab[key.0].active
    }

    /// Whether any stream has egress pending.
    pub fn has_active(&self) -> bool {
        self.slab[self.root].active_count > 0
    }

    /// Select the next sender: walk the active subtree, preferring
    /// parents over descendants and splitting bandwidth among siblings
    /// by weight.
    pub fn next_sender(&mut self) -> Option<StreamId> {
        if self.slab[self.root].active_count == 0 {
            return None;
        }

        let mut cur = self.root;

        loop {
            if cur != self.root && self.slab[cur].active {
                let id = self.slab[cur].stream_id;
                self.charge(cur);
                return Some(id);
            }

            let mut best: Option<usize> = None;

            for &Key(c) in &self.slab[cur].children {
                if self.slab[c].active_count == 0 {
                    continue;
                }

                best = match best {
                    Some(b) if self.slab[b].vtime <= self.slab[c].vtime => Some(b),
                    _ => Some(c),
                };
            }

            match best {
                Some(c) => cur = c,
                None => return None,
            }
        }
    }

    /// Park the node of a closed stream in the ring, evicting the
    /// oldest occupant if the ring is full.
    pub fn park(&mut self, key: Key) {
        self.deactivate(key);

        if self.ring.len() == self.ring_capacity {
            if let Some(evicted) = self.ring.pop_front() {
                self.destroy(evicted);
            }
        }

        self.slab[key.0].parked = true;
        self.ring.push_back(key);
    }

    /// Whether the id refers to a node parked in the ring.
    pub fn is_parked(&self, id: StreamId) -> bool {
        match self.by_id.get(&id) {
            Some(&key) => self.slab[key.0].parked,
            None => false,
        }
    }

    pub fn chromium_shape(&self) -> bool {
        self.chromium_shape
    }

    pub fn weight(&self, key: Key) -> u16 {
        self.slab[key.0].weight
    }

    pub fn parent_id(&self, key: Key) -> Option<StreamId> {
        let parent = self.slab[key.0].parent;
        if parent == self.root {
            None
        } else {
            Some(self.slab[parent].stream_id)
        }
    }

    /// Structural self-check used by the debug surface: parent links
    /// match child lists, the tree is acyclic, and activity counts add
    /// up.
    pub fn is_consistent(&self) -> bool {
        for (idx, node) in self.slab.iter() {
            if idx != self.root {
                let parent = &self.slab[node.parent];
                if !parent.children.contains(&Key(idx)) {
                    return false;
                }

                // Walking up must terminate at the root.
                let mut cur = idx;
                let mut steps = 0;
                while cur != self.root {
                    cur = self.slab[cur].parent;
                    steps += 1;
                    if steps > self.slab.len() {
                        return false;
                    }
                }
            }

            let mut count = if node.active { 1 } else { 0 };
            for &Key(c) in &node.children {
                count += self.slab[c].active_count;
            }
            if count != node.active_count {
                return false;
            }
        }

        true
    }

    // ===== placement =====

    /// Resolve a received dependency to (parent, weight, exclusive),
    /// folding in the Chromium-shape heuristic.
    fn resolve(&mut self, key: Key, dep: &StreamDependency) -> (usize, u16, bool) {
        let dep_id = dep.dependency_id();
        let weight = dep.weight();

        if !dep.is_exclusive() {
            self.chromium_shape = false;
        }

        if dep_id.is_zero() {
            // An explicit dependency on the root keeps the advertised
            // weight.
            return (self.root, weight, dep.is_exclusive());
        }

        let parent = match self.by_id.get(&dep_id) {
            Some(&Key(p)) if p != key.0 => p,
            _ => {
                // Unknown or idle dependency target: default priority.
                return (self.root, DEFAULT_WEIGHT, false);
            }
        };

        if self.slab[parent].demoted {
            if self.chromium_shape {
                // The advertised parent was moved by the host; with a
                // Chromium-shaped tree the incoming stream is better
                // placed by weight from the root.
                let p = self.place_by_weight(weight);
                return (p, weight, true);
            }
        } else if weight > self.slab[parent].weight {
            // Chromium's chains only ever narrow.
            self.chromium_shape = false;
        }

        (parent, weight, dep.is_exclusive())
    }

    fn place(&mut self, key: Key, prio: Option<&StreamDependency>) {
        match prio {
            Some(dep) => {
                let (parent, weight, exclusive) = self.resolve(key, dep);
                self.attach(key, parent, weight, exclusive);
            }
            None => {
                let root = self.root;
                self.attach(key, root, DEFAULT_WEIGHT, false);
            }
        }
    }

    /// Walk the exclusive chain from the root down to the first node
    /// lighter than `weight`.
    fn place_by_weight(&self, weight: u16) -> usize {
        let mut cur = self.root;

        loop {
            let heaviest = self.slab[cur]
                .children
                .iter()
                .map(|&Key(c)| c)
                .max_by_key(|&c| self.slab[c].weight);

            match heaviest {
                Some(c) if self.slab[c].weight >= weight => cur = c,
                _ => return cur,
            }
        }
    }

    fn attach(&mut self, key: Key, parent: usize, weight: u16, exclusive: bool) {
        debug_assert!(parent != key.0);

        self.slab[key.0].weight = weight;

        if exclusive {
            // The exclusively inserted node adopts all of the parent's
            // current children.
            let children = ::std::mem::replace(&mut self.slab[parent].children, Vec::new());
            let mut adopted_active = 0;

            for &Key(c) in &children {
                self.slab[c].parent = key.0;
                adopted_active += self.slab[c].active_count;
            }

            self.slab[key.0].children.extend(children);
            self.slab[key.0].active_count += adopted_active;

            // The adopted activity is re-added below as part of the
            // node's own subtree.
            self.bubble_from(parent, -(adopted_active as isize));
        }

        self.attach_one(key, parent);
    }

    fn attach_one(&mut self, key: Key, parent: usize) {
        self.slab[key.0].parent = parent;
        self.slab[key.0].vtime = ::std::cmp::max(self.slab[key.0].vtime, self.slab[parent].vclock);
        self.slab[parent].children.push(key);

        let added = self.slab[key.0].active_count;
        self.bubble_from(parent, added as isize);
    }

    fn detach(&mut self, key: Key) {
        let parent = self.slab[key.0].parent;
        let pos = self.slab[parent].children.iter().position(|&k| k == key);
        debug_assert!(pos.is_some(), "node missing from parent's children");

        if let Some(pos) = pos {
            self.slab[parent].children.remove(pos);
        }

        let removed = self.slab[key.0].active_count;
        self.bubble_from(parent, -(removed as isize));
    }

    /// Drop a node for good: its children are re-parented one level up.
    fn destroy(&mut self, key: Key) {
        debug_assert!(!self.slab[key.0].active);

        self.detach(key);

        let parent = self.slab[key.0].parent;
        let children = ::std::mem::replace(&mut self.slab[key.0].children, Vec::new());

        for &child in &children {
            self.attach_one(child, parent);
        }

        let node = self.slab.remove(key.0);
        self.by_id.remove(&node.stream_id);

        if node.placeholder {
            self.placeholders -= 1;
        }
    }

    /// Apply an activity delta along the path from `start` to the root.
    fn bubble_from(&mut self, start: usize, delta: isize) {
        if delta == 0 {
            return;
        }

        let mut cur = start;

        loop {
            let count = self.slab[cur].active_count as isize + delta;
            debug_assert!(count >= 0);
            self.slab[cur].active_count = count as usize;

            if cur == self.root {
                break;
            }
            cur = self.slab[cur].parent;
        }
    }

    fn is_descendant(&self, node: usize, of: usize) -> bool {
        let mut cur = node;

        while cur != self.root {
            if cur == of {
                return true;
            }
            cur = self.slab[cur].parent;
        }

        false
    }

    fn bubble(&mut self, key: usize, delta: isize) {
        let mut cur = key;

        loop {
            let count = self.slab[cur].active_count as isize + delta;
            debug_assert!(count >= 0);
            self.slab[cur].active_count = count as usize;

            if delta > 0 && cur != self.root {
                let parent = self.slab[cur].parent;
                // Newly active edges are floored at the parent's clock
                // so they cannot starve siblings with banked idle time.
                self.slab[cur].vtime =
                    ::std::cmp::max(self.slab[cur].vtime, self.slab[parent].vclock);
            }

            if cur == self.root {
                break;
            }
            cur = self.slab[cur].parent;
        }
    }

    fn charge(&mut self, key: usize) {
        let mut cur = key;

        while cur != self.root {
            let parent = self.slab[cur].parent;
            let before = self.slab[cur].vtime;
            let weight = self.slab[cur].weight as u64;

            self.slab[cur].vtime = before + WEIGHT_UNIT / weight;
            self.slab[parent].vclock = before;

            cur = parent;
        }
    }
}
