//! The piece tree: a B-tree whose leaves hold ordered runs of [`Piece`]s and
//! whose internal nodes cache each child's aggregate byte/line weight.
//!
//! Descent, splitting, merging and borrowing all work the same way
//! regardless of whether a node's children are pieces (leaf) or more nodes
//! (internal) — see [`Arena`] for why nodes are addressed by id rather than
//! `Rc` pointer.

mod arena;
mod node;

pub(crate) use arena::NodeId;
use arena::Arena;
use node::{Child, InternalNode, LeafNode, Node};

use crate::buffers::{AddBuffer, OriginalBuffer};
use crate::config::EngineConfig;
use crate::line_index::LineBreakIndex;
use crate::piece::{BufferTag, Piece};

/// One entry of a tree flattened back to front for a save re-seat. See
/// [`PieceTree::build_logical_index`]/[`PieceTree::reinit`].
#[derive(Clone, Copy, Debug)]
pub(crate) struct LogicalPieceDesc {
    pub tag: BufferTag,
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug)]
pub(crate) struct PieceTree {
    arena: Arena,
    root: NodeId,
    original: OriginalBuffer,
    add: AddBuffer,
    orig_index: LineBreakIndex,
    add_index: LineBreakIndex,
    config: EngineConfig,
    doc_len: usize,
    total_newlines: usize,
}

impl PieceTree {
    pub fn new(config: EngineConfig) -> Self {
        Self::from_original(OriginalBuffer::empty(), config)
    }

    pub fn from_original(original: OriginalBuffer, config: EngineConfig) -> Self {
        let mut tree = PieceTree {
            arena: Arena::new(),
            root: NodeId::DANGLING,
            original,
            add: Vec::new(),
            orig_index: LineBreakIndex::new(config.page_size),
            add_index: LineBreakIndex::new(config.page_size),
            config,
            doc_len: 0,
            total_newlines: 0,
        };
        let len = tree.original.len();
        let pieces = if len > 0 {
            vec![Piece::new(BufferTag::Original, 0, len)]
        } else {
            Vec::new()
        };
        tree.root = tree.build_tree_from_pieces(&pieces);
        tree.doc_len = len;
        tree.total_newlines = pieces.iter().map(|p| tree.piece_newlines(p)).sum();
        tree
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.doc_len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.doc_len == 0
    }

    #[inline]
    pub fn line_count(&self) -> usize {
        self.total_newlines + 1
    }

    // ---- buffer/index plumbing -------------------------------------------

    fn buffer_slice(&self, tag: BufferTag) -> &[u8] {
        match tag {
            BufferTag::Original => self.original.as_slice(),
            BufferTag::Add => self.add.as_slice(),
        }
    }

    fn buffer_and_index(&mut self, tag: BufferTag) -> (&[u8], &mut LineBreakIndex) {
        match tag {
            BufferTag::Original => (self.original.as_slice(), &mut self.orig_index),
            BufferTag::Add => (self.add.as_slice(), &mut self.add_index),
        }
    }

    fn piece_newlines(&mut self, piece: &Piece) -> usize {
        let (buf, idx) = self.buffer_and_index(piece.tag());
        idx.count_range(buf, piece.offset(), piece.len())
    }

    fn piece_nth_newline(&mut self, piece: &Piece, n: usize) -> Option<usize> {
        let (buf, idx) = self.buffer_and_index(piece.tag());
        idx.nth_newline_after(buf, piece.offset(), n)
    }

    fn piece_newlines_before(&mut self, piece: &Piece, local_len: usize) -> usize {
        let (buf, idx) = self.buffer_and_index(piece.tag());
        idx.count_range(buf, piece.offset(), local_len)
    }

    // ---- arena/node accessors ----------------------------------------------

    fn node_parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).parent()
    }

    fn set_node_parent(&mut self, id: NodeId, parent: Option<NodeId>) {
        self.arena.get_mut(id).set_parent(parent);
    }

    fn leaf_pieces(&self, id: NodeId) -> &Vec<Piece> {
        match self.arena.get(id) {
            Node::Leaf(l) => &l.pieces,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    fn set_leaf_pieces(&mut self, id: NodeId, pieces: Vec<Piece>) {
        match self.arena.get_mut(id) {
            Node::Leaf(l) => l.pieces = pieces,
            Node::Internal(_) => panic!("expected leaf node"),
        }
    }

    fn internal_children(&self, id: NodeId) -> &Vec<Child> {
        match self.arena.get(id) {
            Node::Internal(i) => &i.children,
            Node::Leaf(_) => panic!("expected internal node"),
        }
    }

    fn node_weight(&mut self, id: NodeId) -> (usize, usize) {
        match self.arena.get(id) {
            Node::Leaf(l) => {
                let pieces = l.pieces.clone();
                let mut bytes = 0;
                let mut lines = 0;
                for p in &pieces {
                    bytes += p.len();
                    lines += self.piece_newlines(p);
                }
                (bytes, lines)
            }
            Node::Internal(i) => {
                let mut bytes = 0;
                let mut lines = 0;
                for c in &i.children {
                    bytes += c.bytes;
                    lines += c.lines;
                }
                (bytes, lines)
            }
        }
    }

    fn refresh_child_weight(&mut self, id: NodeId) {
        let (bytes, lines) = self.node_weight(id);
        if let Some(parent) = self.node_parent(id) {
            if let Node::Internal(pi) = self.arena.get_mut(parent) {
                if let Some(c) = pi.children.iter_mut().find(|c| c.id == id) {
                    c.bytes = bytes;
                    c.lines = lines;
                }
            }
        }
    }

    fn detach_child(&mut self, id: NodeId) {
        if let Some(parent) = self.node_parent(id) {
            if let Node::Internal(pi) = self.arena.get_mut(parent) {
                pi.children.retain(|c| c.id != id);
            }
        }
    }

    fn leftmost_leaf(&self) -> NodeId {
        let mut n = self.root;
        loop {
            match self.arena.get(n) {
                Node::Leaf(_) => return n,
                Node::Internal(i) => n = i.children[0].id,
            }
        }
    }

    fn rightmost_leaf(&self) -> NodeId {
        let mut n = self.root;
        loop {
            match self.arena.get(n) {
                Node::Leaf(_) => return n,
                Node::Internal(i) => n = i.children.last().unwrap().id,
            }
        }
    }

    pub(crate) fn next_leaf(&self, node: NodeId) -> Option<NodeId> {
        let mut child = node;
        let mut parent = self.node_parent(child);
        loop {
            let p = parent?;
            let pos = match self.arena.get(p) {
                Node::Internal(pi) => pi.children.iter().position(|c| c.id == child).unwrap(),
                Node::Leaf(_) => unreachable!("a leaf cannot be a parent"),
            };
            let siblings = self.internal_children(p);
            if pos + 1 < siblings.len() {
                let mut n = siblings[pos + 1].id;
                loop {
                    match self.arena.get(n) {
                        Node::Leaf(_) => return Some(n),
                        Node::Internal(ni) => n = ni.children[0].id,
                    }
                }
            }
            child = p;
            parent = self.node_parent(p);
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn prev_leaf(&self, node: NodeId) -> Option<NodeId> {
        let mut child = node;
        let mut parent = self.node_parent(child);
        loop {
            let p = parent?;
            let pos = match self.arena.get(p) {
                Node::Internal(pi) => pi.children.iter().position(|c| c.id == child).unwrap(),
                Node::Leaf(_) => unreachable!("a leaf cannot be a parent"),
            };
            if pos > 0 {
                let siblings = self.internal_children(p);
                let mut n = siblings[pos - 1].id;
                loop {
                    match self.arena.get(n) {
                        Node::Leaf(_) => return Some(n),
                        Node::Internal(ni) => n = ni.children.last().unwrap().id,
                    }
                }
            }
            child = p;
            parent = self.node_parent(p);
        }
    }

    // ---- descent -------------------------------------------------------

    /// Descends picking children by a chosen weight metric (bytes or
    /// lines), returning the leaf reached along with the bytes/lines
    /// preceding it and the residual target within it.
    fn descend(&self, target: usize, metric: impl Fn(&Child) -> usize) -> (NodeId, usize, usize, usize) {
        let mut node = self.root;
        let mut bytes_before = 0usize;
        let mut lines_before = 0usize;
        let mut remaining = target;
        let mut depth = 0usize;
        loop {
            depth += 1;
            assert!(
                depth <= crate::config::MAX_TREE_DEPTH,
                "tree depth exceeded the hard cap; the tree is almost certainly corrupted"
            );
            match self.arena.get(node) {
                Node::Leaf(_) => return (node, bytes_before, lines_before, remaining),
                Node::Internal(internal) => {
                    let last = internal.children.len() - 1;
                    let mut next = None;
                    for (i, child) in internal.children.iter().enumerate() {
                        let w = metric(child);
                        if remaining < w || (remaining == w && i == last) {
                            next = Some(child.id);
                            break;
                        }
                        remaining -= w;
                        bytes_before += child.bytes;
                        lines_before += child.lines;
                    }
                    node = next.expect("internal node weights inconsistent with target offset");
                }
            }
        }
    }

    /// Locates the leaf and in-leaf byte offset for document offset `at`.
    pub(crate) fn find_at(&self, at: usize) -> (NodeId, usize) {
        debug_assert!(at <= self.doc_len);
        let (leaf, _, _, residual) = self.descend(at, |c| c.bytes);
        (leaf, residual)
    }

    /// Byte offset of the start of `line` (0-indexed).
    pub fn byte_of_line(&mut self, line: usize) -> usize {
        if line == 0 {
            return 0;
        }
        let (leaf, bytes_before, _, mut remaining) = self.descend(line, |c| c.lines);
        if remaining == 0 {
            return bytes_before;
        }
        let mut byte_acc = bytes_before;
        let pieces = self.leaf_pieces(leaf).clone();
        for piece in &pieces {
            let piece_lines = self.piece_newlines(piece);
            if remaining <= piece_lines {
                let pos = self
                    .piece_nth_newline(piece, remaining)
                    .expect("leaf weight disagreed with its own newline count");
                return byte_acc + (pos - piece.offset()) + 1;
            }
            remaining -= piece_lines;
            byte_acc += piece.len();
        }
        byte_acc
    }

    /// 0-indexed line containing document offset `byte`.
    pub fn line_of_byte(&mut self, byte: usize) -> usize {
        let (leaf, _, lines_before, residual) = self.descend(byte, |c| c.bytes);
        let mut lines_acc = lines_before;
        let mut off = residual;
        let pieces = self.leaf_pieces(leaf).clone();
        for piece in &pieces {
            let plen = piece.len();
            if off < plen {
                lines_acc += self.piece_newlines_before(piece, off);
                return lines_acc;
            }
            lines_acc += self.piece_newlines(piece);
            off -= plen;
        }
        lines_acc
    }

    /// Byte at document offset `at`, or `None` past the end.
    pub fn byte_at(&mut self, at: usize) -> Option<u8> {
        if at >= self.doc_len {
            return None;
        }
        let (leaf, off) = self.find_at(at);
        let pieces = self.leaf_pieces(leaf);
        let (idx, local) = locate_in_leaf(pieces, off);
        let piece = pieces[idx];
        Some(self.buffer_slice(piece.tag())[piece.offset() + local])
    }

    // ---- insertion -------------------------------------------------------

    pub fn insert_bytes(&mut self, at: usize, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        debug_assert!(at <= self.doc_len);

        let add_offset = self.add.len();
        self.add.extend_from_slice(bytes);
        let inserted_lines = {
            let (buf, idx) = self.buffer_and_index(BufferTag::Add);
            idx.count_range(buf, add_offset, bytes.len())
        };

        let (leaf, offset_in_leaf) = self.find_at(at);
        let leaf_len: usize = self.leaf_pieces(leaf).iter().map(|p| p.len()).sum();

        if self.config.fast_append && at == self.doc_len && offset_in_leaf == leaf_len {
            if let Some(last) = self.leaf_pieces(leaf).last().copied() {
                if last.tag() == BufferTag::Add && last.end() == add_offset {
                    let grown = Piece::new(BufferTag::Add, last.offset(), last.len() + bytes.len());
                    let mut pieces = self.leaf_pieces(leaf).clone();
                    *pieces.last_mut().unwrap() = grown;
                    self.set_leaf_pieces(leaf, pieces);
                    self.propagate_delta(leaf, bytes.len() as isize, inserted_lines as isize);
                    self.doc_len += bytes.len();
                    self.total_newlines += inserted_lines;
                    return;
                }
            }
        }

        let new_piece = Piece::new(BufferTag::Add, add_offset, bytes.len());
        self.insert_generic(leaf, offset_in_leaf, new_piece);
        self.doc_len += bytes.len();
        self.total_newlines += inserted_lines;
    }

    fn insert_generic(&mut self, leaf: NodeId, offset_in_leaf: usize, new_piece: Piece) {
        let old_pieces = self.leaf_pieces(leaf).clone();
        let old_bytes: usize = old_pieces.iter().map(|p| p.len()).sum();
        let old_lines: usize = old_pieces.iter().map(|p| self.piece_newlines(p)).sum();

        let (idx, off) = locate_in_leaf(&old_pieces, offset_in_leaf);
        let mut new_pieces = Vec::with_capacity(old_pieces.len() + 2);
        new_pieces.extend_from_slice(&old_pieces[..idx]);
        if idx < old_pieces.len() && off > 0 {
            let p = old_pieces[idx];
            new_pieces.push(p.truncate_back(p.len() - off));
            new_pieces.push(new_piece);
            new_pieces.push(p.skip_front(off));
            new_pieces.extend_from_slice(&old_pieces[idx + 1..]);
        } else {
            new_pieces.push(new_piece);
            new_pieces.extend_from_slice(&old_pieces[idx..]);
        }
        compact_adjacent(&mut new_pieces);

        let new_bytes: usize = new_pieces.iter().map(|p| p.len()).sum();
        let new_lines: usize = new_pieces.iter().map(|p| self.piece_newlines(p)).sum();

        self.set_leaf_pieces(leaf, new_pieces);
        self.propagate_delta(
            leaf,
            new_bytes as isize - old_bytes as isize,
            new_lines as isize - old_lines as isize,
        );
        self.fix_overflow(leaf);
    }

    fn propagate_delta(&mut self, node: NodeId, delta_bytes: isize, delta_lines: isize) {
        let mut current = node;
        while let Some(parent) = self.node_parent(current) {
            if let Node::Internal(pi) = self.arena.get_mut(parent) {
                if let Some(c) = pi.children.iter_mut().find(|c| c.id == current) {
                    c.bytes = (c.bytes as isize + delta_bytes) as usize;
                    c.lines = (c.lines as isize + delta_lines) as usize;
                }
            }
            current = parent;
        }
    }

    fn fix_overflow(&mut self, node: NodeId) {
        let mut node = node;
        loop {
            let (is_leaf, count, max) = match self.arena.get(node) {
                Node::Leaf(l) => (true, l.pieces.len(), self.config.max_pieces),
                Node::Internal(i) => (false, i.children.len(), self.config.max_branch),
            };
            if count <= max {
                return;
            }
            let parent = self.node_parent(node);
            let sibling = if is_leaf {
                self.split_leaf(node)
            } else {
                self.split_internal(node)
            };
            match parent {
                Some(p) => {
                    self.insert_child_after(p, node, sibling);
                    node = p;
                }
                None => {
                    self.new_root_with_children(node, sibling);
                    return;
                }
            }
        }
    }

    fn split_leaf(&mut self, node: NodeId) -> NodeId {
        let parent = self.node_parent(node);
        let right_pieces = match self.arena.get_mut(node) {
            Node::Leaf(l) => {
                let mid = l.pieces.len() / 2;
                l.pieces.split_off(mid)
            }
            Node::Internal(_) => unreachable!(),
        };
        self.arena.alloc(Node::Leaf(LeafNode {
            parent,
            pieces: right_pieces,
        }))
    }

    fn split_internal(&mut self, node: NodeId) -> NodeId {
        let parent = self.node_parent(node);
        let right_children = match self.arena.get_mut(node) {
            Node::Internal(i) => {
                let mid = i.children.len() / 2;
                i.children.split_off(mid)
            }
            Node::Leaf(_) => unreachable!(),
        };
        let right_id = self.arena.alloc(Node::Internal(InternalNode {
            parent,
            children: right_children,
        }));
        let child_ids: Vec<NodeId> = self.internal_children(right_id).iter().map(|c| c.id).collect();
        for cid in child_ids {
            self.set_node_parent(cid, Some(right_id));
        }
        right_id
    }

    fn insert_child_after(&mut self, parent: NodeId, left_id: NodeId, right_id: NodeId) {
        let left_w = self.node_weight(left_id);
        let right_w = self.node_weight(right_id);
        self.set_node_parent(right_id, Some(parent));
        if let Node::Internal(pi) = self.arena.get_mut(parent) {
            let pos = pi
                .children
                .iter()
                .position(|c| c.id == left_id)
                .expect("split child missing from its parent");
            pi.children[pos].bytes = left_w.0;
            pi.children[pos].lines = left_w.1;
            pi.children.insert(
                pos + 1,
                Child {
                    id: right_id,
                    bytes: right_w.0,
                    lines: right_w.1,
                },
            );
        }
    }

    fn new_root_with_children(&mut self, left: NodeId, right: NodeId) {
        let left_w = self.node_weight(left);
        let right_w = self.node_weight(right);
        let root_id = self.arena.alloc(Node::Internal(InternalNode {
            parent: None,
            children: vec![
                Child {
                    id: left,
                    bytes: left_w.0,
                    lines: left_w.1,
                },
                Child {
                    id: right,
                    bytes: right_w.0,
                    lines: right_w.1,
                },
            ],
        }));
        self.set_node_parent(left, Some(root_id));
        self.set_node_parent(right, Some(root_id));
        self.root = root_id;
    }

    // ---- deletion --------------------------------------------------------

    pub fn delete_bytes(&mut self, at: usize, len: usize) {
        if len == 0 {
            return;
        }
        debug_assert!(at + len <= self.doc_len);

        let mut remaining = len;
        let mut touched: Vec<NodeId> = Vec::new();
        while remaining > 0 {
            let (leaf, offset_in_leaf) = self.find_at(at);
            let removed = self.delete_from_leaf(leaf, offset_in_leaf, remaining);
            debug_assert!(removed > 0, "delete made no progress at a valid offset");
            remaining -= removed;
            if touched.last() != Some(&leaf) {
                touched.push(leaf);
            }
        }
        for leaf in touched {
            self.repair(leaf);
        }
        self.collapse_root();
    }

    fn delete_from_leaf(&mut self, leaf: NodeId, offset_in_leaf: usize, max_remove: usize) -> usize {
        let old_pieces = self.leaf_pieces(leaf).clone();
        let leaf_len: usize = old_pieces.iter().map(|p| p.len()).sum();
        let window_end = (offset_in_leaf + max_remove).min(leaf_len);
        if window_end <= offset_in_leaf {
            return 0;
        }
        let to_remove = window_end - offset_in_leaf;

        let old_lines: usize = old_pieces.iter().map(|p| self.piece_newlines(p)).sum();

        let mut new_pieces = Vec::with_capacity(old_pieces.len());
        let mut pos = 0usize;
        for p in &old_pieces {
            let p_start = pos;
            let p_len = p.len();
            let p_end = p_start + p_len;
            pos = p_end;

            let cut_start = offset_in_leaf.max(p_start);
            let cut_end = window_end.min(p_end);
            if cut_start >= cut_end {
                new_pieces.push(*p);
                continue;
            }
            let local_start = cut_start - p_start;
            let local_end = cut_end - p_start;
            if local_start > 0 {
                new_pieces.push(p.truncate_back(p_len - local_start));
            }
            if local_end < p_len {
                new_pieces.push(p.skip_front(local_end));
            }
        }
        compact_adjacent(&mut new_pieces);

        let new_bytes: usize = new_pieces.iter().map(|p| p.len()).sum();
        let new_lines: usize = new_pieces.iter().map(|p| self.piece_newlines(p)).sum();

        self.set_leaf_pieces(leaf, new_pieces);
        self.propagate_delta(
            leaf,
            new_bytes as isize - leaf_len as isize,
            new_lines as isize - old_lines as isize,
        );
        self.doc_len -= to_remove;
        self.total_newlines = (self.total_newlines as isize + (new_lines as isize - old_lines as isize)) as usize;

        to_remove
    }

    fn repair(&mut self, start: NodeId) {
        let mut queue = vec![start];
        let mut seen = std::collections::HashSet::new();
        while let Some(node) = queue.pop() {
            if !self.arena.contains(node) || !seen.insert(node) {
                continue;
            }
            if let Some(next) = self.repair_node(node) {
                queue.push(next);
            }
        }
    }

    /// Fixes `node` if it is under-full or empty, returning the parent to
    /// re-check if the fix changed `node`'s parent's child count.
    fn repair_node(&mut self, node: NodeId) -> Option<NodeId> {
        if node == self.root {
            return None;
        }
        let parent = self.node_parent(node)?;
        let (count, min) = match self.arena.get(node) {
            Node::Leaf(l) => (l.pieces.len(), self.config.min_pieces),
            Node::Internal(i) => (i.children.len(), self.config.min_branch),
        };
        if count == 0 {
            self.detach_child(node);
            self.arena.free(node);
            return Some(parent);
        }
        if count >= min {
            return None;
        }

        let siblings = self.internal_children(parent);
        let pos = siblings.iter().position(|c| c.id == node).unwrap();
        let left_sib = (pos > 0).then(|| siblings[pos - 1].id);
        let right_sib = (pos + 1 < siblings.len()).then(|| siblings[pos + 1].id);

        if let Some(l) = left_sib {
            if self.try_merge(l, node) {
                return Some(parent);
            }
        }
        if let Some(r) = right_sib {
            if self.try_merge(node, r) {
                return Some(parent);
            }
        }
        if let Some(r) = right_sib {
            self.borrow_from(node, r, true);
            return None;
        }
        if let Some(l) = left_sib {
            self.borrow_from(node, l, false);
            return None;
        }
        None
    }

    fn try_merge(&mut self, left: NodeId, right: NodeId) -> bool {
        let fits = match (self.arena.get(left), self.arena.get(right)) {
            (Node::Leaf(l), Node::Leaf(r)) => l.pieces.len() + r.pieces.len() <= self.config.max_pieces,
            (Node::Internal(l), Node::Internal(r)) => {
                l.children.len() + r.children.len() <= self.config.max_branch
            }
            _ => unreachable!("siblings must be the same node kind"),
        };
        if !fits {
            return false;
        }

        let is_leaf = matches!(self.arena.get(left), Node::Leaf(_));
        if is_leaf {
            let mut combined = self.leaf_pieces(left).clone();
            combined.extend(self.leaf_pieces(right).clone());
            compact_adjacent(&mut combined);
            self.set_leaf_pieces(left, combined);
        } else {
            let right_children = self.internal_children(right).clone();
            for c in &right_children {
                self.set_node_parent(c.id, Some(left));
            }
            if let Node::Internal(li) = self.arena.get_mut(left) {
                li.children.extend(right_children);
            }
        }

        self.detach_child(right);
        self.arena.free(right);
        self.refresh_child_weight(left);
        true
    }

    fn borrow_from(&mut self, node: NodeId, sibling: NodeId, sibling_is_right: bool) {
        match self.arena.get(node) {
            Node::Leaf(_) => self.borrow_pieces(node, sibling, sibling_is_right),
            Node::Internal(_) => self.borrow_children(node, sibling, sibling_is_right),
        }
        self.refresh_child_weight(node);
        self.refresh_child_weight(sibling);
    }

    fn borrow_pieces(&mut self, node: NodeId, sibling: NodeId, sibling_is_right: bool) {
        let min = self.config.min_pieces;
        let mut node_pieces = self.leaf_pieces(node).clone();
        let mut sib_pieces = self.leaf_pieces(sibling).clone();
        let needed = min.saturating_sub(node_pieces.len()).max(1);
        let available = sib_pieces.len().saturating_sub(min);
        let take = needed.min(available).max(1).min(sib_pieces.len());

        if sibling_is_right {
            let moved: Vec<Piece> = sib_pieces.drain(0..take).collect();
            node_pieces.extend(moved);
        } else {
            let split_at = sib_pieces.len() - take;
            let moved = sib_pieces.split_off(split_at);
            let mut combined = moved;
            combined.extend(node_pieces);
            node_pieces = combined;
        }
        compact_adjacent(&mut node_pieces);
        compact_adjacent(&mut sib_pieces);
        self.set_leaf_pieces(node, node_pieces);
        self.set_leaf_pieces(sibling, sib_pieces);
    }

    fn borrow_children(&mut self, node: NodeId, sibling: NodeId, sibling_is_right: bool) {
        let min = self.config.min_branch;
        let mut node_children = self.internal_children(node).clone();
        let mut sib_children = self.internal_children(sibling).clone();
        let needed = min.saturating_sub(node_children.len()).max(1);
        let available = sib_children.len().saturating_sub(min);
        let take = needed.min(available).max(1).min(sib_children.len());

        let moved: Vec<Child> = if sibling_is_right {
            sib_children.drain(0..take).collect()
        } else {
            let split_at = sib_children.len() - take;
            sib_children.split_off(split_at)
        };
        for c in &moved {
            self.set_node_parent(c.id, Some(node));
        }
        if sibling_is_right {
            node_children.extend(moved);
        } else {
            let mut combined = moved;
            combined.extend(node_children);
            node_children = combined;
        }
        if let Node::Internal(n) = self.arena.get_mut(node) {
            n.children = node_children;
        }
        if let Node::Internal(s) = self.arena.get_mut(sibling) {
            s.children = sib_children;
        }
    }

    fn collapse_root(&mut self) {
        loop {
            match self.arena.get(self.root) {
                Node::Leaf(_) => return,
                Node::Internal(i) => {
                    if i.children.is_empty() {
                        let old = self.root;
                        let new_root = self.arena.alloc(Node::Leaf(LeafNode {
                            parent: None,
                            pieces: Vec::new(),
                        }));
                        self.root = new_root;
                        self.arena.free(old);
                        return;
                    } else if i.children.len() == 1 {
                        let only = i.children[0].id;
                        let old = self.root;
                        self.set_node_parent(only, None);
                        self.root = only;
                        self.arena.free(old);
                    } else {
                        return;
                    }
                }
            }
        }
    }

    // ---- bulk (re)construction -------------------------------------------

    fn build_tree_from_pieces(&mut self, pieces: &[Piece]) -> NodeId {
        if pieces.is_empty() {
            return self.arena.alloc(Node::Leaf(LeafNode {
                parent: None,
                pieces: Vec::new(),
            }));
        }
        let sizes = chunk_balanced(pieces.len(), self.config.min_pieces, self.config.max_pieces);
        let mut leaves = Vec::with_capacity(sizes.len());
        let mut cursor = 0;
        for size in sizes {
            let chunk = pieces[cursor..cursor + size].to_vec();
            cursor += size;
            leaves.push(self.arena.alloc(Node::Leaf(LeafNode {
                parent: None,
                pieces: chunk,
            })));
        }
        self.build_levels(leaves)
    }

    fn build_levels(&mut self, mut level: Vec<NodeId>) -> NodeId {
        loop {
            if level.len() == 1 {
                let root = level[0];
                self.set_node_parent(root, None);
                return root;
            }
            let sizes = chunk_balanced(level.len(), self.config.min_branch, self.config.max_branch);
            let mut next_level = Vec::with_capacity(sizes.len());
            let mut cursor = 0;
            for size in sizes {
                let group = level[cursor..cursor + size].to_vec();
                cursor += size;
                let children: Vec<Child> = group
                    .iter()
                    .map(|&id| {
                        let (bytes, lines) = self.node_weight(id);
                        Child { id, bytes, lines }
                    })
                    .collect();
                let parent_id = self.arena.alloc(Node::Internal(InternalNode {
                    parent: None,
                    children,
                }));
                for &cid in &group {
                    self.set_node_parent(cid, Some(parent_id));
                }
                next_level.push(parent_id);
            }
            level = next_level;
        }
    }

    /// Flattens the tree, left to right, into a description a fresh tree can
    /// be rebuilt from after the original buffer is replaced by a save.
    pub fn build_logical_index(&self) -> Vec<LogicalPieceDesc> {
        let mut out = Vec::new();
        let mut leaf = Some(self.leftmost_leaf());
        while let Some(l) = leaf {
            for p in self.leaf_pieces(l) {
                out.push(LogicalPieceDesc {
                    tag: p.tag(),
                    offset: p.offset(),
                    len: p.len(),
                });
            }
            leaf = self.next_leaf(l);
        }
        out
    }

    /// Rebuilds the tree over `new_original`, re-seating every piece the
    /// logical index named. The add buffer (and its pieces' offsets into it)
    /// is untouched.
    pub fn reinit(&mut self, new_original: OriginalBuffer, logical_index: &[LogicalPieceDesc]) {
        self.original = new_original;
        self.orig_index = LineBreakIndex::new(self.config.page_size);
        self.arena = Arena::new();

        let pieces: Vec<Piece> = logical_index
            .iter()
            .map(|d| Piece::new(d.tag, d.offset, d.len))
            .collect();
        self.root = self.build_tree_from_pieces(&pieces);
        self.doc_len = pieces.iter().map(|p| p.len()).sum();
        self.total_newlines = pieces.iter().map(|p| self.piece_newlines(p)).sum();
    }

    /// Leaf and (piece index, offset within that piece) for document offset
    /// `at`, the starting point [`crate::slice::SliceIter`] walks forward
    /// from.
    pub(crate) fn locate(&self, at: usize) -> (NodeId, usize, usize) {
        let (leaf, off) = self.find_at(at);
        let (idx, local) = locate_in_leaf(self.leaf_pieces(leaf), off);
        (leaf, idx, local)
    }

    pub(crate) fn pieces_of(&self, id: NodeId) -> &[Piece] {
        self.leaf_pieces(id)
    }

    pub(crate) fn bytes_of(&self, tag: BufferTag) -> &[u8] {
        self.buffer_slice(tag)
    }
}

fn locate_in_leaf(pieces: &[Piece], mut offset: usize) -> (usize, usize) {
    for (i, p) in pieces.iter().enumerate() {
        if offset < p.len() {
            return (i, offset);
        }
        offset -= p.len();
    }
    (pieces.len(), 0)
}

fn compact_adjacent(pieces: &mut Vec<Piece>) {
    let mut i = 0;
    while i + 1 < pieces.len() {
        if pieces[i].is_mergeable_with(&pieces[i + 1]) {
            pieces[i] = pieces[i].merge(&pieces[i + 1]);
            pieces.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

/// Splits `n` items into groups of size `[min, max]`, as evenly as possible.
/// A single group smaller than `min` is returned only when `n < min` itself
/// (the whole input becomes one short group, e.g. a small document's root
/// leaf, which is exempt from the minimum).
fn chunk_balanced(n: usize, min: usize, max: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    if n <= max {
        return vec![n];
    }
    let groups = n.div_ceil(max);
    let base = n / groups;
    let rem = n % groups;
    (0..groups).map(|i| base + usize::from(i < rem)).collect()
}
