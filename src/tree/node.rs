use super::arena::NodeId;
use crate::piece::Piece;

/// A child link plus its cached aggregate weight, so an internal node can
/// answer byte/line descent queries without visiting the child itself.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Child {
    pub id: NodeId,
    pub bytes: usize,
    pub lines: usize,
}

#[derive(Debug)]
pub(crate) struct LeafNode {
    pub parent: Option<NodeId>,
    pub pieces: Vec<Piece>,
}

#[derive(Debug)]
pub(crate) struct InternalNode {
    pub parent: Option<NodeId>,
    pub children: Vec<Child>,
}

#[derive(Debug)]
pub(crate) enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl Node {
    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Leaf(l) => l.parent,
            Node::Internal(i) => i.parent,
        }
    }

    pub fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            Node::Leaf(l) => l.parent = parent,
            Node::Internal(i) => i.parent = parent,
        }
    }
}
