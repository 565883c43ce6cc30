//! Zero-copy, forward-only materialization of a byte range out of the piece
//! tree, used both by `Document::materialize` and the save pipeline.

use std::io::{self, Write};
use std::ops::Range;

use crate::tree::{NodeId, PieceTree};

pub struct SliceIter<'a> {
    tree: &'a PieceTree,
    leaf: Option<NodeId>,
    piece_index: usize,
    offset_in_piece: usize,
    remaining: usize,
}

impl<'a> SliceIter<'a> {
    pub(crate) fn new(tree: &'a PieceTree, range: Range<usize>) -> Self {
        if range.start >= range.end {
            return SliceIter {
                tree,
                leaf: None,
                piece_index: 0,
                offset_in_piece: 0,
                remaining: 0,
            };
        }
        let (leaf, piece_index, offset_in_piece) = tree.locate(range.start);
        SliceIter {
            tree,
            leaf: Some(leaf),
            piece_index,
            offset_in_piece,
            remaining: range.end - range.start,
        }
    }
}

impl<'a> Iterator for SliceIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            if self.remaining == 0 {
                return None;
            }
            let leaf = self.leaf?;
            let pieces = self.tree.pieces_of(leaf);
            if self.piece_index >= pieces.len() {
                self.leaf = self.tree.next_leaf(leaf);
                self.piece_index = 0;
                self.offset_in_piece = 0;
                continue;
            }
            let piece = pieces[self.piece_index];
            let available = piece.len() - self.offset_in_piece;
            if available == 0 {
                self.piece_index += 1;
                self.offset_in_piece = 0;
                continue;
            }
            let take = available.min(self.remaining);
            let buf = self.tree.bytes_of(piece.tag());
            let start = piece.offset() + self.offset_in_piece;
            let out = &buf[start..start + take];
            self.offset_in_piece += take;
            self.remaining -= take;
            return Some(out);
        }
    }
}

pub(crate) fn materialize(tree: &PieceTree, w: &mut dyn Write, range: Range<usize>) -> io::Result<()> {
    for chunk in SliceIter::new(tree, range) {
        w.write_all(chunk)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::OriginalBuffer;
    use crate::config::EngineConfig;

    #[test]
    fn slices_match_full_materialization() {
        let mut t = PieceTree::from_original(
            OriginalBuffer::from_bytes(b"hello world".to_vec()),
            EngineConfig::default(),
        );
        t.insert_bytes(5, b", cruel");
        let mut out = Vec::new();
        materialize(&t, &mut out, 0..t.len()).unwrap();
        assert_eq!(out, b"hello, cruel world");

        let mut mid = Vec::new();
        materialize(&t, &mut mid, 7..12).unwrap();
        assert_eq!(mid, b"cruel");
    }

    #[test]
    fn empty_range_yields_nothing() {
        let t = PieceTree::new(EngineConfig::default());
        let mut out = Vec::new();
        materialize(&t, &mut out, 0..0).unwrap();
        assert!(out.is_empty());
    }
}
