//! Caret-and-selection layer on top of the piece tree: navigation, editing,
//! and the save pipeline that re-seats the tree onto a freshly written file.

use std::io::{self, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use crate::buffers::OriginalBuffer;
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::file::{self, MappedSource};
use crate::history::{Edit, History, Origin, SystemClock};
use crate::tree::PieceTree;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaretPos {
    pub byte: usize,
    pub row: usize,
    pub col: usize,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Ident,
    Punct,
    Space,
    Newline,
}

fn classify(b: u8) -> CharClass {
    match b {
        b'\n' => CharClass::Newline,
        b' ' | b'\t' | b'\r' => CharClass::Space,
        b if b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 => CharClass::Ident,
        _ => CharClass::Punct,
    }
}

#[derive(Debug)]
pub struct Document {
    tree: PieceTree,
    caret: usize,
    anchor: Option<usize>,
    preferred_col: usize,
    max_cols: usize,
    path: Option<PathBuf>,
    history: History<SystemClock>,
}

impl Document {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let history = History::new(SystemClock, config.coalesce_window);
        Document {
            tree: PieceTree::new(config),
            caret: 0,
            anchor: None,
            preferred_col: 0,
            max_cols: 0,
            path: None,
            history,
        }
    }

    pub fn open(path: &Path, config: EngineConfig) -> Result<Self, EngineError> {
        let mapped = MappedSource::map(path)?;
        let history = History::new(SystemClock, config.coalesce_window);
        Ok(Document {
            tree: PieceTree::from_original(OriginalBuffer::from_mapped(mapped), config),
            caret: 0,
            anchor: None,
            preferred_col: 0,
            max_cols: 0,
            path: Some(path.to_path_buf()),
            history,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ---- read-only queries -------------------------------------------------

    pub fn size(&self) -> usize {
        self.tree.len()
    }

    pub fn line_count(&self) -> usize {
        self.tree.line_count()
    }

    /// Byte range of `line`'s content, excluding its trailing `\n` if any.
    pub fn line_span(&mut self, line: usize) -> Range<usize> {
        let start = self.tree.byte_of_line(line);
        let end = if line + 1 < self.tree.line_count() {
            self.tree.byte_of_line(line + 1) - 1
        } else {
            self.tree.len()
        };
        start..end
    }

    pub fn line_length(&mut self, line: usize) -> usize {
        let span = self.line_span(line);
        let len = span.end - span.start;
        if len > self.max_cols {
            self.max_cols = len;
        }
        len
    }

    /// Widest line length observed so far through [`Document::line_length`].
    /// A soft, monotonically increasing hint for host scroll bars; it is
    /// never recomputed downward when a long line is edited away.
    pub fn widest_line_observed(&self) -> usize {
        self.max_cols
    }

    pub fn position(&mut self) -> CaretPos {
        let row = self.tree.line_of_byte(self.caret);
        let line_start = self.tree.byte_of_line(row);
        CaretPos {
            byte: self.caret,
            row,
            col: self.caret - line_start,
        }
    }

    pub fn selection(&self) -> Option<Range<usize>> {
        self.anchor.map(|a| if a <= self.caret { a..self.caret } else { self.caret..a })
    }

    // ---- caret movement -----------------------------------------------------

    pub fn move_to(&mut self, byte: usize) {
        self.history.break_coalesce();
        self.anchor = None;
        self.caret = byte.min(self.tree.len());
        self.preferred_col = self.position().col;
    }

    /// Shared entry point for every directional move: closes whatever edit
    /// transaction is open (navigation always commits it), then either
    /// drops the selection (`cancel_select`) or, if one isn't already being
    /// extended, anchors it at the current caret so the upcoming move grows
    /// it — the Shift+arrow pattern.
    fn begin_motion(&mut self, cancel_select: bool) {
        self.history.break_coalesce();
        if cancel_select {
            self.anchor = None;
        } else if self.anchor.is_none() {
            self.anchor = Some(self.caret);
        }
    }

    pub fn move_left(&mut self, cancel_select: bool) {
        self.begin_motion(cancel_select);
        if self.caret > 0 {
            self.caret = self.prev_char_boundary(self.caret);
        }
        self.preferred_col = self.position().col;
    }

    pub fn move_right(&mut self, cancel_select: bool) {
        self.begin_motion(cancel_select);
        if self.caret < self.tree.len() {
            self.caret = self.next_char_boundary(self.caret);
        }
        self.preferred_col = self.position().col;
    }

    pub fn move_up(&mut self, cancel_select: bool) {
        self.begin_motion(cancel_select);
        let row = self.tree.line_of_byte(self.caret);
        if row == 0 {
            self.caret = 0;
            return;
        }
        self.caret_to_row(row - 1);
    }

    pub fn move_down(&mut self, cancel_select: bool) {
        self.begin_motion(cancel_select);
        let row = self.tree.line_of_byte(self.caret);
        if row + 1 >= self.tree.line_count() {
            self.caret = self.tree.len();
            return;
        }
        self.caret_to_row(row + 1);
    }

    fn caret_to_row(&mut self, row: usize) {
        let start = self.tree.byte_of_line(row);
        let len = self.line_length(row);
        self.caret = start + self.preferred_col.min(len);
    }

    pub fn home(&mut self, cancel_select: bool) {
        self.begin_motion(cancel_select);
        let row = self.tree.line_of_byte(self.caret);
        self.caret = self.tree.byte_of_line(row);
        self.preferred_col = 0;
    }

    pub fn end(&mut self, cancel_select: bool) {
        self.begin_motion(cancel_select);
        let row = self.tree.line_of_byte(self.caret);
        let span = self.line_span(row);
        self.caret = span.end;
        self.preferred_col = self.position().col;
    }

    fn class_at(&mut self, byte: usize) -> CharClass {
        match self.tree.byte_at(byte) {
            Some(b) => classify(b),
            None => CharClass::Newline,
        }
    }

    pub fn word_left(&mut self, cancel_select: bool) {
        self.begin_motion(cancel_select);
        if self.caret == 0 {
            return;
        }
        let mut pos = self.caret;
        while pos > 0 && matches!(self.class_at(pos - 1), CharClass::Space | CharClass::Newline) {
            pos -= 1;
        }
        if pos > 0 {
            let class = self.class_at(pos - 1);
            while pos > 0 && self.class_at(pos - 1) == class {
                pos -= 1;
            }
        }
        self.caret = pos;
        self.preferred_col = self.position().col;
    }

    pub fn word_right(&mut self, cancel_select: bool) {
        self.begin_motion(cancel_select);
        let len = self.tree.len();
        if self.caret >= len {
            return;
        }
        let mut pos = self.caret;
        let class = self.class_at(pos);
        while pos < len && self.class_at(pos) == class {
            pos += 1;
        }
        while pos < len && matches!(self.class_at(pos), CharClass::Space) {
            pos += 1;
        }
        self.caret = pos;
        self.preferred_col = self.position().col;
    }

    // ---- selection -----------------------------------------------------

    pub fn select_word(&mut self) {
        let len = self.tree.len();
        if len == 0 {
            self.anchor = Some(0);
            return;
        }
        let at = self.caret.min(len - 1);
        let class = self.class_at(at);
        if class == CharClass::Newline {
            self.select_document();
            return;
        }
        let mut start = at;
        while start > 0 && self.class_at(start - 1) == class {
            start -= 1;
        }
        let mut end = at + 1;
        while end < len && self.class_at(end) == class {
            end += 1;
        }
        self.anchor = Some(start);
        self.caret = end;
    }

    pub fn select_line(&mut self) {
        let row = self.tree.line_of_byte(self.caret);
        if self.line_span(row).is_empty() {
            self.select_document();
            return;
        }
        let start = self.tree.byte_of_line(row);
        let end = if row + 1 < self.tree.line_count() {
            self.tree.byte_of_line(row + 1)
        } else {
            self.tree.len()
        };
        self.anchor = Some(start);
        self.caret = end;
    }

    pub fn select_document(&mut self) {
        self.anchor = Some(0);
        self.caret = self.tree.len();
    }

    fn take_selection(&mut self) -> Option<Range<usize>> {
        let sel = self.selection();
        self.anchor = None;
        sel
    }

    // ---- editing -----------------------------------------------------

    /// Inserts `bytes` at the caret, replacing the selection if one is
    /// active. `bytes` must be valid UTF-8 on its own; the caret is only
    /// ever positioned on a UTF-8 boundary, so this is sufficient to keep
    /// the whole document valid.
    pub fn caret_insert(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.insert_with_origin(bytes, Origin::Typing)
    }

    /// Same as [`Document::caret_insert`], but recorded under an origin
    /// that never coalesces with neighboring typing, matching a paste
    /// landing as its own undo step regardless of timing.
    pub fn paste_insert(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.insert_with_origin(bytes, Origin::Paste)
    }

    fn insert_with_origin(&mut self, bytes: &[u8], origin: Origin) -> Result<(), EngineError> {
        if simdutf8::basic::from_utf8(bytes).is_err() {
            let err = std::str::from_utf8(bytes).expect_err("simdutf8 and std disagree on validity");
            return Err(EngineError::InvalidUtf8(err));
        }
        if let Some(range) = self.take_selection() {
            let removed = self.read_range(range.clone());
            self.tree.delete_bytes(range.start, range.end - range.start);
            self.caret = range.start;
            self.tree.insert_bytes(self.caret, bytes);
            self.history.record_replace(
                origin,
                Edit::Delete { at: range.start, bytes: removed },
                Edit::Insert { at: range.start, bytes: bytes.to_vec() },
            );
        } else {
            self.tree.insert_bytes(self.caret, bytes);
            self.history.record(origin, Edit::Insert { at: self.caret, bytes: bytes.to_vec() });
        }
        self.caret += bytes.len();
        self.preferred_col = self.position().col;
        Ok(())
    }

    /// Deletes the selection if one is active, otherwise the character
    /// before the caret. Selecting the whole document and backspacing is
    /// just a ranged delete like any other; it needs no special case beyond
    /// going through the same selection-delete path.
    pub fn caret_backspace(&mut self) {
        if let Some(range) = self.take_selection() {
            self.caret = range.start;
            self.delete_range(range, Origin::Backspace);
            self.preferred_col = self.position().col;
            return;
        }
        if self.caret == 0 {
            return;
        }
        let prev = self.prev_char_boundary(self.caret);
        let range = prev..self.caret;
        self.caret = prev;
        self.delete_range(range, Origin::Backspace);
        self.preferred_col = self.position().col;
    }

    pub fn caret_delete_forward(&mut self) {
        if let Some(range) = self.take_selection() {
            self.caret = range.start;
            self.delete_range(range, Origin::Delete);
            return;
        }
        if self.caret >= self.tree.len() {
            return;
        }
        let next = self.next_char_boundary(self.caret);
        self.delete_range(self.caret..next, Origin::Delete);
    }

    fn delete_range(&mut self, range: Range<usize>, origin: Origin) {
        let removed = self.read_range(range.clone());
        self.tree.delete_bytes(range.start, range.end - range.start);
        self.history.record(origin, Edit::Delete { at: range.start, bytes: removed });
    }

    fn read_range(&self, range: Range<usize>) -> Vec<u8> {
        let mut out = Vec::with_capacity(range.end - range.start);
        self.materialize_range(&mut out, range).expect("writing to a Vec never fails");
        out
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) {
        let Some(edits) = self.history.undo() else { return };
        for edit in edits {
            self.apply_edit_silently(&edit);
        }
    }

    pub fn redo(&mut self) {
        let Some(edits) = self.history.redo() else { return };
        for edit in edits {
            self.apply_edit_silently(&edit);
        }
    }

    /// Applies an edit to the tree without touching history — used to
    /// replay undo/redo steps, which already own their own bookkeeping.
    fn apply_edit_silently(&mut self, edit: &Edit) {
        match edit {
            Edit::Insert { at, bytes } => {
                self.tree.insert_bytes(*at, bytes);
                self.caret = at + bytes.len();
            }
            Edit::Delete { at, bytes } => {
                self.tree.delete_bytes(*at, bytes.len());
                self.caret = *at;
            }
        }
        self.anchor = None;
        self.preferred_col = self.position().col;
    }

    fn prev_char_boundary(&mut self, byte: usize) -> usize {
        let mut pos = byte - 1;
        while pos > 0 {
            match self.tree.byte_at(pos) {
                Some(b) if (b & 0xC0) == 0x80 => pos -= 1,
                _ => break,
            }
        }
        pos
    }

    fn next_char_boundary(&mut self, byte: usize) -> usize {
        let len = self.tree.len();
        let mut pos = byte + 1;
        while pos < len {
            match self.tree.byte_at(pos) {
                Some(b) if (b & 0xC0) == 0x80 => pos += 1,
                _ => break,
            }
        }
        pos
    }

    /// Inserts bytes at an arbitrary byte offset, bypassing the caret,
    /// selection and history entirely. For tooling (the fixture harness,
    /// benchmarks) that replays edits against raw offsets rather than
    /// simulating keystrokes.
    pub fn raw_insert(&mut self, at: usize, bytes: &[u8]) -> Result<(), EngineError> {
        if simdutf8::basic::from_utf8(bytes).is_err() {
            let err = std::str::from_utf8(bytes).expect_err("simdutf8 and std disagree on validity");
            return Err(EngineError::InvalidUtf8(err));
        }
        self.tree.insert_bytes(at, bytes);
        Ok(())
    }

    /// Deletes `len` bytes at an arbitrary byte offset. See
    /// [`Document::raw_insert`].
    pub fn raw_delete(&mut self, at: usize, len: usize) {
        self.tree.delete_bytes(at, len);
    }

    // ---- reading out -----------------------------------------------------

    pub fn materialize(&self, w: &mut dyn Write) -> io::Result<()> {
        crate::slice::materialize(&self.tree, w, 0..self.tree.len())
    }

    pub fn materialize_range(&self, w: &mut dyn Write, range: Range<usize>) -> io::Result<()> {
        crate::slice::materialize(&self.tree, w, range)
    }

    // ---- save pipeline -----------------------------------------------------

    /// Streams the document through a sibling temp file, renames it over
    /// `path`, then re-seats the tree onto the freshly mapped result.
    pub fn save_as(&mut self, path: &Path) -> Result<(), EngineError> {
        let temp_path = file::temp_path_for(path);
        {
            let tree = &self.tree;
            file::write_temp_and_sync(&temp_path, |w| crate::slice::materialize(tree, w, 0..tree.len()))?;
        }
        file::rename_into_place(&temp_path, path)?;

        let logical = self.tree.build_logical_index();
        let mapped = MappedSource::map(path)?;
        self.tree.reinit(OriginalBuffer::from_mapped(mapped), &logical);
        self.path = Some(path.to_path_buf());
        Ok(())
    }

    pub fn save(&mut self) -> Result<(), EngineError> {
        match self.path.clone() {
            Some(p) => self.save_as(&p),
            None => {
                log::warn!("save() called with no associated path; ignoring");
                Ok(())
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_navigate_lines() {
        let mut doc = Document::new();
        doc.caret_insert(b"first\nsecond\nthird").unwrap();
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line_length(0), 5);
        assert_eq!(doc.line_length(1), 6);
        doc.move_to(0);
        doc.move_down(true);
        assert_eq!(doc.position().row, 1);
        doc.end(true);
        assert_eq!(doc.position().col, 6);
    }

    #[test]
    fn word_motion_skips_whitespace_and_punctuation() {
        let mut doc = Document::new();
        doc.caret_insert(b"foo, bar baz").unwrap();
        doc.move_to(0);
        doc.word_right(true);
        assert_eq!(doc.position().byte, 3); // end of "foo"
        doc.word_right(true);
        assert_eq!(doc.position().byte, 8); // end of "bar"
    }

    #[test]
    fn select_word_and_backspace_deletes_it() {
        let mut doc = Document::new();
        doc.caret_insert(b"hello world").unwrap();
        doc.move_to(2);
        doc.select_word();
        doc.caret_backspace();
        let mut out = Vec::new();
        doc.materialize(&mut out).unwrap();
        assert_eq!(out, b" world");
    }

    #[test]
    fn shift_arrow_extends_the_selection_without_cancelling_it() {
        let mut doc = Document::new();
        doc.caret_insert(b"hello world").unwrap();
        doc.move_to(0);
        doc.move_right(false);
        doc.move_right(false);
        doc.move_right(false);
        assert_eq!(doc.selection(), Some(0..3));
        doc.move_right(true);
        assert!(doc.selection().is_none());
    }

    #[test]
    fn select_word_on_a_newline_selects_the_document() {
        let mut doc = Document::new();
        doc.caret_insert(b"first\nsecond").unwrap();
        doc.move_to(5); // the newline itself
        doc.select_word();
        assert_eq!(doc.selection(), Some(0..doc.size()));
    }

    #[test]
    fn select_line_on_an_empty_line_selects_the_document() {
        let mut doc = Document::new();
        doc.caret_insert(b"first\n\nthird").unwrap();
        doc.move_to(6); // the empty second line
        doc.select_line();
        assert_eq!(doc.selection(), Some(0..doc.size()));
    }

    #[test]
    fn select_document_and_backspace_clears_everything() {
        let mut doc = Document::new();
        doc.caret_insert(b"anything at all").unwrap();
        doc.select_document();
        doc.caret_backspace();
        assert_eq!(doc.size(), 0);
    }

    #[test]
    fn rejects_invalid_utf8_insert() {
        let mut doc = Document::new();
        let err = doc.caret_insert(&[0xff, 0xfe]).unwrap_err();
        assert!(matches!(err, EngineError::InvalidUtf8(_)));
        assert_eq!(doc.size(), 0);
    }

    #[test]
    fn save_round_trips_through_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let mut doc = Document::new();
        doc.caret_insert(b"round trip me").unwrap();
        doc.save_as(&path).unwrap();

        let mut reopened = Document::open(&path, EngineConfig::default()).unwrap();
        let mut out = Vec::new();
        reopened.materialize(&mut out).unwrap();
        assert_eq!(out, b"round trip me");
    }

    #[test]
    fn undo_then_redo_restores_edits() {
        let mut doc = Document::new();
        doc.caret_insert(b"hello").unwrap();
        // Moving away closes the open transaction, so the next insert lands
        // in one of its own even though it's contiguous and same-origin.
        doc.move_left(true);
        doc.move_right(true);
        doc.caret_insert(b" world").unwrap();
        doc.undo();
        let mut out = Vec::new();
        doc.materialize(&mut out).unwrap();
        assert_eq!(out, b"hello");
        doc.redo();
        out.clear();
        doc.materialize(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn undo_replace_restores_the_original_selection_text() {
        let mut doc = Document::new();
        doc.caret_insert(b"hello world").unwrap();
        doc.move_to(0);
        doc.select_word();
        doc.caret_insert(b"goodbye").unwrap();
        let mut out = Vec::new();
        doc.materialize(&mut out).unwrap();
        assert_eq!(out, b"goodbye world");
        doc.undo();
        out.clear();
        doc.materialize(&mut out).unwrap();
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn undo_across_save_survives_reseating() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        let mut doc = Document::new();
        doc.caret_insert(b"first").unwrap();
        doc.save_as(&path).unwrap();
        doc.caret_insert(b" second").unwrap();

        let mut out = Vec::new();
        doc.materialize(&mut out).unwrap();
        assert_eq!(out, b"first second");
    }
}
