//! File lifecycle: memory-mapped original source, and the primitives the
//! save pipeline (driven from [`crate::document::Document::save`]) uses to
//! stream a new file into place.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::EngineError;
use crate::piece::MAX_PIECE_LEN;

/// The name reserved for the sibling temp file a save streams through. Left
/// behind as a recoverable copy if the process dies mid-save.
pub const TEMP_FILE_NAME: &str = ".ziggurat_temp";

/// A read-only mapping of a file's bytes, or an empty slice for "no file".
#[derive(Debug)]
pub struct MappedSource {
    // Keeping the `Mmap` alive for the engine's lifetime is what makes the
    // byte slice handed out below valid; nothing else may truncate the file
    // underneath it for as long as this value lives.
    mmap: Option<memmap2::Mmap>,
}

impl MappedSource {
    pub fn empty() -> Self {
        MappedSource { mmap: None }
    }

    /// Maps `path` read-only. A zero-length file maps to the empty source
    /// rather than failing, since `mmap` of a zero-length file is undefined
    /// on some platforms and an empty document is indistinguishable from an
    /// empty file anyway.
    pub fn map(path: &Path) -> Result<Self, EngineError> {
        let file = File::open(path).map_err(|e| EngineError::from_open_io(e, path.display()))?;
        let len = file.metadata()?.len();
        if len > MAX_PIECE_LEN as u64 {
            return Err(EngineError::FileTooBig {
                size: len,
                limit: MAX_PIECE_LEN as u64,
            });
        }
        if len == 0 {
            return Ok(MappedSource::empty());
        }
        // SAFETY: relies on nothing else in this process truncating or
        // rewriting the file while it stays mapped, which holds because
        // save releases the mapping before touching the file.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(MappedSource { mmap: Some(mmap) })
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The sibling path a save streams the new document through before the
/// atomic rename.
pub fn temp_path_for(target: &Path) -> PathBuf {
    target
        .parent()
        .map(|dir| dir.join(TEMP_FILE_NAME))
        .unwrap_or_else(|| PathBuf::from(TEMP_FILE_NAME))
}

/// Creates/truncates `temp_path`, lets `write_body` stream the document into
/// a buffered writer, then flushes and `fsync`s before returning.
pub fn write_temp_and_sync(
    temp_path: &Path,
    write_body: impl FnOnce(&mut dyn Write) -> io::Result<()>,
) -> io::Result<()> {
    let file = File::create(temp_path)?;
    let mut writer = io::BufWriter::new(file);
    write_body(&mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(())
}

/// Atomic on POSIX; best effort on Windows, which cannot atomically replace
/// an open file.
pub fn rename_into_place(temp_path: &Path, target: &Path) -> io::Result<()> {
    std::fs::rename(temp_path, target)
}

/// Clipboard capability the engine consumes but does not own. A host
/// supplies an implementation (the `clipboard` feature enables one backed by
/// `arboard`); the engine only ever calls through this trait.
pub trait Clipboard {
    fn read(&mut self) -> Result<Vec<u8>, EngineError>;
    fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError>;
}

#[cfg(feature = "clipboard")]
pub struct SystemClipboard(arboard::Clipboard);

#[cfg(feature = "clipboard")]
impl SystemClipboard {
    pub fn new() -> Result<Self, EngineError> {
        arboard::Clipboard::new()
            .map(SystemClipboard)
            .map_err(|e| EngineError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }
}

#[cfg(feature = "clipboard")]
impl Clipboard for SystemClipboard {
    fn read(&mut self) -> Result<Vec<u8>, EngineError> {
        self.0
            .get_text()
            .map(String::into_bytes)
            .map_err(|e| EngineError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let text = std::str::from_utf8(bytes)?.to_owned();
        self.0
            .set_text(text)
            .map_err(|e| EngineError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())))
    }
}
