//! Replays a text fixture file against a fresh [`Document`] and checks the
//! materialized result against an expected final document.
//!
//! Fixture format (one fixture per file, plain text, blank lines ignored):
//!
//! ```text
//! <N>                     number of edit lines that follow
//! <hex initial document>
//! I <at> <len> : <payload>   insert <len> printable-ASCII payload bytes at <at>
//! D <at> <len>                delete <len> bytes starting at <at>
//! ...                         (N lines total)
//! <hex expected final document>
//! ```
//!
//! Only the initial and final documents are hex-encoded; edit payloads are
//! literal bytes so fixtures stay readable as text.

use std::env;
use std::fs;
use std::process::ExitCode;

use ziggurat_engine::{Document, EngineConfig, EngineError};

#[derive(Debug)]
enum FixtureEdit {
    Insert { at: usize, payload: Vec<u8> },
    Delete { at: usize, len: usize },
}

struct Fixture {
    initial: Vec<u8>,
    edits: Vec<FixtureEdit>,
    expected: Vec<u8>,
}

fn decode_hex(s: &str) -> Result<Vec<u8>, EngineError> {
    let s: String = s.chars().filter(|c| !c.is_whitespace()).collect();
    if s.len() % 2 != 0 {
        return Err(EngineError::BadFixtureFormat(format!("odd-length hex string: {s:?}")));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| EngineError::BadFixtureFormat(format!("invalid hex byte at offset {i} in {s:?}")))
        })
        .collect()
}

fn parse_fixture(text: &str) -> Result<Fixture, EngineError> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());

    let count: usize = lines
        .next()
        .ok_or_else(|| EngineError::BadFixtureFormat("missing edit count".into()))?
        .trim()
        .parse()
        .map_err(|_| EngineError::BadFixtureFormat("edit count is not a number".into()))?;

    let initial = decode_hex(
        lines
            .next()
            .ok_or_else(|| EngineError::BadFixtureFormat("missing initial document".into()))?,
    )?;

    let mut edits = Vec::with_capacity(count);
    for _ in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| EngineError::BadFixtureFormat("fewer edit lines than N declared".into()))?;
        edits.push(parse_edit(line)?);
    }

    let expected = decode_hex(
        lines
            .next()
            .ok_or_else(|| EngineError::BadFixtureFormat("missing expected final document".into()))?,
    )?;

    Ok(Fixture { initial, edits, expected })
}

fn parse_edit(line: &str) -> Result<FixtureEdit, EngineError> {
    let bad = || EngineError::BadFixtureFormat(format!("malformed edit line: {line:?}"));

    if let Some(rest) = line.strip_prefix('I') {
        let (header, after_colon) = rest.split_once(':').ok_or_else(bad)?;
        let mut parts = header.split_whitespace();
        let at: usize = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let len: usize = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        // Exactly one space separates ':' from the payload; the payload
        // itself is taken verbatim so it can contain spaces of its own.
        let payload_str = after_colon.strip_prefix(' ').unwrap_or(after_colon);
        let payload = payload_str.as_bytes();
        if payload.len() != len {
            return Err(EngineError::BadFixtureFormat(format!(
                "insert at {at} declared len {len} but payload is {} bytes",
                payload.len()
            )));
        }
        if !payload.iter().all(|&b| (0x20..=0x7e).contains(&b)) {
            return Err(EngineError::BadFixtureFormat(format!(
                "insert payload at {at} is not printable ASCII: {payload_str:?}"
            )));
        }
        Ok(FixtureEdit::Insert { at, payload: payload.to_vec() })
    } else if let Some(rest) = line.strip_prefix('D') {
        let mut parts = rest.split_whitespace();
        let at: usize = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let len: usize = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        Ok(FixtureEdit::Delete { at, len })
    } else {
        Err(bad())
    }
}

fn run(path: &str) -> Result<(), String> {
    let text = fs::read_to_string(path).map_err(|e| format!("reading {path}: {e}"))?;
    let fixture = parse_fixture(&text).map_err(|e| e.to_string())?;

    let mut doc = Document::with_config(EngineConfig::default());
    doc.raw_insert(0, &fixture.initial).map_err(|e| e.to_string())?;

    for edit in &fixture.edits {
        match edit {
            FixtureEdit::Insert { at, payload } => {
                doc.raw_insert(*at, payload).map_err(|e| e.to_string())?;
            }
            FixtureEdit::Delete { at, len } => doc.raw_delete(*at, *len),
        }
    }

    let mut actual = Vec::new();
    doc.materialize(&mut actual).map_err(|e| e.to_string())?;

    if actual == fixture.expected {
        Ok(())
    } else {
        Err(format!(
            "mismatch: expected {} bytes, got {} bytes",
            fixture.expected.len(),
            actual.len()
        ))
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: fixture-harness <fixture-file>");
        return ExitCode::FAILURE;
    }

    match run(&args[1]) {
        Ok(()) => {
            println!("PASS {}", args[1]);
            ExitCode::SUCCESS
        }
        Err(msg) => {
            eprintln!("FAIL {}: {msg}", args[1]);
            ExitCode::FAILURE
        }
    }
}
