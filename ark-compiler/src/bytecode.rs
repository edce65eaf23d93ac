// ark-compiler - Bytecode artifact format: assembly and decoding
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The bytecode artifact format.
//!
//! Layout: `magic(4) | version(6) | timestamp(8) | sha256(32) | symbol
//! table | value table | code segments`. All multi-byte numbers are
//! big-endian. The hash covers everything after itself, i.e. the tables
//! and the code segments; magic, version and timestamp are outside it.
//!
//! [`assemble`] builds an artifact from the compiler's tables and pages;
//! [`decode`] parses and verifies one, and exists mainly for tooling and
//! for the test suite to check artifacts from the outside.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use crate::instruction::Instruction;
use crate::page::CodePage;
use crate::table::{SymbolTable, ValueEntry, ValueTable};

/// `'a' 'r' 'k' 0x00`.
pub const MAGIC: [u8; 4] = [b'a', b'r', b'k', 0x00];

pub const VERSION_MAJOR: u16 = 0;
pub const VERSION_MINOR: u16 = 1;
pub const VERSION_PATCH: u16 = 0;

/// Bytes before the hash: magic + version + timestamp.
pub const HEADER_SIZE: usize = 18;
/// SHA-256 digest length.
pub const HASH_LENGTH: usize = 32;

// Section markers.
pub const SYM_TABLE_START: u8 = 0x01;
pub const VAL_TABLE_START: u8 = 0x02;
pub const CODE_SEGMENT_START: u8 = 0x03;

// Value table entry kinds.
pub const NUMBER_TYPE: u8 = 0x01;
pub const STRING_TYPE: u8 = 0x02;
pub const FUNC_TYPE: u8 = 0x03;

/// Decimal text form of a number constant. Fixed six fractional digits,
/// e.g. `42` → `"42.000000"`; the VM parses it back.
pub fn number_text(n: f64) -> String {
    format!("{:.6}", n)
}

fn push_u16(out: &mut Vec<u8>, n: u16) {
    out.push((n >> 8) as u8);
    out.push((n & 0x00ff) as u8);
}

/// Assemble the final artifact from the compiler's tables and pages.
pub fn assemble(symbols: &SymbolTable, values: &ValueTable, pages: &[CodePage]) -> Vec<u8> {
    let mut out = Vec::new();

    // magic + version
    out.extend_from_slice(&MAGIC);
    push_u16(&mut out, VERSION_MAJOR);
    push_u16(&mut out, VERSION_MINOR);
    push_u16(&mut out, VERSION_PATCH);

    // timestamp, unix seconds
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    out.extend_from_slice(&timestamp.to_be_bytes());

    // symbol table: count, then NUL-terminated names
    out.push(SYM_TABLE_START);
    push_u16(&mut out, symbols.len() as u16);
    for entry in symbols.entries() {
        out.extend_from_slice(entry.name.as_bytes());
        out.push(0x00);
    }

    // value table: count, then kind byte + payload + NUL per entry
    out.push(VAL_TABLE_START);
    push_u16(&mut out, values.len() as u16);
    for value in values.entries() {
        match value {
            ValueEntry::Number(n) => {
                out.push(NUMBER_TYPE);
                out.extend_from_slice(number_text(*n).as_bytes());
            }
            ValueEntry::Str(s) => {
                out.push(STRING_TYPE);
                out.extend_from_slice(s.as_bytes());
            }
            ValueEntry::PageAddr(page) => {
                out.push(FUNC_TYPE);
                push_u16(&mut out, *page);
            }
        }
        out.push(0x00);
    }

    // code segments, in page-id order; each page gets a trailing HALT so
    // the VM can never run off the end
    for page in pages {
        out.push(CODE_SEGMENT_START);
        push_u16(&mut out, (page.len() + 1) as u16);
        out.extend_from_slice(page.bytes());
        out.push(Instruction::Halt as u8);
    }
    if pages.is_empty() {
        out.push(CODE_SEGMENT_START);
        push_u16(&mut out, 1);
        out.push(Instruction::Halt as u8);
    }

    // hash of the tables + code, inserted right after the timestamp
    let hash = Sha256::digest(&out[HEADER_SIZE..]);
    out.splice(HEADER_SIZE..HEADER_SIZE, hash.iter().copied());

    out
}

// ============================================================================
// Decoding
// ============================================================================

/// Error while decoding an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    BadMagic,
    /// Input ended before the structure did.
    Truncated,
    /// The embedded hash does not match the content.
    HashMismatch,
    /// A section did not start with its expected marker byte.
    BadMarker { expected: u8, found: u8 },
    /// Unknown value table entry kind.
    BadValueKind(u8),
    /// A symbol name was not valid UTF-8.
    BadSymbolName,
    /// A number constant's text form did not parse.
    BadNumberText(String),
    /// A code segment did not end with HALT.
    MissingHalt,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::BadMagic => write!(f, "not an ark bytecode file (bad magic)"),
            DecodeError::Truncated => write!(f, "truncated bytecode file"),
            DecodeError::HashMismatch => write!(f, "bytecode hash mismatch (corrupted file)"),
            DecodeError::BadMarker { expected, found } => write!(
                f,
                "expected section marker {:#04x}, found {:#04x}",
                expected, found
            ),
            DecodeError::BadValueKind(kind) => {
                write!(f, "unknown value table entry kind {:#04x}", kind)
            }
            DecodeError::BadSymbolName => write!(f, "symbol name is not valid UTF-8"),
            DecodeError::BadNumberText(text) => {
                write!(f, "invalid number constant '{}'", text)
            }
            DecodeError::MissingHalt => write!(f, "code segment does not end with HALT"),
        }
    }
}

impl std::error::Error for DecodeError {}

/// A decoded artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub version: (u16, u16, u16),
    pub timestamp: u64,
    pub hash: [u8; HASH_LENGTH],
    pub symbols: Vec<String>,
    pub values: Vec<ValueEntry>,
    /// Raw segment bytes, one per code page, each ending with HALT.
    pub segments: Vec<Vec<u8>>,
}

/// Parse and verify an artifact.
pub fn decode(bytes: &[u8]) -> Result<Artifact, DecodeError> {
    let mut r = Reader { bytes, pos: 0 };

    if r.take(4)? != MAGIC {
        return Err(DecodeError::BadMagic);
    }
    let version = (r.u16()?, r.u16()?, r.u16()?);
    let timestamp = r.u64()?;

    let mut hash = [0u8; HASH_LENGTH];
    hash.copy_from_slice(r.take(HASH_LENGTH)?);
    let computed = Sha256::digest(&bytes[HEADER_SIZE + HASH_LENGTH..]);
    if computed.as_slice() != hash {
        return Err(DecodeError::HashMismatch);
    }

    r.marker(SYM_TABLE_START)?;
    let count = r.u16()?;
    let mut symbols = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let raw = r.until_nul()?;
        let name = std::str::from_utf8(raw).map_err(|_| DecodeError::BadSymbolName)?;
        symbols.push(name.to_string());
    }

    r.marker(VAL_TABLE_START)?;
    let count = r.u16()?;
    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let kind = r.u8()?;
        match kind {
            NUMBER_TYPE => {
                let raw = r.until_nul()?;
                let text = String::from_utf8_lossy(raw).into_owned();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| DecodeError::BadNumberText(text))?;
                values.push(ValueEntry::Number(n));
            }
            STRING_TYPE => {
                let raw = r.until_nul()?;
                values.push(ValueEntry::Str(
                    String::from_utf8_lossy(raw).into_owned(),
                ));
            }
            FUNC_TYPE => {
                let page = r.u16()?;
                r.until_nul()?; // terminator
                values.push(ValueEntry::PageAddr(page));
            }
            other => return Err(DecodeError::BadValueKind(other)),
        }
    }

    let mut segments = Vec::new();
    while !r.at_end() {
        r.marker(CODE_SEGMENT_START)?;
        let len = r.u16()? as usize;
        let body = r.take(len)?.to_vec();
        if body.last() != Some(&(Instruction::Halt as u8)) {
            return Err(DecodeError::MissingHalt);
        }
        segments.push(body);
    }

    Ok(Artifact {
        version,
        timestamp,
        hash,
        symbols,
        values,
        segments,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.pos + n > self.bytes.len() {
            return Err(DecodeError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(u64::from_be_bytes(buf))
    }

    fn marker(&mut self, expected: u8) -> Result<(), DecodeError> {
        let found = self.u8()?;
        if found != expected {
            return Err(DecodeError::BadMarker { expected, found });
        }
        Ok(())
    }

    /// Bytes up to (not including) the next NUL; consumes the NUL.
    fn until_nul(&mut self) -> Result<&'a [u8], DecodeError> {
        let start = self.pos;
        while self.pos < self.bytes.len() {
            if self.bytes[self.pos] == 0x00 {
                let slice = &self.bytes[start..self.pos];
                self.pos += 1;
                return Ok(slice);
            }
            self.pos += 1;
        }
        Err(DecodeError::Truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
