//! Content fingerprints
//!
//! Provides a single canonical fingerprint format (`sha256:<hex>`) used for
//! every equality decision the engine makes about file and row content.
//! Fingerprints are computed over normalized content and never over
//! timestamps or sizes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::path::Path;

use crate::path::extension_of;

/// Prefix for all fingerprints produced by this module
const PREFIX: &str = "sha256:";

/// Extensions whose content is hashed as raw bytes.
///
/// Everything else is treated as text and has its line endings normalized.
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "webp", "bmp", "ico", "tif", "tiff", "avif", "heic", "psd",
    "woff", "woff2", "ttf", "otf", "eot", "zip", "gz", "tgz", "bz2", "xz", "7z", "rar", "tar",
    "pdf", "mp3", "mp4", "m4a", "m4v", "mov", "avi", "wav", "ogg", "oga", "ogv", "webm", "flac",
    "exe", "dll", "so", "dylib", "bin", "class", "jar", "wasm", "sqlite", "db", "mo",
];

/// A content fingerprint in the canonical `sha256:<hex>` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First hex characters of the digest, for compact display.
    pub fn short(&self) -> &str {
        let hex = self.0.strip_prefix(PREFIX).unwrap_or(&self.0);
        &hex[..hex.len().min(12)]
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How file content is treated before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentClass {
    /// Line endings are normalized to `\n` before hashing
    Text,
    /// Raw bytes are hashed
    Binary,
}

impl ContentClass {
    /// Classify a path by its extension.
    pub fn for_path(path: impl AsRef<Path>) -> Self {
        let name = path.as_ref().to_string_lossy();
        match extension_of(&name) {
            Some(ext) if is_binary_extension(ext) => Self::Binary,
            _ => Self::Text,
        }
    }
}

fn is_binary_extension(ext: &str) -> bool {
    BINARY_EXTENSIONS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(ext))
}

/// Normalize `\r\n` and lone `\r` to `\n`.
///
/// Content without carriage returns is returned borrowed.
pub fn normalize_line_endings(bytes: &[u8]) -> Cow<'_, [u8]> {
    if !bytes.contains(&b'\r') {
        return Cow::Borrowed(bytes);
    }

    let mut out = Vec::with_capacity(bytes.len());
    let mut iter = bytes.iter().peekable();
    while let Some(&b) = iter.next() {
        if b == b'\r' {
            if iter.peek() == Some(&&b'\n') {
                iter.next();
            }
            out.push(b'\n');
        } else {
            out.push(b);
        }
    }
    Cow::Owned(out)
}

/// Same normalization for text already held as a `str`.
pub fn normalize_text(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Fingerprint a byte buffer according to its content class.
pub fn fingerprint_bytes(bytes: &[u8], class: ContentClass) -> Fingerprint {
    let mut hasher = Sha256::new();
    match class {
        ContentClass::Text => hasher.update(normalize_line_endings(bytes)),
        ContentClass::Binary => hasher.update(bytes),
    }
    Fingerprint(format!("{}{:x}", PREFIX, hasher.finalize()))
}

/// Fingerprint a string verbatim.
///
/// Callers are expected to have normalized the string already; row
/// fingerprints are built from canonical JSON this way.
pub fn fingerprint_str(content: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    Fingerprint(format!("{}{:x}", PREFIX, hasher.finalize()))
}

/// Fingerprint a file's contents, classifying it by extension.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn fingerprint_file(path: &Path) -> std::io::Result<Fingerprint> {
    let content = std::fs::read(path)?;
    Ok(fingerprint_bytes(&content, ContentClass::for_path(path)))
}
