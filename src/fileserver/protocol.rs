//! File Wire Protocol
//!
//! Binary payloads are base64-encoded so message framing stays textual.
//! Stored names are the directory service's content-addressed filenames and
//! must never contain a path separator.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

pub const OK_RESPONSE: &str = "OK: 0\n\n";
pub const NOT_FOUND_RESPONSE: &str = "ERROR: FILE NOT FOUND\n\n";

/// A request to a file server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileMessage {
    /// Client write; triggers fan-out to the replica set.
    Upload { name: String, data: Vec<u8> },
    /// Replica write pushed by a primary; terminates after this hop.
    Update { name: String, data: Vec<u8> },
    /// Read of a locally stored file.
    Download { name: String },
}

impl FileMessage {
    pub fn encode(&self) -> String {
        match self {
            FileMessage::Upload { name, data } => {
                format!("UPLOAD: {}\nDATA: {}\n\n", name, STANDARD.encode(data))
            }
            FileMessage::Update { name, data } => {
                format!("UPDATE: {}\nDATA: {}\n\n", name, STANDARD.encode(data))
            }
            FileMessage::Download { name } => format!("DOWNLOAD: {}\n\n", name),
        }
    }

    /// Decodes a framed request. Returns `None` for anything malformed: an
    /// unknown verb, a name with path separators, or an undecodable payload.
    pub fn decode(message: &str) -> Option<Self> {
        let mut lines = message.lines();
        let first = lines.next()?;

        if let Some(name) = first.strip_prefix("DOWNLOAD: ") {
            return Some(FileMessage::Download {
                name: valid_name(name)?,
            });
        }

        let (verb, name) = if let Some(name) = first.strip_prefix("UPLOAD: ") {
            ("UPLOAD", name)
        } else if let Some(name) = first.strip_prefix("UPDATE: ") {
            ("UPDATE", name)
        } else {
            return None;
        };

        let name = valid_name(name)?;
        let encoded = lines.next()?.strip_prefix("DATA: ")?;
        let data = STANDARD.decode(encoded).ok()?;

        match verb {
            "UPLOAD" => Some(FileMessage::Upload { name, data }),
            _ => Some(FileMessage::Update { name, data }),
        }
    }
}

/// Response carrying file contents.
pub fn encode_data_response(data: &[u8]) -> String {
    format!("DATA: {}\n\n", STANDARD.encode(data))
}

pub fn decode_data_response(message: &str) -> Option<Vec<u8>> {
    let encoded = message.lines().next()?.strip_prefix("DATA: ")?;
    STANDARD.decode(encoded).ok()
}

/// A stored name must stay inside the bucket directory.
fn valid_name(name: &str) -> Option<String> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        None
    } else {
        Some(name.to_string())
    }
}
