//! Lock Wire Protocol
//!
//! One request and one response per line. Fields are joined by the reserved
//! `:` delimiter, so field values must never contain it; the client strips it
//! from the host name when it derives its identity.

/// Reserved field delimiter.
pub const DELIMITER: char = ':';
/// Lock name used when the caller does not name one.
pub const DEFAULT_LOCK: &str = "_DEFAULT_";

/// A request to the lock arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockRequest {
    /// Liveness check.
    Ping,
    /// Acquire `name` on behalf of `id`.
    Lock { name: String, id: String },
    /// Release `name`, which must be held by `id`.
    Unlock { name: String, id: String },
    /// Orderly shutdown of the arbiter.
    Done,
}

impl LockRequest {
    pub fn encode(&self) -> String {
        match self {
            LockRequest::Ping => "PING".to_string(),
            LockRequest::Lock { name, id } => format!("LOCK{d}{name}{d}{id}", d = DELIMITER),
            LockRequest::Unlock { name, id } => format!("UNLOCK{d}{name}{d}{id}", d = DELIMITER),
            LockRequest::Done => "DONE".to_string(),
        }
    }

    /// Decodes a request line. `Err` carries the message for the
    /// `MSG_ERROR` response; the connection stays open either way.
    pub fn decode(line: &str) -> Result<Self, String> {
        let line = line.trim_end_matches('\n');
        let fields: Vec<&str> = line.split(DELIMITER).collect();

        match fields.as_slice() {
            ["PING"] => Ok(LockRequest::Ping),
            ["DONE"] => Ok(LockRequest::Done),
            ["LOCK", name, id] if !name.is_empty() && !id.is_empty() => Ok(LockRequest::Lock {
                name: name.to_string(),
                id: id.to_string(),
            }),
            ["UNLOCK", name, id] if !name.is_empty() && !id.is_empty() => {
                Ok(LockRequest::Unlock {
                    name: name.to_string(),
                    id: id.to_string(),
                })
            }
            ["LOCK", ..] => Err("Please provide name and id for locking".to_string()),
            ["UNLOCK", ..] => Err("Please provide name and id for unlocking".to_string()),
            _ => Err(format!("MSG `{}` not understood", line)),
        }
    }
}

/// A response from the lock arbiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockResponse {
    Pong,
    /// Lock granted and recorded.
    Go,
    /// Lock held by someone else; poll again.
    Wait,
    /// Lock released and removed.
    Unlocked,
    /// Release refused; the table is unchanged.
    ReleaseError(String),
    /// Malformed or unknown request.
    MsgError(String),
    /// Arbiter acknowledges `DONE` and stops.
    Close(String),
}

impl LockResponse {
    pub fn encode(&self) -> String {
        match self {
            LockResponse::Pong => "PONG".to_string(),
            LockResponse::Go => "GO".to_string(),
            LockResponse::Wait => "WAIT".to_string(),
            LockResponse::Unlocked => "UNLOCKED".to_string(),
            LockResponse::ReleaseError(msg) => format!("RELEASE_ERROR{}{}", DELIMITER, msg),
            LockResponse::MsgError(msg) => format!("MSG_ERROR{}{}", DELIMITER, msg),
            LockResponse::Close(msg) => format!("CLOSE{}{}", DELIMITER, msg),
        }
    }

    pub fn decode(line: &str) -> Option<Self> {
        let line = line.trim_end_matches('\n');
        match line {
            "PONG" => return Some(LockResponse::Pong),
            "GO" => return Some(LockResponse::Go),
            "WAIT" => return Some(LockResponse::Wait),
            "UNLOCKED" => return Some(LockResponse::Unlocked),
            _ => {}
        }
        let (verb, msg) = line.split_once(DELIMITER)?;
        match verb {
            "RELEASE_ERROR" => Some(LockResponse::ReleaseError(msg.to_string())),
            "MSG_ERROR" => Some(LockResponse::MsgError(msg.to_string())),
            "CLOSE" => Some(LockResponse::Close(msg.to_string())),
            _ => None,
        }
    }
}
