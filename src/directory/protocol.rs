//! Directory Wire Protocol
//!
//! Blank-line framed text messages. Encode/decode pairs preserve the exact
//! wire bytes; no positional splitting happens outside this module.

use sha2::{Digest, Sha256};

/// A request to the directory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryRequest {
    /// Resolve the primary server for a file's parent directory.
    GetServer { path: String },
    /// List every registered server except the asker.
    GetSlaves { host: String, port: u16 },
}

impl DirectoryRequest {
    pub fn encode(&self) -> String {
        match self {
            DirectoryRequest::GetServer { path } => {
                format!("GET_SERVER: \nFILENAME: {}\n\n", path)
            }
            DirectoryRequest::GetSlaves { host, port } => {
                format!("GET_SLAVES: {}\nPORT: {}\n\n", host, port)
            }
        }
    }

    pub fn decode(message: &str) -> Option<Self> {
        let mut lines = message.lines();
        let first = lines.next()?;

        if first.trim_end() == "GET_SERVER:" {
            let path = lines.next()?.strip_prefix("FILENAME: ")?;
            if path.is_empty() {
                return None;
            }
            return Some(DirectoryRequest::GetServer {
                path: path.to_string(),
            });
        }

        if let Some(host) = first.strip_prefix("GET_SLAVES: ") {
            let port = lines.next()?.strip_prefix("PORT: ")?.parse().ok()?;
            if host.is_empty() {
                return None;
            }
            return Some(DirectoryRequest::GetSlaves {
                host: host.to_string(),
                port,
            });
        }

        None
    }
}

/// Response to `GET_SERVER`: the primary plus the replica targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryAssignment {
    pub host: String,
    pub port: u16,
    /// Content-addressed stored filename.
    pub filename: String,
    pub slaves: Vec<(String, u16)>,
}

impl PrimaryAssignment {
    pub fn encode(&self) -> String {
        format!(
            "PRIMARY_SERVER: {}\nPORT: {}\nFILENAME: {}{}\n\n",
            self.host,
            self.port,
            self.filename,
            encode_slave_pairs(&self.slaves)
        )
    }

    pub fn decode(message: &str) -> Option<Self> {
        let mut lines = message.lines();
        let host = lines.next()?.strip_prefix("PRIMARY_SERVER: ")?.to_string();
        let port = lines.next()?.strip_prefix("PORT: ")?.parse().ok()?;
        let filename = lines.next()?.strip_prefix("FILENAME: ")?.to_string();
        let slaves = decode_slave_pairs(lines)?;
        Some(Self {
            host,
            port,
            filename,
            slaves,
        })
    }
}

/// Response to `GET_SLAVES`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlaveList {
    pub slaves: Vec<(String, u16)>,
}

impl SlaveList {
    pub fn encode(&self) -> String {
        format!("SLAVES: {}\n\n", encode_slave_pairs(&self.slaves))
    }

    pub fn decode(message: &str) -> Option<Self> {
        let mut lines = message.lines();
        let first = lines.next()?;
        if !first.starts_with("SLAVES: ") {
            return None;
        }
        let slaves = decode_slave_pairs(lines)?;
        Some(Self { slaves })
    }
}

fn encode_slave_pairs(slaves: &[(String, u16)]) -> String {
    let mut out = String::new();
    for (host, port) in slaves {
        out.push_str(&format!("\nSLAVE_SERVER: {}\nPORT: {}", host, port));
    }
    out
}

fn decode_slave_pairs<'a, I>(mut lines: I) -> Option<Vec<(String, u16)>>
where
    I: Iterator<Item = &'a str>,
{
    let mut slaves = Vec::new();
    while let Some(line) = lines.next() {
        if line.is_empty() {
            break;
        }
        let host = line.strip_prefix("SLAVE_SERVER: ")?.to_string();
        let port = lines.next()?.strip_prefix("PORT: ")?.parse().ok()?;
        slaves.push((host, port));
    }
    Some(slaves)
}

/// Derives the stored filename for a logical path: lowercase hex SHA-256 of
/// the full path, keeping the original extension.
///
/// Hashing the full path, not the base name, is what lets two files called
/// `readme.txt` in different directories coexist on the same node.
pub fn content_name(full_path: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(full_path.as_bytes());
    let digest = format!("{:x}", hasher.finalize());

    match full_path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => {
            format!("{}.{}", digest, ext)
        }
        _ => digest,
    }
}

/// Splits a full path into its parent directory and file name.
pub fn split_path(full_path: &str) -> (&str, &str) {
    match full_path.rsplit_once('/') {
        Some((parent, file)) => (parent, file),
        None => ("", full_path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_server_roundtrip() {
        let request = DirectoryRequest::GetServer {
            path: "/docs/readme.txt".to_string(),
        };
        assert_eq!(
            request.encode(),
            "GET_SERVER: \nFILENAME: /docs/readme.txt\n\n"
        );
        assert_eq!(DirectoryRequest::decode(&request.encode()), Some(request));
    }

    #[test]
    fn test_get_slaves_roundtrip() {
        let request = DirectoryRequest::GetSlaves {
            host: "10.0.0.7".to_string(),
            port: 8001,
        };
        assert_eq!(request.encode(), "GET_SLAVES: 10.0.0.7\nPORT: 8001\n\n");
        assert_eq!(DirectoryRequest::decode(&request.encode()), Some(request));
    }

    #[test]
    fn test_primary_assignment_wire_format() {
        let assignment = PrimaryAssignment {
            host: "s1".to_string(),
            port: 8001,
            filename: "abc.txt".to_string(),
            slaves: vec![("s2".to_string(), 8002), ("s3".to_string(), 8003)],
        };
        assert_eq!(
            assignment.encode(),
            "PRIMARY_SERVER: s1\nPORT: 8001\nFILENAME: abc.txt\n\
             SLAVE_SERVER: s2\nPORT: 8002\nSLAVE_SERVER: s3\nPORT: 8003\n\n"
        );
        assert_eq!(
            PrimaryAssignment::decode(&assignment.encode()),
            Some(assignment)
        );
    }

    #[test]
    fn test_empty_slave_list() {
        let list = SlaveList { slaves: vec![] };
        assert_eq!(list.encode(), "SLAVES: \n\n");
        assert_eq!(SlaveList::decode(&list.encode()), Some(list));
    }

    #[test]
    fn test_content_name_is_deterministic_and_path_sensitive() {
        let a = content_name("/docs/readme.txt");
        let b = content_name("/docs/readme.txt");
        let c = content_name("/notes/readme.txt");

        assert_eq!(a, b);
        assert_ne!(a, c, "same base name in different dirs must differ");
        assert!(a.ends_with(".txt"));
        assert_eq!(a.len(), 64 + 4);
    }

    #[test]
    fn test_content_name_without_extension() {
        let name = content_name("/bin/data");
        assert_eq!(name.len(), 64);
        assert!(!name.contains('.'));
    }
}
