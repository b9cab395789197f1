use anyhow::Result;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::protocol::{
    decode_data_response, encode_data_response, FileMessage, NOT_FOUND_RESPONSE, OK_RESPONSE,
};
use crate::directory::handlers::{RegisterServerRequest, RegisterServerResponse};
use crate::directory::protocol::{DirectoryRequest, SlaveList};
use crate::net::client::send_request;
use crate::net::server::MessageHandlerFn;

#[derive(Debug, Clone)]
pub struct FileServerConfig {
    /// Buckets live under `<bucket_root>/<port>/`.
    pub bucket_root: PathBuf,
    /// Address this node advertises to the directory service.
    pub advertised_host: String,
    pub port: u16,
    /// Directory service wire address.
    pub directory: (String, u16),
    /// Push attempts per slave during fan-out. 1 means at-most-once.
    pub fanout_attempts: usize,
}

/// Per-node storage service.
pub struct FileServer {
    bucket: PathBuf,
    config: FileServerConfig,
    /// Resident files and their sizes; the replicator's eviction scan reads
    /// this instead of stat-ing the bucket.
    resident: DashMap<String, u64>,
}

impl FileServer {
    /// Creates the bucket directory and indexes whatever already resides in
    /// it from a previous run.
    pub async fn new(config: FileServerConfig) -> Result<Arc<Self>> {
        let bucket = config.bucket_root.join(config.port.to_string());
        tokio::fs::create_dir_all(&bucket).await?;

        let resident = DashMap::new();
        let mut entries = tokio::fs::read_dir(&bucket).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_file() {
                resident.insert(entry.file_name().to_string_lossy().into_owned(), meta.len());
            }
        }

        Ok(Arc::new(Self {
            bucket,
            config,
            resident,
        }))
    }

    pub fn bucket(&self) -> &PathBuf {
        &self.bucket
    }

    /// `host:port` identity of this node, as the catalog knows it.
    pub fn node_address(&self) -> String {
        format!("{}:{}", self.config.advertised_host, self.config.port)
    }

    /// Message handler to mount on the shared transport.
    pub fn handler(self: &Arc<Self>) -> MessageHandlerFn {
        let server = self.clone();
        crate::net::server::handler_fn(move |message: String, _peer| {
            let server = server.clone();
            async move {
                match FileMessage::decode(&message)? {
                    FileMessage::Upload { name, data } => server.upload(name, data).await,
                    FileMessage::Update { name, data } => server.update(name, data).await,
                    FileMessage::Download { name } => server.download(&name).await,
                }
            }
        })
    }

    /// Client write: store locally, acknowledge, fan out in the background.
    async fn upload(self: Arc<Self>, name: String, data: Vec<u8>) -> Option<String> {
        if let Err(e) = self.write_local(&name, &data).await {
            tracing::error!("Upload of {} failed: {}", name, e);
            return None;
        }

        let server = self.clone();
        tokio::spawn(async move {
            server.update_slaves(&name, &data).await;
        });

        Some(OK_RESPONSE.to_string())
    }

    /// Replica write: store locally only, no further propagation.
    async fn update(&self, name: String, data: Vec<u8>) -> Option<String> {
        match self.write_local(&name, &data).await {
            Ok(()) => Some(OK_RESPONSE.to_string()),
            Err(e) => {
                tracing::error!("Update of {} failed: {}", name, e);
                None
            }
        }
    }

    async fn download(&self, name: &str) -> Option<String> {
        match self.read_local(name).await {
            Ok(Some(data)) => Some(encode_data_response(&data)),
            Ok(None) => {
                tracing::debug!("Download of {}: not resident", name);
                Some(NOT_FOUND_RESPONSE.to_string())
            }
            Err(e) => {
                tracing::error!("Download of {} failed: {}", name, e);
                None
            }
        }
    }

    pub async fn write_local(&self, name: &str, data: &[u8]) -> Result<()> {
        tokio::fs::write(self.bucket.join(name), data).await?;
        self.resident.insert(name.to_string(), data.len() as u64);
        Ok(())
    }

    pub async fn read_local(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if !self.resident.contains_key(name) {
            return Ok(None);
        }
        Ok(Some(tokio::fs::read(self.bucket.join(name)).await?))
    }

    /// Removes a file from disk and the index. Missing files are fine; the
    /// index may be ahead of a crashed delete.
    pub async fn delete_local(&self, name: &str) -> Result<()> {
        self.resident.remove(name);
        match tokio::fs::remove_file(self.bucket.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn is_resident(&self, name: &str) -> bool {
        self.resident.contains_key(name)
    }

    /// Total bytes currently resident in the bucket.
    pub fn resident_bytes(&self) -> u64 {
        self.resident.iter().map(|entry| *entry.value()).sum()
    }

    /// Pushes an `UPDATE` to every slave of this node, best effort each.
    async fn update_slaves(&self, name: &str, data: &[u8]) {
        let slaves = match self.get_slaves().await {
            Ok(slaves) => slaves,
            Err(e) => {
                tracing::error!("Slave lookup failed, skipping fan-out of {}: {}", name, e);
                return;
            }
        };

        let update = FileMessage::Update {
            name: name.to_string(),
            data: data.to_vec(),
        }
        .encode();

        for (host, port) in slaves {
            let mut delivered = false;
            for attempt in 1..=self.config.fanout_attempts.max(1) {
                match send_request(&host, port, &update).await {
                    Ok(response) if response == OK_RESPONSE => {
                        delivered = true;
                        break;
                    }
                    Ok(response) => {
                        tracing::warn!(
                            "Replica {}:{} refused {} (attempt {}): {:?}",
                            host,
                            port,
                            name,
                            attempt,
                            response
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Push of {} to {}:{} failed (attempt {}): {}",
                            name,
                            host,
                            port,
                            attempt,
                            e
                        );
                    }
                }
            }
            if delivered {
                tracing::debug!("Pushed {} to replica {}:{}", name, host, port);
            }
        }
    }

    /// Announces this node to the directory's administrative API. Returns the
    /// assigned id, or `None` when the address was already registered.
    pub async fn register_with_directory(&self, admin_url: &str) -> Result<Option<i64>> {
        let request = RegisterServerRequest {
            host: self.config.advertised_host.clone(),
            port: self.config.port,
        };
        let response: RegisterServerResponse = reqwest::Client::new()
            .post(format!("{}/servers", admin_url.trim_end_matches('/')))
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        match response.id {
            Some(id) => tracing::info!("Registered with directory as server {}", id),
            None => tracing::info!("Already registered with directory"),
        }
        Ok(response.id)
    }

    /// Asks the directory service who this node's replica targets are.
    async fn get_slaves(&self) -> Result<Vec<(String, u16)>> {
        let request = DirectoryRequest::GetSlaves {
            host: self.config.advertised_host.clone(),
            port: self.config.port,
        };
        let response = send_request(
            &self.config.directory.0,
            self.config.directory.1,
            &request.encode(),
        )
        .await?;

        let list = SlaveList::decode(&response)
            .ok_or_else(|| anyhow::anyhow!("Undecodable GET_SLAVES response: {:?}", response))?;
        Ok(list.slaves)
    }
}

/// Fetches a file from a donor node over the wire protocol.
pub async fn download_from(host: &str, port: u16, name: &str) -> Result<Vec<u8>> {
    let request = FileMessage::Download {
        name: name.to_string(),
    };
    let response = send_request(host, port, &request.encode()).await?;

    decode_data_response(&response)
        .ok_or_else(|| anyhow::anyhow!("Download of {} from {}:{} failed: {:?}", name, host, port, response))
}
