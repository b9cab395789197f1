use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use super::catalog::{FileCatalog, FileRecord};
use crate::fileserver::service::{download_from, FileServer};

#[derive(Debug, Clone)]
pub struct ReplicatorConfig {
    /// Maximum sleep after a cycle that did nothing.
    pub idle_timeout: Duration,
    /// Sleep after a cycle that replicated something.
    pub interval: Duration,
    /// Disk-space budget for this node's bucket, in bytes.
    pub space_budget: u64,
}

impl Default for ReplicatorConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            interval: Duration::from_secs(1),
            space_budget: 1 << 30,
        }
    }
}

/// Background rebalancer for one node.
pub struct Replicator {
    fs: Arc<FileServer>,
    catalog: Arc<dyn FileCatalog>,
    config: ReplicatorConfig,
    shutdown: watch::Receiver<bool>,
}

impl Replicator {
    pub fn new(
        fs: Arc<FileServer>,
        catalog: Arc<dyn FileCatalog>,
        config: ReplicatorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            fs,
            catalog,
            config,
            shutdown,
        })
    }

    /// Runs cycles until the shutdown flag is raised. No cycle failure is
    /// fatal: errors are logged and count as "did nothing".
    pub async fn run(self: Arc<Self>) {
        tracing::info!("Replicator started for {}", self.fs.node_address());

        while !self.shutting_down() {
            let did_something = match self.replicate_next_file().await {
                Ok(did_something) => did_something,
                Err(e) => {
                    tracing::error!("When replicating: {}", e);
                    false
                }
            };

            if did_something {
                tokio::time::sleep(self.config.interval).await;
            } else {
                self.idle_sleep().await;
            }
        }

        tracing::info!("Replicator stopped for {}", self.fs.node_address());
    }

    /// One replication cycle. Returns whether a file was fetched.
    pub async fn replicate_next_file(&self) -> Result<bool> {
        let host = self.fs.node_address();

        let Some(record) = self.catalog.select_file_to_replicate(&host) else {
            return Ok(false);
        };
        tracing::debug!("Next file for {}: {:?}", host, record);

        // Make room, least important resident files first.
        while self.free_disk() < record.size {
            let candidates = self.catalog.files_by_descending_kn(&host);
            let Some(candidate) = candidates.first() else {
                // Nothing left to delete.
                return Ok(false);
            };

            let candidate_kn = self
                .catalog
                .kn_of(candidate)
                .ok_or_else(|| anyhow::anyhow!("File {} missing from catalog", candidate))?;

            // Never evict something as important as the incoming file.
            if candidate_kn < record.kn + 1 {
                tracing::debug!(
                    "No evictable file for {} (best candidate {} has kn={})",
                    record.file,
                    candidate,
                    candidate_kn
                );
                return Ok(false);
            }

            tracing::debug!("Deleting file {} because it has kn={}", candidate, candidate_kn);
            self.fs.delete_local(candidate).await?;
            self.catalog.drop_replica(candidate, &host);
        }

        self.download(&record, &host).await?;
        Ok(true)
    }

    /// Fetches the file from the first donor that answers.
    async fn download(&self, record: &FileRecord, host: &str) -> Result<()> {
        let mut last_error = anyhow::anyhow!("File {} has no donor nodes", record.file);

        for donor in &record.nodes {
            let Some((donor_host, donor_port)) = parse_node_address(donor) else {
                tracing::warn!("Skipping donor with bad address: {:?}", donor);
                continue;
            };

            match download_from(&donor_host, donor_port, &record.file).await {
                Ok(data) => {
                    self.fs.write_local(&record.file, &data).await?;
                    self.catalog.record_replica(&record.file, host);
                    tracing::info!(
                        "Replicated {} ({} bytes) from {}",
                        record.file,
                        data.len(),
                        donor
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Donor {} failed for {}: {}", donor, record.file, e);
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Budgeted free space: configured budget minus resident bytes.
    fn free_disk(&self) -> u64 {
        self.config
            .space_budget
            .saturating_sub(self.fs.resident_bytes())
    }

    fn shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Sleeps up to the idle timeout in one-second slices so shutdown is
    /// honoured promptly.
    async fn idle_sleep(&self) {
        let slice = Duration::from_secs(1).min(self.config.idle_timeout);
        let mut slept = Duration::ZERO;

        while slept < self.config.idle_timeout && !self.shutting_down() {
            tokio::time::sleep(slice).await;
            slept += slice;
        }
    }
}

fn parse_node_address(node: &str) -> Option<(String, u16)> {
    let (host, port) = node.rsplit_once(':')?;
    Some((host.to_string(), port.parse().ok()?))
}
