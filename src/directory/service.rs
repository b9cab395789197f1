use std::sync::Arc;

use super::protocol::{
    content_name, split_path, DirectoryRequest, PrimaryAssignment, SlaveList,
};
use super::store::DirectoryStore;
use crate::net::server::MessageHandlerFn;

/// Wire-protocol front of the directory store.
///
/// Every request round-trips to storage; the dataset is small and
/// write-light, so no cache sits in front of it.
pub struct DirectoryService {
    store: Arc<DirectoryStore>,
}

impl DirectoryService {
    pub fn new(store: Arc<DirectoryStore>) -> Arc<Self> {
        Arc::new(Self { store })
    }

    /// Message handler to mount on the shared transport.
    pub fn handler(self: &Arc<Self>) -> MessageHandlerFn {
        let service = self.clone();
        crate::net::server::handler_fn(move |message: String, _peer| {
            let service = service.clone();
            async move {
                match DirectoryRequest::decode(&message)? {
                    DirectoryRequest::GetServer { path } => service.get_server(&path),
                    DirectoryRequest::GetSlaves { host, port } => {
                        service.get_slaves(&host, port)
                    }
                }
            }
        })
    }

    /// Resolves (binding lazily if needed) the primary for a file path and
    /// returns it along with the replica targets.
    fn get_server(&self, path: &str) -> Option<String> {
        let (parent, _file) = split_path(path);
        let filename = content_name(path);

        let primary = match self.resolve_or_bind(parent) {
            Ok(Some(primary)) => primary,
            Ok(None) => {
                tracing::warn!("GET_SERVER for {} with no registered servers", path);
                return None;
            }
            Err(e) => {
                tracing::error!("GET_SERVER for {} failed: {}", path, e);
                return None;
            }
        };

        let slaves = match self.store.slaves_excluding(&primary.0, primary.1) {
            Ok(slaves) => slaves,
            Err(e) => {
                tracing::error!("Slave lookup for {} failed: {}", path, e);
                return None;
            }
        };

        let assignment = PrimaryAssignment {
            host: primary.0,
            port: primary.1,
            filename,
            slaves,
        };
        tracing::debug!(
            "Resolved {} -> {}:{}",
            path,
            assignment.host,
            assignment.port
        );
        Some(assignment.encode())
    }

    fn get_slaves(&self, host: &str, port: u16) -> Option<String> {
        match self.store.slaves_excluding(host, port) {
            Ok(slaves) => Some(SlaveList { slaves }.encode()),
            Err(e) => {
                tracing::error!("GET_SLAVES for {}:{} failed: {}", host, port, e);
                None
            }
        }
    }

    /// Looks the directory up; on a miss, binds it to a pseudo-random
    /// registered server and looks it up again.
    fn resolve_or_bind(&self, parent: &str) -> anyhow::Result<Option<(String, u16)>> {
        if let Some(primary) = self.store.find_host(parent)? {
            return Ok(Some(primary));
        }

        let Some(server_id) = self.store.pick_random_host()? else {
            return Ok(None);
        };
        if let Err(e) = self.store.create_dir(parent, server_id) {
            // A concurrent first lookup for the same parent can win the
            // insert; the unique Path index then rejects ours. Their binding
            // is as good as the one we lost.
            if let Some(primary) = self.store.find_host(parent)? {
                tracing::debug!("Directory {:?} was bound concurrently", parent);
                return Ok(Some(primary));
            }
            return Err(e);
        }
        tracing::info!("Bound directory {:?} to server {}", parent, server_id);

        self.store.find_host(parent)
    }
}
