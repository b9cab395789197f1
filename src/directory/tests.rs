//! Directory Module Tests
//!
//! Store tests run against in-memory sqlite; service tests run the full wire
//! protocol over the shared transport on an ephemeral port; the admin API is
//! exercised through a real axum server with reqwest.

#[cfg(test)]
mod tests {
    use crate::directory::handlers::{admin_router, RegisterServerRequest, RegisterServerResponse};
    use crate::directory::protocol::{DirectoryRequest, PrimaryAssignment, SlaveList};
    use crate::directory::service::DirectoryService;
    use crate::directory::store::DirectoryStore;
    use crate::net::client::send_request;
    use crate::net::server::{PooledServer, ServerConfig};
    use std::net::SocketAddr;
    use std::sync::Arc;

    fn seeded_store() -> Arc<DirectoryStore> {
        let store = DirectoryStore::open_in_memory().unwrap();
        store.add_server("s1", 8001).unwrap();
        store.add_server("s2", 8002).unwrap();
        Arc::new(store)
    }

    async fn spawn_service(store: Arc<DirectoryStore>) -> SocketAddr {
        let service = DirectoryService::new(store);
        let config = ServerConfig {
            exit_on_kill: false,
            ..ServerConfig::default()
        };
        let server = PooledServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            config,
            service.handler(),
        )
        .await
        .unwrap();
        let addr = server.local_addr();
        tokio::spawn(async move {
            server.serve().await.unwrap();
        });
        addr
    }

    // ============================================================
    // STORE TESTS
    // ============================================================

    #[test]
    fn test_duplicate_server_registration_fails() {
        let store = DirectoryStore::open_in_memory().unwrap();
        store.add_server("s1", 8001).unwrap();
        assert!(store.add_server("s1", 8001).is_err());
        // Same host on another port is a different node.
        store.add_server("s1", 8002).unwrap();
    }

    #[test]
    fn test_directory_binding_is_unique_per_path() {
        let store = seeded_store();
        store.create_dir("/docs", 1).unwrap();
        assert!(store.create_dir("/docs", 2).is_err());
        assert_eq!(store.find_host("/docs").unwrap(), Some(("s1".into(), 8001)));
    }

    #[test]
    fn test_slaves_excluding_omits_the_asker() {
        let store = seeded_store();
        let slaves = store.slaves_excluding("s1", 8001).unwrap();
        assert_eq!(slaves, vec![("s2".to_string(), 8002)]);

        // An unregistered asker gets everyone.
        let slaves = store.slaves_excluding("elsewhere", 9).unwrap();
        assert_eq!(slaves.len(), 2);
    }

    #[test]
    fn test_pick_random_host_on_empty_registry() {
        let store = DirectoryStore::open_in_memory().unwrap();
        assert_eq!(store.pick_random_host().unwrap(), None);
    }

    #[test]
    fn test_remove_server_drops_its_directories() {
        let store = seeded_store();
        store.create_dir("/docs", 1).unwrap();
        assert!(store.remove_server(1).unwrap());
        assert_eq!(store.find_host("/docs").unwrap(), None);
        assert!(!store.remove_server(1).unwrap());
    }

    // ============================================================
    // WIRE SERVICE TESTS
    // ============================================================

    async fn get_server(addr: SocketAddr, path: &str) -> PrimaryAssignment {
        let request = DirectoryRequest::GetServer {
            path: path.to_string(),
        };
        let response = send_request(&addr.ip().to_string(), addr.port(), &request.encode())
            .await
            .unwrap();
        PrimaryAssignment::decode(&response).expect("undecodable GET_SERVER response")
    }

    #[tokio::test]
    async fn test_get_server_binds_and_memoizes_the_parent() {
        let addr = spawn_service(seeded_store()).await;

        let first = get_server(addr, "/docs/readme.txt").await;
        assert!(first.host == "s1" || first.host == "s2");

        // Same parent directory resolves to the same primary, no
        // re-randomization once bound.
        let second = get_server(addr, "/docs/notes.txt").await;
        assert_eq!(second.host, first.host);
        assert_eq!(second.port, first.port);

        // The other registered server is handed out as the replica target.
        assert_eq!(first.slaves.len(), 1);
        assert_ne!(first.slaves[0].0, first.host);
    }

    #[tokio::test]
    async fn test_concurrent_first_lookups_all_resolve_to_one_primary() {
        let addr = spawn_service(seeded_store()).await;

        // Every racer may miss find_host and try to bind the parent itself;
        // the losers must still answer with the winner's binding.
        let mut handles = Vec::new();
        for i in 0..8 {
            handles.push(tokio::spawn(async move {
                get_server(addr, &format!("/shared/file{}.txt", i)).await
            }));
        }

        let mut primaries = Vec::new();
        for handle in handles {
            let assignment = handle.await.unwrap();
            primaries.push((assignment.host, assignment.port));
        }
        primaries.dedup();
        assert_eq!(primaries.len(), 1, "one binding must win: {:?}", primaries);
    }

    #[tokio::test]
    async fn test_get_server_filenames_are_content_addressed() {
        let addr = spawn_service(seeded_store()).await;

        let docs = get_server(addr, "/docs/readme.txt").await;
        let same = get_server(addr, "/docs/readme.txt").await;
        let notes = get_server(addr, "/notes/readme.txt").await;

        assert_eq!(docs.filename, same.filename);
        assert_ne!(docs.filename, notes.filename);
        assert!(docs.filename.ends_with(".txt"));
    }

    #[tokio::test]
    async fn test_get_slaves_over_the_wire() {
        let addr = spawn_service(seeded_store()).await;

        let request = DirectoryRequest::GetSlaves {
            host: "s2".to_string(),
            port: 8002,
        };
        let response = send_request(&addr.ip().to_string(), addr.port(), &request.encode())
            .await
            .unwrap();
        let list = SlaveList::decode(&response).unwrap();
        assert_eq!(list.slaves, vec![("s1".to_string(), 8001)]);
    }

    #[tokio::test]
    async fn test_get_server_with_empty_registry_is_invalid() {
        let addr = spawn_service(Arc::new(DirectoryStore::open_in_memory().unwrap())).await;

        let request = DirectoryRequest::GetServer {
            path: "/docs/readme.txt".to_string(),
        };
        let response = send_request(&addr.ip().to_string(), addr.port(), &request.encode())
            .await
            .unwrap();
        assert_eq!(response, "ERROR: INVALID MESSAGE\n\n");
    }

    #[tokio::test]
    async fn test_persistence_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("directory.db");

        {
            let store = DirectoryStore::open(&db_path).unwrap();
            let id = store.add_server("s1", 8001).unwrap();
            store.create_dir("/docs", id).unwrap();
        }

        let store = DirectoryStore::open(&db_path).unwrap();
        assert_eq!(store.find_host("/docs").unwrap(), Some(("s1".into(), 8001)));
    }

    // ============================================================
    // ADMIN API TESTS
    // ============================================================

    #[tokio::test]
    async fn test_admin_register_list_remove() {
        let store = Arc::new(DirectoryStore::open_in_memory().unwrap());
        let app = admin_router(store.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::new();
        let base = format!("http://{}", addr);

        let response = client
            .post(format!("{}/servers", base))
            .json(&RegisterServerRequest {
                host: "s1".to_string(),
                port: 8001,
            })
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        let body: RegisterServerResponse = response.json().await.unwrap();
        let id = body.id.unwrap();

        // Duplicate registration is a conflict, not a crash.
        let response = client
            .post(format!("{}/servers", base))
            .json(&RegisterServerRequest {
                host: "s1".to_string(),
                port: 8001,
            })
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::CONFLICT);

        let listed: Vec<crate::directory::store::ServerRecord> = client
            .get(format!("{}/servers", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].host, "s1");

        let response = client
            .delete(format!("{}/servers/{}", base, id))
            .send()
            .await
            .unwrap();
        assert!(response.status().is_success());
        assert!(store.list_servers().unwrap().is_empty());
    }
}
