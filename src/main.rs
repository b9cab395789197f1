use distfs::directory::handlers::admin_router;
use distfs::directory::service::DirectoryService;
use distfs::directory::store::DirectoryStore;
use distfs::fileserver::service::{FileServer, FileServerConfig};
use distfs::locking::service::LockService;
use distfs::net::server::{PooledServer, ServerConfig};
use distfs::replicator::catalog::MemoryCatalog;
use distfs::replicator::service::{Replicator, ReplicatorConfig};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

fn usage(program: &str) -> ! {
    eprintln!("Usage: {} --role <lock|directory|file> --bind <addr:port> [options]", program);
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --node-id <id>        Identifier reported in HELO responses (default 0)");
    eprintln!();
    eprintln!("Directory options:");
    eprintln!("  --db <path>           Sqlite database file (default directory.db)");
    eprintln!("  --admin <addr:port>   Serve the administrative HTTP API here");
    eprintln!();
    eprintln!("File options:");
    eprintln!("  --dir <host:port>     Directory service wire address (required)");
    eprintln!("  --bucket <path>       Bucket root directory (default buckets)");
    eprintln!("  --advertise <host>    Host to advertise to the directory (default 127.0.0.1)");
    eprintln!("  --budget <bytes>      Replication disk budget (default 1 GiB)");
    eprintln!("  --admin-url <url>     Self-register against this admin API on startup");
    eprintln!();
    eprintln!("Example: {} --role directory --bind 127.0.0.1:8000 --admin 127.0.0.1:8080", program);
    eprintln!("Example: {} --role file --bind 127.0.0.1:8001 --dir 127.0.0.1:8000", program);
    std::process::exit(1);
}

fn parse_host_port(value: &str) -> anyhow::Result<(String, u16)> {
    let (host, port) = value
        .rsplit_once(':')
        .ok_or_else(|| anyhow::anyhow!("Expected host:port, got {:?}", value))?;
    Ok((host.to_string(), port.parse()?))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        usage(&args[0]);
    }

    let mut role: Option<String> = None;
    let mut bind_addr: Option<SocketAddr> = None;
    let mut node_id = "0".to_string();
    let mut db_path = PathBuf::from("directory.db");
    let mut admin_addr: Option<SocketAddr> = None;
    let mut directory: Option<(String, u16)> = None;
    let mut bucket_root = PathBuf::from("buckets");
    let mut advertised_host = "127.0.0.1".to_string();
    let mut space_budget: u64 = 1 << 30;
    let mut admin_url: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--role" => {
                role = Some(args[i + 1].clone());
                i += 2;
            }
            "--bind" => {
                bind_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--node-id" => {
                node_id = args[i + 1].clone();
                i += 2;
            }
            "--db" => {
                db_path = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--admin" => {
                admin_addr = Some(args[i + 1].parse()?);
                i += 2;
            }
            "--dir" => {
                directory = Some(parse_host_port(&args[i + 1])?);
                i += 2;
            }
            "--bucket" => {
                bucket_root = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            "--advertise" => {
                advertised_host = args[i + 1].clone();
                i += 2;
            }
            "--budget" => {
                space_budget = args[i + 1].parse()?;
                i += 2;
            }
            "--admin-url" => {
                admin_url = Some(args[i + 1].clone());
                i += 2;
            }
            _ => usage(&args[0]),
        }
    }

    let Some(role) = role else { usage(&args[0]) };
    let Some(bind_addr) = bind_addr else { usage(&args[0]) };

    match role.as_str() {
        "lock" => {
            let service = LockService::bind(bind_addr).await?;
            tracing::info!("Lock service listening on {}", service.local_addr());
            service.serve().await?;
        }
        "directory" => {
            let store = Arc::new(DirectoryStore::open(&db_path)?);
            tracing::info!("Directory database at {}", db_path.display());

            if let Some(admin_addr) = admin_addr {
                let app = admin_router(store.clone());
                let listener = tokio::net::TcpListener::bind(admin_addr).await?;
                tracing::info!("Admin API listening on {}", admin_addr);
                tokio::spawn(async move {
                    if let Err(e) = axum::serve(listener, app).await {
                        tracing::error!("Admin API stopped: {}", e);
                    }
                });
            }

            let service = DirectoryService::new(store);
            let config = ServerConfig {
                node_id,
                ..ServerConfig::default()
            };
            let server = PooledServer::bind(bind_addr, config, service.handler()).await?;
            tracing::info!("Directory service listening on {}", server.local_addr());
            server.serve().await?;
        }
        "file" => {
            let Some(directory) = directory else {
                eprintln!("--dir is required for the file role");
                usage(&args[0]);
            };

            let fs = FileServer::new(FileServerConfig {
                bucket_root,
                advertised_host,
                port: bind_addr.port(),
                directory,
                fanout_attempts: 1,
            })
            .await?;
            tracing::info!("Bucket at {}", fs.bucket().display());

            if let Some(admin_url) = admin_url {
                fs.register_with_directory(&admin_url).await?;
            }

            let (_shutdown_tx, shutdown_rx) = watch::channel(false);
            let replicator = Replicator::new(
                fs.clone(),
                Arc::new(MemoryCatalog::new()),
                ReplicatorConfig {
                    idle_timeout: Duration::from_secs(60),
                    interval: Duration::from_secs(1),
                    space_budget,
                },
                shutdown_rx,
            );
            tokio::spawn(replicator.run());

            let config = ServerConfig {
                node_id,
                ..ServerConfig::default()
            };
            let server = PooledServer::bind(bind_addr, config, fs.handler()).await?;
            tracing::info!("File server listening on {}", server.local_addr());
            server.serve().await?;
        }
        other => {
            eprintln!("Unknown role {:?}", other);
            usage(&args[0]);
        }
    }

    Ok(())
}
