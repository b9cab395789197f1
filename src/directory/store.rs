use anyhow::Result;
use rand::seq::SliceRandom;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// A registered storage node.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServerRecord {
    pub id: i64,
    pub host: String,
    pub port: u16,
}

/// Relational backing for directory and server state.
///
/// The connection is shared behind a mutex; every operation is a single
/// read-then-write unit and contention is expected to be low.
pub struct DirectoryStore {
    conn: Mutex<Connection>,
}

impl DirectoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS Servers(
                 Id INTEGER PRIMARY KEY,
                 Host TEXT NOT NULL,
                 Port INTEGER NOT NULL
             );
             CREATE UNIQUE INDEX IF NOT EXISTS ServerAddr ON Servers(Host, Port);
             CREATE TABLE IF NOT EXISTS Directories(
                 Id INTEGER PRIMARY KEY,
                 Path TEXT NOT NULL,
                 Server INTEGER NOT NULL REFERENCES Servers(Id)
             );
             CREATE UNIQUE INDEX IF NOT EXISTS DirPath ON Directories(Path);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Registers a storage node. Fails on a duplicate `(host, port)`.
    pub fn add_server(&self, host: &str, port: u16) -> Result<i64> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO Servers (Host, Port) VALUES (?1, ?2)",
            params![host, port],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Decommissions a node and its directory bindings. Returns whether the
    /// node existed.
    pub fn remove_server(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute("DELETE FROM Directories WHERE Server = ?1", params![id])?;
        let removed = conn.execute("DELETE FROM Servers WHERE Id = ?1", params![id])?;
        Ok(removed > 0)
    }

    pub fn list_servers(&self) -> Result<Vec<ServerRecord>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT Id, Host, Port FROM Servers ORDER BY Id")?;
        let rows = stmt.query_map([], |row| {
            Ok(ServerRecord {
                id: row.get(0)?,
                host: row.get(1)?,
                port: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Resolves a directory path to its primary server's address.
    pub fn find_host(&self, path: &str) -> Result<Option<(String, u16)>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let host = conn
            .query_row(
                "SELECT s.Host, s.Port FROM Directories d
                 JOIN Servers s ON s.Id = d.Server
                 WHERE d.Path = ?1",
                params![path],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(host)
    }

    /// Picks a registered server pseudo-randomly, or `None` when the
    /// registry is empty.
    pub fn pick_random_host(&self) -> Result<Option<i64>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare("SELECT Id FROM Servers")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, i64>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids.choose(&mut rand::thread_rng()).copied())
    }

    /// Binds a directory path to a server.
    pub fn create_dir(&self, path: &str, server_id: i64) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute(
            "INSERT INTO Directories (Path, Server) VALUES (?1, ?2)",
            params![path, server_id],
        )?;
        Ok(())
    }

    pub fn remove_dir(&self, path: &str) -> Result<()> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        conn.execute("DELETE FROM Directories WHERE Path = ?1", params![path])?;
        Ok(())
    }

    /// Every registered server except the given one; these are the replica
    /// targets for a node's fan-out.
    pub fn slaves_excluding(&self, host: &str, port: u16) -> Result<Vec<(String, u16)>> {
        let conn = self.conn.lock().expect("store mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT Host, Port FROM Servers
             WHERE NOT (Host = ?1 AND Port = ?2)
             ORDER BY Id",
        )?;
        let rows = stmt.query_map(params![host, port], |row| {
            Ok((row.get(0)?, row.get(1)?))
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}
