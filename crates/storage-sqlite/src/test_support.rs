//! Fixtures shared by the registry and sync tests: replica files in a temp
//! dir and a "remote" that is just another SQLite file.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use rusqlite::types::ValueRef;
use tempfile::TempDir;

use wcmkt_core::{AliasConfig, DatabaseAlias, DatabaseConfigTable, Dialect, Error, Result};
use wcmkt_remote::{QueryResult, RemoteError, RemoteStore, RemoteValue};

use crate::registry::{ConnectionRegistry, RemoteConnector};
use crate::sync::{ReplicaRefresher, SyncSession};

pub(crate) const MARKET_SCHEMA: &str = "
    CREATE TABLE marketstats (
        type_id INTEGER PRIMARY KEY AUTOINCREMENT,
        price REAL NOT NULL DEFAULT 0,
        last_update TEXT
    );
    CREATE TABLE doctrines (id INTEGER PRIMARY KEY, fit_name TEXT);
    CREATE TABLE updatelog (table_name TEXT NOT NULL, timestamp TEXT NOT NULL);
";

pub(crate) struct Fixture {
    _dir: TempDir,
    pub connector: Arc<FileConnector>,
    pub registry: Arc<ConnectionRegistry>,
}

impl Fixture {
    /// Remote databases exist for every alias; no local replica does yet.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let entries: Vec<AliasConfig> = DatabaseAlias::ALL
            .iter()
            .map(|alias| AliasConfig {
                alias: *alias,
                local_path: dir.path().join(alias.default_path()),
                remote_url: format!("https://{}.example.test", alias.as_str()),
                auth_token: "test-token".to_string(),
                dialect: Dialect::default(),
            })
            .collect();
        let config = DatabaseConfigTable::new(entries).unwrap();

        let mut remotes = HashMap::new();
        for alias in DatabaseAlias::ALL {
            let path = dir.path().join(format!("remote-{}.db", alias.as_str()));
            let conn = rusqlite::Connection::open(&path).unwrap();
            conn.execute_batch(MARKET_SCHEMA).unwrap();
            remotes.insert(alias, path);
        }

        let connector = Arc::new(FileConnector {
            remotes,
            connects: AtomicUsize::new(0),
            held: Mutex::new(HashMap::new()),
        });
        let registry = Arc::new(ConnectionRegistry::with_remote_connector(
            config,
            connector.clone(),
        ));
        Self {
            _dir: dir,
            connector,
            registry,
        }
    }

    /// Same as [`new`](Self::new) with every replica already copied.
    pub fn with_replicas() -> Self {
        let fixture = Self::new();
        for alias in DatabaseAlias::ALL {
            std::fs::copy(fixture.remote_path(alias), fixture.local_path(alias)).unwrap();
        }
        fixture
    }

    pub fn local_path(&self, alias: DatabaseAlias) -> PathBuf {
        self.registry.config(alias).local_path.clone()
    }

    pub fn remote_path(&self, alias: DatabaseAlias) -> PathBuf {
        self.connector.remotes[&alias].clone()
    }

    pub fn execute_remote(&self, alias: DatabaseAlias, sql: &str) {
        let conn = rusqlite::Connection::open(self.remote_path(alias)).unwrap();
        conn.execute_batch(sql).unwrap();
    }

    pub fn execute_local(&self, alias: DatabaseAlias, sql: &str) {
        let conn = rusqlite::Connection::open(self.local_path(alias)).unwrap();
        conn.execute_batch(sql).unwrap();
    }
}

/// Hands out a [`FileRemote`] per alias.
pub(crate) struct FileConnector {
    remotes: HashMap<DatabaseAlias, PathBuf>,
    pub connects: AtomicUsize,
    held: Mutex<HashMap<DatabaseAlias, mpsc::Receiver<()>>>,
}

impl FileConnector {
    /// The next connect for `alias` blocks until the returned sender fires
    /// or is dropped.
    pub fn hold(&self, alias: DatabaseAlias) -> mpsc::Sender<()> {
        let (tx, rx) = mpsc::channel();
        self.held.lock().unwrap().insert(alias, rx);
        tx
    }
}

impl RemoteConnector for FileConnector {
    fn connect(&self, config: &AliasConfig) -> wcmkt_remote::Result<Arc<dyn RemoteStore>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let gate = self.held.lock().unwrap().remove(&config.alias);
        if let Some(gate) = gate {
            let _ = gate.recv();
        }
        let path = self
            .remotes
            .get(&config.alias)
            .cloned()
            .ok_or_else(|| RemoteError::invalid_request("no remote for alias"))?;
        Ok(Arc::new(FileRemote { path }))
    }
}

/// Answers statements from a SQLite file, opened per call.
pub(crate) struct FileRemote {
    path: PathBuf,
}

impl RemoteStore for FileRemote {
    fn execute(&self, sql: &str) -> wcmkt_remote::Result<QueryResult> {
        run_query(&self.path, sql).map_err(|e| RemoteError::Statement {
            code: None,
            message: e.to_string(),
        })
    }
}

fn run_query(path: &Path, sql: &str) -> rusqlite::Result<QueryResult> {
    let conn = rusqlite::Connection::open(path)?;
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
    let width = columns.len();
    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(width);
        for idx in 0..width {
            values.push(match row.get_ref(idx)? {
                ValueRef::Null | ValueRef::Blob(_) => RemoteValue::Null,
                ValueRef::Integer(v) => RemoteValue::Integer(v),
                ValueRef::Real(v) => RemoteValue::Float(v),
                ValueRef::Text(v) => RemoteValue::Text(String::from_utf8_lossy(v).into_owned()),
            });
        }
        rows.push(values);
    }
    Ok(QueryResult { columns, rows })
}

/// Refreshes by copying the remote file over the replica.
#[derive(Default)]
pub(crate) struct CopyRefresher {
    remotes: HashMap<DatabaseAlias, PathBuf>,
    failing: HashSet<DatabaseAlias>,
    delay: Option<Duration>,
    remote_update: Option<String>,
    pub calls: Mutex<Vec<DatabaseAlias>>,
    pub completed: AtomicUsize,
}

impl CopyRefresher {
    pub fn new(fixture: &Fixture) -> Self {
        Self {
            remotes: DatabaseAlias::ALL
                .iter()
                .map(|alias| (*alias, fixture.remote_path(*alias)))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing(mut self, alias: DatabaseAlias) -> Self {
        self.failing.insert(alias);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Runs `sql` against the remote right after copying it, so the replica
    /// is already behind when validation runs.
    pub fn with_remote_update(mut self, sql: &str) -> Self {
        self.remote_update = Some(sql.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl ReplicaRefresher for CopyRefresher {
    fn refresh(&self, session: &SyncSession) -> Result<()> {
        self.calls.lock().unwrap().push(session.alias());
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.failing.contains(&session.alias()) {
            return Err(Error::sync("remote unreachable"));
        }
        let remote = &self.remotes[&session.alias()];
        let tmp = session.local_path().with_extension("incoming");
        std::fs::copy(remote, &tmp)?;
        std::fs::rename(&tmp, session.local_path())?;
        if let Some(sql) = &self.remote_update {
            rusqlite::Connection::open(remote)
                .and_then(|conn| conn.execute_batch(sql))
                .map_err(|e| Error::sync(e.to_string()))?;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
