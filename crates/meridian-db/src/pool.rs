//! # Database Pool Management
//!
//! Connection pool creation, the write gate, and the two ways into the
//! repositories: [`UnitOfWork`] for writes and [`ReadSession`] for reads.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  DbConfig::new(path) ← Configure pool settings                         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ├──► db.session().await  ──► ReadSession (pooled connection)     │
//! │       │                                                                 │
//! │       └──► db.begin().await    ──► UnitOfWork                          │
//! │                                     ├─ write gate (one writer)         │
//! │                                     ├─ SQLite transaction              │
//! │                                     ├─ repositories + StockLedger      │
//! │                                     └─ commit() or drop = rollback     │
//! │                                                                         │
//! │  Writers queue on the gate in arrival order. Two sales racing for the  │
//! │  last units see each other's committed ledger rows, never a stale one. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! SQLite WAL (Write-Ahead Logging) mode is enabled so readers on other
//! pooled connections don't block the single writer, and vice versa.

use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::ledger::StockLedger;
use crate::migrations;
use crate::repository::Repositories;

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/meridian/backoffice.db")
///     .max_connections(8)
///     .min_connections(1);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long to wait for a pooled connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection.
    /// Default: 10 minutes
    pub idle_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration with the given path.
    ///
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// ## Usage
    /// ```rust,ignore
    /// let db = Database::new(DbConfig::in_memory()).await?;
    /// // Each call gets its own isolated database
    /// ```
    ///
    /// The single connection must never idle out: closing it would discard
    /// the whole database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(24 * 60 * 60),
            run_migrations: true,
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle.
///
/// Cheap to clone: the pool and the write gate are shared.
///
/// ## Usage
/// ```rust,ignore
/// let mut uow = db.begin().await?;
/// let sale = uow.sales().get(&sale_id).await?;
/// uow.ledger().adjust(&key, 2, &cause).await?;
/// uow.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct Database {
    /// The SQLite connection pool.
    pool: SqlitePool,

    /// Serializes units of work so ledger reads and writes never interleave.
    write_gate: Arc<Mutex<()>>,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(
            path = %config.database_path.display(),
            "Initializing database connection"
        );

        // sqlite://path creates file if not exists
        let connect_url = format!("sqlite://{}?mode=rwc", config.database_path.display());

        let connect_options = SqliteConnectOptions::from_str(&connect_url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(Some(config.idle_timeout))
            .max_lifetime(None)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            "Database pool created"
        );

        let db = Database {
            pool,
            write_gate: Arc::new(Mutex::new(())),
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations.
    ///
    /// Idempotent: applied versions are tracked in `_sqlx_migrations`.
    pub async fn run_migrations(&self) -> DbResult<()> {
        info!("Running database migrations");
        migrations::run_migrations(&self.pool).await?;
        info!("Migrations complete");
        Ok(())
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Opens a unit of work.
    ///
    /// Waits for the write gate, then starts a transaction. Everything done
    /// through the returned handle is atomic: `commit()` publishes it, and
    /// dropping the handle (including via `?`) rolls it back.
    ///
    /// Do not hold a [`ReadSession`] while calling this on an in-memory
    /// database: the pool has a single connection.
    pub async fn begin(&self) -> DbResult<UnitOfWork> {
        let gate = Arc::clone(&self.write_gate).lock_owned().await;
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!("Unit of work started");
        Ok(UnitOfWork {
            tx,
            _gate: gate,
            now: Utc::now(),
        })
    }

    /// Borrows a pooled connection for reads.
    pub async fn session(&self) -> DbResult<ReadSession> {
        let conn = self.pool.acquire().await?;
        Ok(ReadSession { conn })
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit of Work
// =============================================================================

/// One atomic batch of writes.
///
/// ## Lifecycle
/// ```text
/// db.begin() ──► [gate held, BEGIN] ──► repos / ledger ──► commit() ──► [COMMIT, gate released]
///                                             │
///                                             └── error / drop ──► [ROLLBACK, gate released]
/// ```
pub struct UnitOfWork {
    // Field order matters: the transaction is dropped (rolled back) before
    // the gate lets the next writer in.
    tx: Transaction<'static, Sqlite>,
    _gate: OwnedMutexGuard<()>,
    now: DateTime<Utc>,
}

impl UnitOfWork {
    /// The timestamp stamped on every row this unit writes.
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// The stock ledger, bound to this unit's transaction.
    pub fn ledger(&mut self) -> StockLedger<'_> {
        StockLedger::new(&mut *self.tx, self.now)
    }

    /// Commits every write made through this unit.
    pub async fn commit(self) -> DbResult<()> {
        let UnitOfWork { tx, _gate, .. } = self;
        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!("Unit of work committed");
        Ok(())
    }

    /// Discards every write made through this unit.
    pub async fn rollback(self) -> DbResult<()> {
        let UnitOfWork { tx, _gate, .. } = self;
        tx.rollback()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        debug!("Unit of work rolled back");
        Ok(())
    }
}

impl std::fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork").field("now", &self.now).finish()
    }
}

impl Repositories for UnitOfWork {
    fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }
}

// =============================================================================
// Read Session
// =============================================================================

/// A pooled connection for queries outside any unit of work.
///
/// Only read methods are reachable from here; ledger writes require a
/// [`UnitOfWork`].
pub struct ReadSession {
    conn: PoolConnection<Sqlite>,
}

impl std::fmt::Debug for ReadSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadSession").finish()
    }
}

impl Repositories for ReadSession {
    fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
