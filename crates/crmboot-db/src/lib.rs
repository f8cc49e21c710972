//! crmboot-db — database readiness probing.
//!
//! The orchestrator must not start initializing the application before its
//! database accepts authenticated queries, so the waiter speaks just
//! enough of the MySQL client/server protocol to log in and run
//! `SELECT 1`: read the v10 greeting, answer with a Protocol::41 handshake
//! response (native or caching-sha2 scramble), issue one `COM_QUERY`, and
//! hang up with `COM_QUIT`.
//!
//! A TCP accept alone is not a useful readiness signal — MariaDB accepts
//! connections while still replaying logs — which is why the probe goes
//! all the way to an authenticated query.
//!
//! Retry policy lives in [`waiter`]: bounded attempts with doubling,
//! capped inter-attempt delay.

pub mod auth;
pub mod waiter;
pub mod wire;

pub use waiter::{RetryPolicy, probe, wait_for_database, wait_with};

use crmboot_settings::DbSettings;

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol: {0}")]
    Protocol(String),

    #[error("server error {code}: {message}")]
    Server { code: u16, message: String },

    #[error("attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("database not reachable after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;

// ── Endpoint ─────────────────────────────────────────────────────────

/// Target database endpoint, used only for connectivity probing.
#[derive(Debug, Clone)]
pub struct DbEndpoint {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    /// Empty string means no password.
    pub password: String,
}

impl DbEndpoint {
    /// `host:port` form for socket connects and diagnostics.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&DbSettings> for DbEndpoint {
    fn from(db: &DbSettings) -> Self {
        Self {
            host: db.host.clone(),
            port: db.port,
            database: db.name.clone(),
            user: db.user.clone(),
            password: db.password.clone(),
        }
    }
}
