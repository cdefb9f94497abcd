//! Replay guard: tracks consumed (payer, nonce) pairs within their validity
//! window so an authorization is settled exactly once.
//!
//! `try_claim` is the engine's only critical section. It must be atomic so
//! that two concurrent settlement attempts for the same pair race safely:
//! exactly one observes "not held" and proceeds. A multi-instance deployment
//! needs a shared, consistency-respecting backend ([`SqliteReplayGuard`] on a
//! shared volume, or an equivalent external store) - per-instance memory
//! cannot guarantee exactly-once across instances.

use std::sync::Mutex;

use dashmap::DashMap;

/// Keyed storage of replay holds with absolute unix-second expiries.
///
/// A record is *live* while `expires_at > now`; expired records count as
/// absent and are reclaimed lazily. Implementations must be thread-safe.
pub trait ReplayGuard: Send + Sync {
    /// Is a live hold present for this pair?
    fn is_held(&self, payer: &str, nonce: &str, now: u64) -> bool;

    /// Atomically claim the pair: insert a hold expiring at `expires_at`
    /// unless a live hold already exists. Returns `true` if this caller won
    /// the claim. Never implemented as read-then-write.
    fn try_claim(&self, payer: &str, nonce: &str, now: u64, expires_at: u64) -> bool;

    /// Raise a held record's expiry. Never lowers it.
    fn extend(&self, payer: &str, nonce: &str, expires_at: u64);

    /// Drop a hold after a failed settlement so a legitimate retry can proceed.
    fn release(&self, payer: &str, nonce: &str);

    /// Remove lapsed records. Returns the number purged.
    fn purge_expired(&self, now: u64) -> usize;
}

/// In-memory guard backed by DashMap. Fast, single-process, lost on restart.
#[derive(Default)]
pub struct InMemoryReplayGuard {
    records: DashMap<(String, String), u64>,
}

impl InMemoryReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReplayGuard for InMemoryReplayGuard {
    fn is_held(&self, payer: &str, nonce: &str, now: u64) -> bool {
        self.records
            .get(&(payer.to_string(), nonce.to_string()))
            .is_some_and(|expires_at| *expires_at > now)
    }

    fn try_claim(&self, payer: &str, nonce: &str, now: u64, expires_at: u64) -> bool {
        use dashmap::mapref::entry::Entry;
        // DashMap's entry API holds the shard lock, making claim-or-reject
        // atomic within the process.
        match self.records.entry((payer.to_string(), nonce.to_string())) {
            Entry::Occupied(mut occupied) => {
                if *occupied.get() > now {
                    false
                } else {
                    occupied.insert(expires_at);
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                true
            }
        }
    }

    fn extend(&self, payer: &str, nonce: &str, expires_at: u64) {
        if let Some(mut record) = self
            .records
            .get_mut(&(payer.to_string(), nonce.to_string()))
        {
            if *record < expires_at {
                *record = expires_at;
            }
        }
    }

    fn release(&self, payer: &str, nonce: &str) {
        self.records.remove(&(payer.to_string(), nonce.to_string()));
    }

    fn purge_expired(&self, now: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, expires_at| *expires_at > now);
        // Concurrent inserts can land during retain; saturate instead of
        // underflowing.
        before.saturating_sub(self.records.len())
    }
}

/// Durable guard backed by SQLite. Survives restarts; the database's
/// conflict resolution makes `try_claim` atomic across processes sharing the
/// file.
pub struct SqliteReplayGuard {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteReplayGuard {
    /// Open (or create) the replay database at `path`.
    ///
    /// On Unix the file permissions are restricted to 0600 so other system
    /// users cannot read payment timing data.
    pub fn open(path: &str) -> Result<Self, rusqlite::Error> {
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS replay_records (
                payer TEXT NOT NULL,
                nonce TEXT NOT NULL,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (payer, nonce)
            );
            CREATE INDEX IF NOT EXISTS idx_replay_expires ON replay_records(expires_at);
            PRAGMA journal_mode=WAL;",
        )?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            {
                tracing::warn!(
                    path = %path,
                    error = %e,
                    "failed to restrict replay database permissions to 0600"
                );
            }
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, rusqlite::Connection> {
        match self.conn.lock() {
            Ok(conn) => conn,
            Err(poisoned) => {
                tracing::error!("replay guard mutex poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

/// Clamp a u64 expiry into SQLite's i64 range.
fn to_sql_ts(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl ReplayGuard for SqliteReplayGuard {
    fn is_held(&self, payer: &str, nonce: &str, now: u64) -> bool {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM replay_records
                 WHERE payer = ?1 AND nonce = ?2 AND expires_at > ?3",
                rusqlite::params![payer, nonce, to_sql_ts(now)],
                |row| row.get(0),
            )
            .unwrap_or(1); // fail-secure: a database error reads as "held"
        count > 0
    }

    fn try_claim(&self, payer: &str, nonce: &str, now: u64, expires_at: u64) -> bool {
        let conn = self.lock();
        // The upsert only fires when the existing record has lapsed, so the
        // claim is a single atomic statement: exactly one concurrent caller
        // changes a row.
        conn.execute(
            "INSERT INTO replay_records (payer, nonce, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(payer, nonce) DO UPDATE SET expires_at = excluded.expires_at
             WHERE replay_records.expires_at <= ?4",
            rusqlite::params![payer, nonce, to_sql_ts(expires_at), to_sql_ts(now)],
        )
        .map(|rows| rows > 0)
        .unwrap_or(false) // fail-secure: a database error loses the claim
    }

    fn extend(&self, payer: &str, nonce: &str, expires_at: u64) {
        let conn = self.lock();
        if let Err(e) = conn.execute(
            "UPDATE replay_records SET expires_at = ?3
             WHERE payer = ?1 AND nonce = ?2 AND expires_at < ?3",
            rusqlite::params![payer, nonce, to_sql_ts(expires_at)],
        ) {
            tracing::error!(error = %e, "failed to extend replay hold - it may lapse early");
        }
    }

    fn release(&self, payer: &str, nonce: &str) {
        let conn = self.lock();
        if let Err(e) = conn.execute(
            "DELETE FROM replay_records WHERE payer = ?1 AND nonce = ?2",
            rusqlite::params![payer, nonce],
        ) {
            tracing::error!(error = %e, "failed to release replay hold - it remains until expiry");
        }
    }

    fn purge_expired(&self, now: u64) -> usize {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM replay_records WHERE expires_at <= ?1",
            rusqlite::params![to_sql_ts(now)],
        )
        .unwrap_or(0)
    }
}
