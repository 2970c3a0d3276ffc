//! Position state persistence
//!
//! SQLite-backed store for spread positions. A position's Closed transition
//! is written here before the ledger drops it from active tracking, and open
//! rows are reloaded on startup for crash recovery.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::types::{ExitReason, OptionQuote, Position, PositionId, PositionStatus};

const STATUS_OPEN: &str = "open";
const STATUS_CLOSED: &str = "closed";

#[derive(Clone)]
pub struct StateStore {
    conn: Arc<Mutex<Connection>>,
}

impl StateStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

        // WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_tables()?;
        info!("Position state store initialized: {}", db_path.display());

        Ok(store)
    }

    /// In-memory store, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS positions (
                id TEXT PRIMARY KEY,
                short_leg TEXT NOT NULL,
                long_leg TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                entry_time TEXT NOT NULL,
                credit_received REAL NOT NULL,
                profit_target_price REAL NOT NULL,
                expiry_date TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                exit_reason TEXT,
                exit_time TEXT,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP,
                updated_at TEXT DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status)",
            [],
        )?;

        debug!("Database schema created/verified");
        Ok(())
    }

    pub fn save_open(&self, pos: &Position) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "INSERT OR REPLACE INTO positions
             (id, short_leg, long_leg, quantity, entry_time, credit_received,
              profit_target_price, expiry_date, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, CURRENT_TIMESTAMP)",
            params![
                pos.id.as_str(),
                serde_json::to_string(&pos.short_leg)?,
                serde_json::to_string(&pos.long_leg)?,
                pos.quantity,
                pos.entry_time.to_rfc3339(),
                pos.credit_received,
                pos.profit_target_price,
                pos.expiry_date.to_string(),
                STATUS_OPEN,
            ],
        )?;

        debug!(
            "Position saved: {} {}x {}/{} credit={:.2}",
            pos.id, pos.quantity, pos.short_leg.strike, pos.long_leg.strike, pos.credit_received
        );
        Ok(())
    }

    /// Durably record the Open -> Closed transition.
    pub fn record_close(
        &self,
        id: &PositionId,
        reason: ExitReason,
        exit_time: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();

        let updated = conn.execute(
            "UPDATE positions
             SET status = ?1, exit_reason = ?2, exit_time = ?3, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?4",
            params![
                STATUS_CLOSED,
                reason.as_str(),
                exit_time.to_rfc3339(),
                id.as_str(),
            ],
        )?;
        anyhow::ensure!(updated == 1, "no stored position with id {}", id);

        debug!("Position close recorded: {} ({})", id, reason);
        Ok(())
    }

    /// Load all Open positions, oldest entry first.
    pub fn load_open_positions(&self) -> Result<Vec<Position>> {
        let conn = self.conn.lock().unwrap();

        let mut stmt = conn.prepare(
            "SELECT id, short_leg, long_leg, quantity, entry_time, credit_received,
                    profit_target_price, expiry_date
             FROM positions WHERE status = ?1 ORDER BY entry_time",
        )?;

        let rows = stmt
            .query_map(params![STATUS_OPEN], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, u32>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, f64>(5)?,
                    row.get::<_, f64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut positions = Vec::with_capacity(rows.len());
        for (id, short, long, quantity, entry_time, credit, target, expiry) in rows {
            let short_leg: OptionQuote =
                serde_json::from_str(&short).context("corrupt short leg in state store")?;
            let long_leg: OptionQuote =
                serde_json::from_str(&long).context("corrupt long leg in state store")?;
            positions.push(Position {
                id: PositionId::new(id),
                short_leg,
                long_leg,
                quantity,
                entry_time: entry_time
                    .parse::<DateTime<Utc>>()
                    .context("corrupt entry time in state store")?,
                credit_received: credit,
                profit_target_price: target,
                expiry_date: expiry
                    .parse::<NaiveDate>()
                    .context("corrupt expiry date in state store")?,
                status: PositionStatus::Open,
            });
        }

        debug!("Loaded {} open positions", positions.len());
        Ok(positions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_position(id: &str) -> Position {
        let expiry = NaiveDate::from_ymd_opt(2025, 9, 19).unwrap();
        Position {
            id: PositionId::new(id),
            short_leg: OptionQuote {
                strike: 4500.0,
                bid: 11.5,
                ask: 12.5,
                expiry,
            },
            long_leg: OptionQuote {
                strike: 4490.0,
                bid: 4.9,
                ask: 5.1,
                expiry,
            },
            quantity: 1,
            entry_time: Utc::now(),
            credit_received: 7.0,
            profit_target_price: 3.5,
            expiry_date: expiry,
            status: PositionStatus::Open,
        }
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = StateStore::open_in_memory().unwrap();
        let pos = sample_position("SPX_BPS_1_0");
        store.save_open(&pos).unwrap();

        let loaded = store.load_open_positions().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, pos.id);
        assert_eq!(loaded[0].short_leg, pos.short_leg);
        assert_eq!(loaded[0].credit_received, pos.credit_received);
        assert_eq!(loaded[0].expiry_date, pos.expiry_date);
    }

    #[test]
    fn test_closed_positions_not_reloaded() {
        let store = StateStore::open_in_memory().unwrap();
        let pos = sample_position("SPX_BPS_2_0");
        store.save_open(&pos).unwrap();
        store
            .record_close(&pos.id, ExitReason::ProfitTarget, Utc::now())
            .unwrap();

        assert!(store.load_open_positions().unwrap().is_empty());
    }

    #[test]
    fn test_record_close_unknown_id_errors() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.record_close(
            &PositionId::new("missing"),
            ExitReason::ExpiryApproaching,
            Utc::now(),
        );
        assert!(err.is_err());
    }
}
