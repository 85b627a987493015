//! SQLite-backed state store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode};

use crate::circuit::{CircuitSnapshot, CircuitState};

use super::{
    Channel, ChannelFilter, ChannelStats, Item, ItemCandidate, ItemFilter, ItemStatus, NewChannel,
    NewReceipt, NotificationReceipt, ResetSummary, StateStore, StoreError, Watermark,
};

const CHANNEL_COLUMNS: &str = "id, name, poll_interval_secs, endpoint_id, active, \
    watermark_published_at, watermark_item_id, last_check, circuit_state, consecutive_failures, \
    circuit_opened_at, circuit_cooldown_secs, circuit_reopen_count, last_error, \
    deactivated_reason, created_at, updated_at";

const ITEM_COLUMNS: &str = "channel_id, id, title, description, url, published_at, thumbnail_url, \
    summary, status, failure_reason, discovered_at, summarized_at, notified_at, failed_at";

const RECEIPT_COLUMNS: &str =
    "id, channel_id, item_id, endpoint_id, sent_at, provider_message_id, chunks_sent, success, error";

/// SQLite-backed state store.
pub struct SqliteStateStore {
    conn: Mutex<Connection>,
}

impl SqliteStateStore {
    /// Open (or create) the database file and its tables.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                poll_interval_secs INTEGER NOT NULL,
                endpoint_id TEXT NOT NULL,
                active INTEGER NOT NULL DEFAULT 1,
                watermark_published_at TEXT,
                watermark_item_id TEXT,
                last_check TEXT,
                circuit_state TEXT NOT NULL DEFAULT 'closed',
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                circuit_opened_at TEXT,
                circuit_cooldown_secs INTEGER NOT NULL DEFAULT 0,
                circuit_reopen_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                deactivated_reason TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS items (
                channel_id TEXT NOT NULL REFERENCES channels(id),
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                url TEXT NOT NULL,
                published_at TEXT NOT NULL,
                thumbnail_url TEXT,
                summary TEXT,
                status TEXT NOT NULL,
                failure_reason TEXT,
                discovered_at TEXT NOT NULL,
                summarized_at TEXT,
                notified_at TEXT,
                failed_at TEXT,
                PRIMARY KEY (channel_id, id)
            );

            CREATE INDEX IF NOT EXISTS idx_items_position ON items(channel_id, published_at, id);
            CREATE INDEX IF NOT EXISTS idx_items_status ON items(status);

            CREATE TABLE IF NOT EXISTS receipts (
                id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                endpoint_id TEXT NOT NULL,
                sent_at TEXT NOT NULL,
                provider_message_id TEXT,
                chunks_sent INTEGER NOT NULL DEFAULT 0,
                success INTEGER NOT NULL,
                error TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_receipts_item ON receipts(channel_id, item_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_receipts_delivered
                ON receipts(channel_id, item_id, endpoint_id) WHERE success = 1;
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn build_item_where(filter: &ItemFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = Vec::new();
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref channel_id) = filter.channel_id {
            conditions.push("channel_id = ?".to_string());
            params.push(Box::new(channel_id.clone()));
        }

        if !filter.statuses.is_empty() {
            let placeholders = vec!["?"; filter.statuses.len()].join(", ");
            conditions.push(format!("status IN ({})", placeholders));
            for status in &filter.statuses {
                params.push(Box::new(status.as_str()));
            }
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    fn row_to_channel(row: &rusqlite::Row) -> rusqlite::Result<Channel> {
        let watermark_at: Option<String> = row.get(5)?;
        let watermark_id: Option<String> = row.get(6)?;
        let watermark = match (watermark_at, watermark_id) {
            (Some(at), Some(id)) => Some(Watermark::new(parse_ts(5, &at)?, id)),
            _ => None,
        };

        let state_str: String = row.get(8)?;
        let state = CircuitState::parse(&state_str).ok_or_else(|| {
            conversion_error(8, format!("unknown circuit state: {}", state_str))
        })?;

        Ok(Channel {
            id: row.get(0)?,
            name: row.get(1)?,
            poll_interval_secs: row.get::<_, i64>(2)? as u64,
            endpoint_id: row.get(3)?,
            active: row.get(4)?,
            watermark,
            last_check: parse_opt_ts(7, row.get(7)?)?,
            circuit: CircuitSnapshot {
                state,
                consecutive_failures: row.get(9)?,
                opened_at: parse_opt_ts(10, row.get(10)?)?,
                cooldown_secs: row.get::<_, i64>(11)? as u64,
                reopen_count: row.get(12)?,
            },
            last_error: row.get(13)?,
            deactivated_reason: row.get(14)?,
            created_at: parse_ts(15, &row.get::<_, String>(15)?)?,
            updated_at: parse_ts(16, &row.get::<_, String>(16)?)?,
        })
    }

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        let status_str: String = row.get(8)?;
        let status = ItemStatus::parse(&status_str)
            .ok_or_else(|| conversion_error(8, format!("unknown item status: {}", status_str)))?;

        Ok(Item {
            channel_id: row.get(0)?,
            id: row.get(1)?,
            title: row.get(2)?,
            description: row.get(3)?,
            url: row.get(4)?,
            published_at: parse_ts(5, &row.get::<_, String>(5)?)?,
            thumbnail_url: row.get(6)?,
            summary: row.get(7)?,
            status,
            failure_reason: row.get(9)?,
            discovered_at: parse_ts(10, &row.get::<_, String>(10)?)?,
            summarized_at: parse_opt_ts(11, row.get(11)?)?,
            notified_at: parse_opt_ts(12, row.get(12)?)?,
            failed_at: parse_opt_ts(13, row.get(13)?)?,
        })
    }

    fn row_to_receipt(row: &rusqlite::Row) -> rusqlite::Result<NotificationReceipt> {
        Ok(NotificationReceipt {
            id: row.get(0)?,
            channel_id: row.get(1)?,
            item_id: row.get(2)?,
            endpoint_id: row.get(3)?,
            sent_at: parse_ts(4, &row.get::<_, String>(4)?)?,
            provider_message_id: row.get(5)?,
            chunks_sent: row.get(6)?,
            success: row.get(7)?,
            error: row.get(8)?,
        })
    }
}

fn db_err(e: rusqlite::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

/// Fixed-width RFC 3339 so that text order matches time order.
fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_ts(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_opt_ts(idx: usize, value: Option<String>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    value.map(|v| parse_ts(idx, &v)).transpose()
}

fn fetch_channel(conn: &Connection, id: &str) -> Result<Option<Channel>, StoreError> {
    let sql = format!("SELECT {} FROM channels WHERE id = ?", CHANNEL_COLUMNS);
    match conn.query_row(&sql, params![id], SqliteStateStore::row_to_channel) {
        Ok(channel) => Ok(Some(channel)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

fn require_channel(conn: &Connection, id: &str) -> Result<Channel, StoreError> {
    fetch_channel(conn, id)?.ok_or_else(|| StoreError::ChannelNotFound(id.to_string()))
}

fn fetch_item(conn: &Connection, channel_id: &str, item_id: &str) -> Result<Option<Item>, StoreError> {
    let sql = format!(
        "SELECT {} FROM items WHERE channel_id = ? AND id = ?",
        ITEM_COLUMNS
    );
    match conn.query_row(&sql, params![channel_id, item_id], SqliteStateStore::row_to_item) {
        Ok(item) => Ok(Some(item)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(db_err(e)),
    }
}

fn require_item(conn: &Connection, channel_id: &str, item_id: &str) -> Result<Item, StoreError> {
    fetch_item(conn, channel_id, item_id)?.ok_or_else(|| StoreError::ItemNotFound {
        channel_id: channel_id.to_string(),
        item_id: item_id.to_string(),
    })
}

/// Fail with `ChannelNotFound` when an UPDATE matched no rows.
fn expect_updated(rows: usize, id: &str) -> Result<(), StoreError> {
    if rows == 0 {
        Err(StoreError::ChannelNotFound(id.to_string()))
    } else {
        Ok(())
    }
}

impl StateStore for SqliteStateStore {
    fn add_channel(&self, channel: NewChannel) -> Result<Channel, StoreError> {
        let conn = self.lock()?;
        let now = fmt_ts(&Utc::now());

        conn.execute(
            r#"
            INSERT INTO channels (id, name, poll_interval_secs, endpoint_id, active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5, ?5)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                poll_interval_secs = excluded.poll_interval_secs,
                endpoint_id = excluded.endpoint_id,
                active = 1,
                deactivated_reason = NULL,
                circuit_state = 'closed',
                consecutive_failures = 0,
                circuit_opened_at = NULL,
                circuit_cooldown_secs = 0,
                circuit_reopen_count = 0,
                last_error = NULL,
                updated_at = excluded.updated_at
            "#,
            params![
                channel.id,
                channel.name,
                channel.poll_interval_secs as i64,
                channel.endpoint_id,
                now,
            ],
        )
        .map_err(db_err)?;

        require_channel(&conn, &channel.id)
    }

    fn get_channel(&self, id: &str) -> Result<Option<Channel>, StoreError> {
        let conn = self.lock()?;
        fetch_channel(&conn, id)
    }

    fn list_channels(&self, filter: &ChannelFilter) -> Result<Vec<Channel>, StoreError> {
        let conn = self.lock()?;

        let (where_clause, active) = match filter.active {
            Some(active) => ("WHERE active = ?", Some(active)),
            None => ("", None),
        };
        let sql = format!(
            "SELECT {} FROM channels {} ORDER BY created_at ASC, id ASC",
            CHANNEL_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = match active {
            Some(active) => stmt.query_map(params![active], Self::row_to_channel),
            None => stmt.query_map([], Self::row_to_channel),
        }
        .map_err(db_err)?;

        let mut channels = Vec::new();
        for row_result in rows {
            channels.push(row_result.map_err(db_err)?);
        }

        Ok(channels)
    }

    fn deactivate_channel(&self, id: &str, reason: Option<&str>) -> Result<Channel, StoreError> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                "UPDATE channels SET active = 0, deactivated_reason = ?, updated_at = ? WHERE id = ?",
                params![reason, fmt_ts(&Utc::now()), id],
            )
            .map_err(db_err)?;
        expect_updated(rows, id)?;

        require_channel(&conn, id)
    }

    fn set_poll_interval(&self, id: &str, interval_secs: u64) -> Result<Channel, StoreError> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                "UPDATE channels SET poll_interval_secs = ?, updated_at = ? WHERE id = ?",
                params![interval_secs as i64, fmt_ts(&Utc::now()), id],
            )
            .map_err(db_err)?;
        expect_updated(rows, id)?;

        require_channel(&conn, id)
    }

    fn record_check(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                "UPDATE channels SET last_check = ?1, updated_at = ?1 WHERE id = ?2",
                params![fmt_ts(&at), id],
            )
            .map_err(db_err)?;
        expect_updated(rows, id)
    }

    fn save_circuit(
        &self,
        id: &str,
        circuit: &CircuitSnapshot,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;

        let rows = conn
            .execute(
                r#"
                UPDATE channels SET
                    circuit_state = ?,
                    consecutive_failures = ?,
                    circuit_opened_at = ?,
                    circuit_cooldown_secs = ?,
                    circuit_reopen_count = ?,
                    last_error = ?,
                    updated_at = ?
                WHERE id = ?
                "#,
                params![
                    circuit.state.as_str(),
                    circuit.consecutive_failures,
                    circuit.opened_at.as_ref().map(fmt_ts),
                    circuit.cooldown_secs as i64,
                    circuit.reopen_count,
                    last_error,
                    fmt_ts(&Utc::now()),
                    id,
                ],
            )
            .map_err(db_err)?;
        expect_updated(rows, id)
    }

    fn upsert_item(&self, candidate: &ItemCandidate) -> Result<Item, StoreError> {
        let conn = self.lock()?;

        if fetch_channel(&conn, &candidate.channel_id)?.is_none() {
            return Err(StoreError::ChannelNotFound(candidate.channel_id.clone()));
        }

        conn.execute(
            r#"
            INSERT OR IGNORE INTO items
                (channel_id, id, title, description, url, published_at, thumbnail_url, status, discovered_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                candidate.channel_id,
                candidate.id,
                candidate.title,
                candidate.description,
                candidate.url,
                fmt_ts(&candidate.published_at),
                candidate.thumbnail_url,
                ItemStatus::Discovered.as_str(),
                fmt_ts(&Utc::now()),
            ],
        )
        .map_err(db_err)?;

        require_item(&conn, &candidate.channel_id, &candidate.id)
    }

    fn get_item(&self, channel_id: &str, item_id: &str) -> Result<Option<Item>, StoreError> {
        let conn = self.lock()?;
        fetch_item(&conn, channel_id, item_id)
    }

    fn list_items(&self, filter: &ItemFilter) -> Result<Vec<Item>, StoreError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_item_where(filter);
        let sql = format!(
            "SELECT {} FROM items {} ORDER BY published_at ASC, id ASC LIMIT ? OFFSET ?",
            ITEM_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare(&sql).map_err(db_err)?;

        let mut all_params = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));
        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), Self::row_to_item)
            .map_err(db_err)?;

        let mut items = Vec::new();
        for row_result in rows {
            items.push(row_result.map_err(db_err)?);
        }

        Ok(items)
    }

    fn count_items(&self, filter: &ItemFilter) -> Result<i64, StoreError> {
        let conn = self.lock()?;

        let (where_clause, params) = Self::build_item_where(filter);
        let sql = format!("SELECT COUNT(*) FROM items {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn set_item_summary(
        &self,
        channel_id: &str,
        item_id: &str,
        summary: &str,
    ) -> Result<Item, StoreError> {
        let conn = self.lock()?;

        let current = require_item(&conn, channel_id, item_id)?;
        if !current.status.can_transition_to(ItemStatus::Summarized) {
            return Err(StoreError::InvalidTransition {
                item_id: item_id.to_string(),
                from: current.status,
                to: ItemStatus::Summarized,
            });
        }

        conn.execute(
            r#"
            UPDATE items SET summary = ?, status = ?, failure_reason = NULL, summarized_at = ?
            WHERE channel_id = ? AND id = ?
            "#,
            params![
                summary,
                ItemStatus::Summarized.as_str(),
                fmt_ts(&Utc::now()),
                channel_id,
                item_id,
            ],
        )
        .map_err(db_err)?;

        require_item(&conn, channel_id, item_id)
    }

    fn record_summary_failure(
        &self,
        channel_id: &str,
        item_id: &str,
        reason: &str,
    ) -> Result<Item, StoreError> {
        let conn = self.lock()?;

        let current = require_item(&conn, channel_id, item_id)?;
        if current.status.is_terminal() {
            return Err(StoreError::InvalidTransition {
                item_id: item_id.to_string(),
                from: current.status,
                to: ItemStatus::Failed,
            });
        }

        conn.execute(
            "UPDATE items SET failure_reason = ? WHERE channel_id = ? AND id = ?",
            params![reason, channel_id, item_id],
        )
        .map_err(db_err)?;

        require_item(&conn, channel_id, item_id)
    }

    fn find_successful_receipt(
        &self,
        channel_id: &str,
        item_id: &str,
        endpoint_id: &str,
    ) -> Result<Option<NotificationReceipt>, StoreError> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {} FROM receipts WHERE channel_id = ? AND item_id = ? AND endpoint_id = ? AND success = 1",
            RECEIPT_COLUMNS
        );
        match conn.query_row(
            &sql,
            params![channel_id, item_id, endpoint_id],
            Self::row_to_receipt,
        ) {
            Ok(receipt) => Ok(Some(receipt)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(db_err(e)),
        }
    }

    fn record_receipt(&self, receipt: NewReceipt) -> Result<NotificationReceipt, StoreError> {
        let conn = self.lock()?;

        let stored = NotificationReceipt {
            id: uuid::Uuid::new_v4().to_string(),
            channel_id: receipt.channel_id,
            item_id: receipt.item_id,
            endpoint_id: receipt.endpoint_id,
            sent_at: Utc::now(),
            provider_message_id: receipt.provider_message_id,
            chunks_sent: receipt.chunks_sent,
            success: receipt.success,
            error: receipt.error,
        };

        let result = conn.execute(
            &format!(
                "INSERT INTO receipts ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                RECEIPT_COLUMNS
            ),
            params![
                stored.id,
                stored.channel_id,
                stored.item_id,
                stored.endpoint_id,
                fmt_ts(&stored.sent_at),
                stored.provider_message_id,
                stored.chunks_sent,
                stored.success,
                stored.error,
            ],
        );

        match result {
            Ok(_) => Ok(stored),
            Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
                Err(StoreError::DuplicateReceipt {
                    item_id: stored.item_id,
                    endpoint_id: stored.endpoint_id,
                })
            }
            Err(e) => Err(db_err(e)),
        }
    }

    fn list_receipts(
        &self,
        channel_id: &str,
        item_id: &str,
    ) -> Result<Vec<NotificationReceipt>, StoreError> {
        let conn = self.lock()?;

        let sql = format!(
            "SELECT {} FROM receipts WHERE channel_id = ? AND item_id = ? ORDER BY sent_at ASC, rowid ASC",
            RECEIPT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt
            .query_map(params![channel_id, item_id], Self::row_to_receipt)
            .map_err(db_err)?;

        let mut receipts = Vec::new();
        for row_result in rows {
            receipts.push(row_result.map_err(db_err)?);
        }

        Ok(receipts)
    }

    fn commit_item(
        &self,
        channel_id: &str,
        item_id: &str,
        status: ItemStatus,
        reason: Option<&str>,
    ) -> Result<Channel, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let item = require_item(&tx, channel_id, item_id)?;
        if !status.is_terminal() || !item.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                item_id: item_id.to_string(),
                from: item.status,
                to: status,
            });
        }

        let stamp_column = match status {
            ItemStatus::Notified => "notified_at",
            _ => "failed_at",
        };
        let now = Utc::now();
        tx.execute(
            &format!(
                "UPDATE items SET status = ?, failure_reason = COALESCE(?, failure_reason), {} = ? WHERE channel_id = ? AND id = ?",
                stamp_column
            ),
            params![status.as_str(), reason, fmt_ts(&now), channel_id, item_id],
        )
        .map_err(db_err)?;

        let channel = require_channel(&tx, channel_id)?;
        let position = item.position();
        if channel.is_after_watermark(&position) {
            tx.execute(
                "UPDATE channels SET watermark_published_at = ?, watermark_item_id = ?, updated_at = ? WHERE id = ?",
                params![
                    fmt_ts(&position.published_at),
                    position.item_id,
                    fmt_ts(&now),
                    channel_id,
                ],
            )
            .map_err(db_err)?;
        }

        tx.commit().map_err(db_err)?;

        require_channel(&conn, channel_id)
    }

    fn reset_history(
        &self,
        channel_id: &str,
        keep_receipts: bool,
    ) -> Result<ResetSummary, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        require_channel(&tx, channel_id)?;

        let items_deleted = tx
            .execute("DELETE FROM items WHERE channel_id = ?", params![channel_id])
            .map_err(db_err)?;

        let receipts_deleted = if keep_receipts {
            0
        } else {
            tx.execute("DELETE FROM receipts WHERE channel_id = ?", params![channel_id])
                .map_err(db_err)?
        };

        tx.execute(
            r#"
            UPDATE channels SET
                watermark_published_at = NULL,
                watermark_item_id = NULL,
                last_check = NULL,
                updated_at = ?
            WHERE id = ?
            "#,
            params![fmt_ts(&Utc::now()), channel_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;

        Ok(ResetSummary {
            items_deleted,
            receipts_deleted,
        })
    }

    fn channel_stats(&self, channel_id: &str) -> Result<ChannelStats, StoreError> {
        let conn = self.lock()?;

        require_channel(&conn, channel_id)?;

        let mut stats = ChannelStats::default();

        let mut stmt = conn
            .prepare("SELECT status, COUNT(*) FROM items WHERE channel_id = ? GROUP BY status")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![channel_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?;
        for row_result in rows {
            let (status, count) = row_result.map_err(db_err)?;
            stats.total_items += count;
            match ItemStatus::parse(&status) {
                Some(ItemStatus::Discovered) => stats.discovered = count,
                Some(ItemStatus::Summarized) => stats.summarized = count,
                Some(ItemStatus::Notified) => stats.notified = count,
                Some(ItemStatus::Failed) => stats.failed = count,
                None => {}
            }
        }

        let mut stmt = conn
            .prepare("SELECT success, COUNT(*) FROM receipts WHERE channel_id = ? GROUP BY success")
            .map_err(db_err)?;
        let rows = stmt
            .query_map(params![channel_id], |row| {
                Ok((row.get::<_, bool>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(db_err)?;
        for row_result in rows {
            let (success, count) = row_result.map_err(db_err)?;
            if success {
                stats.receipts_delivered = count;
            } else {
                stats.receipts_failed = count;
            }
        }

        let last_notified: Option<String> = conn
            .query_row(
                "SELECT MAX(notified_at) FROM items WHERE channel_id = ?",
                params![channel_id],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        stats.last_notified_at = parse_opt_ts(0, last_notified).map_err(db_err)?;

        Ok(stats)
    }

    fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM channels", [], |row| row.get::<_, i64>(0))
            .map_err(db_err)?;
        Ok(())
    }
}
