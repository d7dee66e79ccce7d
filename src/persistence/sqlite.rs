//! SQLite persistence backend using `rusqlite`.
//!
//! Each record is stored as a JSON body next to the few columns used for
//! filtering and ordering. Timestamps are microseconds since the epoch.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{FillFilter, SignalFilter, SignalStore};
use crate::execution::{FillRecord, SymbolExecutionProfile};
use crate::performance::{SignalOutcome, StrategyPerformance};
use crate::signal::Signal;
use crate::utils::error::{Error, Result};
use crate::utils::types::TradingStyle;

/// Thread-safe SQLite wrapper shared across async tasks.
#[derive(Clone)]
pub struct SqliteSignalStore {
    conn: Arc<Mutex<Connection>>, // used from spawn_blocking only
}

impl SqliteSignalStore {
    /// Open (or create) the DB file, defaulting to the user data dir.
    pub async fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            | Some(p) => p,
            | None => {
                let mut p = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
                p.push("signal_desk");
                std::fs::create_dir_all(&p)?;
                p.push("signals.db");
                p
            }
        };
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection> {
            let conn = Connection::open(path)?;
            init_schema(&conn)?;
            Ok(conn)
        })
        .await??;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Throwaway database, mostly for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn)?;
            f(&guard)
        })
        .await?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|_| Error::StorageError("sqlite connection mutex poisoned".to_string()))
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         CREATE TABLE IF NOT EXISTS signals (
             id            TEXT PRIMARY KEY,
             symbol        TEXT NOT NULL,
             style         TEXT NOT NULL,
             kind          TEXT NOT NULL,
             generated_at  INTEGER NOT NULL,
             body          TEXT NOT NULL
         );
         CREATE INDEX IF NOT EXISTS signals_generated_at ON signals (generated_at);
         CREATE TABLE IF NOT EXISTS fill_records (
             id            TEXT PRIMARY KEY,
             signal_id     TEXT NOT NULL,
             user_id       TEXT NOT NULL,
             symbol        TEXT NOT NULL,
             kind          TEXT NOT NULL,
             recorded_at   INTEGER NOT NULL,
             body          TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS symbol_profiles (
             symbol        TEXT PRIMARY KEY,
             updated_at    INTEGER NOT NULL,
             body          TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS signal_outcomes (
             signal_id     TEXT PRIMARY KEY,
             style         TEXT NOT NULL,
             exit_time     INTEGER NOT NULL,
             body          TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS strategy_performance (
             id            INTEGER PRIMARY KEY AUTOINCREMENT,
             style         TEXT NOT NULL,
             period_start  INTEGER NOT NULL,
             period_end    INTEGER NOT NULL,
             created_at    INTEGER NOT NULL,
             body          TEXT NOT NULL
         );",
    )?;
    Ok(())
}

fn where_clause(conds: &[&str]) -> String {
    if conds.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conds.join(" AND "))
    }
}

fn query_bodies<T: DeserializeOwned>(conn: &Connection, sql: &str, args: Vec<SqlValue>) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params_from_iter(args), |row| row.get::<_, String>(0))?;
    let mut out = Vec::new();
    for body in rows {
        out.push(serde_json::from_str(&body?)?);
    }
    Ok(out)
}

fn style_args(style: Option<TradingStyle>) -> (Vec<&'static str>, Vec<SqlValue>) {
    match style {
        | Some(s) => (vec!["style = ?"], vec![SqlValue::Text(s.to_string())]),
        | None => (vec![], vec![]),
    }
}

#[async_trait]
impl SignalStore for SqliteSignalStore {
    async fn save_signal(&self, signal: &Signal) -> Result<()> {
        let s = signal.clone();
        let body = serde_json::to_string(&s)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO signals (id, symbol, style, kind, generated_at, body) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    s.id.to_string(),
                    s.symbol,
                    s.style.to_string(),
                    s.kind().to_string(),
                    s.generated_at.timestamp_micros(),
                    body
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_signal(&self, id: Uuid) -> Result<Option<Signal>> {
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row("SELECT body FROM signals WHERE id = ?1", params![id.to_string()], |row| row.get(0))
                .optional()?;
            Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
        })
        .await
    }

    async fn list_signals(&self, filter: &SignalFilter) -> Result<Vec<Signal>> {
        let f = filter.clone();
        self.with_conn(move |conn| {
            let (mut conds, mut args) = style_args(f.style);
            if let Some(sym) = f.symbol {
                conds.push("symbol = ?");
                args.push(SqlValue::Text(sym));
            }
            if let Some(kind) = f.kind {
                conds.push("kind = ?");
                args.push(SqlValue::Text(kind.to_string()));
            }
            if let Some(t) = f.since {
                conds.push("generated_at >= ?");
                args.push(SqlValue::Integer(t.timestamp_micros()));
            }
            if let Some(t) = f.until {
                conds.push("generated_at < ?");
                args.push(SqlValue::Integer(t.timestamp_micros()));
            }
            let mut sql = format!("SELECT body FROM signals{} ORDER BY generated_at DESC", where_clause(&conds));
            if let Some(limit) = f.limit {
                sql.push_str(&format!(" LIMIT {limit}"));
            }
            query_bodies(conn, &sql, args)
        })
        .await
    }

    async fn save_fill_result(&self, record: &FillRecord) -> Result<()> {
        let r = record.clone();
        let body = serde_json::to_string(&r)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO fill_records (id, signal_id, user_id, symbol, kind, recorded_at, body) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    r.id.to_string(),
                    r.signal_id.to_string(),
                    r.user_id,
                    r.symbol,
                    r.kind().to_string(),
                    r.recorded_at.timestamp_micros(),
                    body
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_fill_records(&self, filter: &FillFilter) -> Result<Vec<FillRecord>> {
        let f = filter.clone();
        self.with_conn(move |conn| {
            let mut conds = Vec::new();
            let mut args = Vec::new();
            if let Some(user) = f.user_id {
                conds.push("user_id = ?");
                args.push(SqlValue::Text(user));
            }
            if let Some(sym) = f.symbol {
                conds.push("symbol = ?");
                args.push(SqlValue::Text(sym));
            }
            if let Some(kind) = f.kind {
                conds.push("kind = ?");
                args.push(SqlValue::Text(kind.to_string()));
            }
            if let Some(t) = f.since {
                conds.push("recorded_at >= ?");
                args.push(SqlValue::Integer(t.timestamp_micros()));
            }
            let sql = format!("SELECT body FROM fill_records{} ORDER BY recorded_at ASC", where_clause(&conds));
            query_bodies(conn, &sql, args)
        })
        .await
    }

    async fn upsert_symbol_profile(&self, profile: &SymbolExecutionProfile) -> Result<()> {
        let p = profile.clone();
        let body = serde_json::to_string(&p)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO symbol_profiles (symbol, updated_at, body) VALUES (?1, ?2, ?3)
                 ON CONFLICT(symbol) DO UPDATE SET updated_at = excluded.updated_at, body = excluded.body",
                params![p.symbol, p.updated_at.timestamp_micros(), body],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_symbol_profile(&self, symbol: &str) -> Result<Option<SymbolExecutionProfile>> {
        let symbol = symbol.to_string();
        self.with_conn(move |conn| {
            let body: Option<String> = conn
                .query_row("SELECT body FROM symbol_profiles WHERE symbol = ?1", params![symbol], |row| row.get(0))
                .optional()?;
            Ok(body.map(|b| serde_json::from_str(&b)).transpose()?)
        })
        .await
    }

    async fn save_signal_outcome(&self, outcome: &SignalOutcome) -> Result<()> {
        let o = outcome.clone();
        let body = serde_json::to_string(&o)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO signal_outcomes (signal_id, style, exit_time, body) VALUES (?1, ?2, ?3, ?4)",
                params![o.signal_id.to_string(), o.style.to_string(), o.exit_time.timestamp_micros(), body],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_signal_outcomes(&self, style: Option<TradingStyle>) -> Result<Vec<SignalOutcome>> {
        self.with_conn(move |conn| {
            let (conds, args) = style_args(style);
            let sql = format!("SELECT body FROM signal_outcomes{} ORDER BY exit_time ASC", where_clause(&conds));
            query_bodies(conn, &sql, args)
        })
        .await
    }

    async fn save_strategy_performance(&self, perf: &StrategyPerformance) -> Result<()> {
        let p = perf.clone();
        let body = serde_json::to_string(&p)?;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO strategy_performance (style, period_start, period_end, created_at, body) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    p.style.to_string(),
                    p.period_start.timestamp_micros(),
                    p.period_end.timestamp_micros(),
                    p.created_at.timestamp_micros(),
                    body
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn list_strategy_performance(&self, style: Option<TradingStyle>) -> Result<Vec<StrategyPerformance>> {
        self.with_conn(move |conn| {
            let (conds, args) = style_args(style);
            let sql = format!(
                "SELECT body FROM strategy_performance{} ORDER BY created_at DESC, id DESC",
                where_clause(&conds)
            );
            query_bodies(conn, &sql, args)
        })
        .await
    }
}
