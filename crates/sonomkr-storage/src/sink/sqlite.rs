// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SQLite sink.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE data (
//!     datetime INTEGER,   -- epoch milliseconds
//!     "12.5Hz" REAL,
//!     "16Hz" REAL
//! );
//! ```
//!
//! No connection is held between records: each insert opens the database,
//! runs one transaction and closes it again. Callers that need throughput
//! should batch records themselves.

use super::{FileSink, SinkError, SinkFormat};
use crate::record::Record;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;

/// Name of the table holding the records.
pub const TABLE_NAME: &str = "data";

/// SQLite sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteSink;

impl SqliteSink {
    pub fn new() -> Self {
        Self
    }

    /// `CREATE TABLE` statement for the given column labels.
    pub fn create_table_sql(labels: &[String]) -> String {
        let mut columns = vec!["datetime INTEGER".to_string()];
        columns.extend(labels.iter().map(|label| format!("{} REAL", quote_ident(label))));
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            TABLE_NAME,
            columns.join(", ")
        )
    }

    /// `INSERT` statement for a row of `value_count` band values.
    pub fn insert_sql(value_count: usize) -> String {
        let placeholders = vec!["?"; value_count + 1].join(", ");
        format!("INSERT INTO {} VALUES ({})", TABLE_NAME, placeholders)
    }
}

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl FileSink for SqliteSink {
    fn format(&self) -> SinkFormat {
        SinkFormat::Sqlite
    }

    fn open(&self, prefix: &Path, labels: &[String]) -> Result<(), SinkError> {
        let conn = Connection::open(prefix)?;
        conn.execute(&Self::create_table_sql(labels), [])?;
        Ok(())
    }

    fn append(&self, prefix: &Path, record: &Record) -> Result<(), SinkError> {
        let mut values = Vec::with_capacity(record.bands.len() + 1);
        values.push(Value::Integer(record.epoch_millis()));
        values.extend(record.bands.iter().map(|band| Value::Real(band.value)));

        let mut conn = Connection::open(prefix)?;
        let tx = conn.transaction()?;
        tx.execute(
            &Self::insert_sql(record.bands.len()),
            params_from_iter(values.iter()),
        )?;
        tx.commit()?;
        Ok(())
    }
}
