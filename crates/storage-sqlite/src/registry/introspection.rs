//! Catalog and freshness queries, for both the local replica and the remote.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use diesel::prelude::*;
use diesel::sql_types::{Nullable, Text};
use diesel::sqlite::SqliteConnection;
use serde::Serialize;

use wcmkt_core::errors::DatabaseError;
use wcmkt_core::sync::UPDATE_LOG_TABLE;
use wcmkt_core::{DatabaseAlias, Error, Result};
use wcmkt_remote::{QueryResult, RemoteStore};

use crate::errors::{remote_error, StorageError};

const TABLE_LIST_SQL: &str = "PRAGMA table_list";

/// One row of `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

/// Result of `describe_table`: bare names, or full descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TableColumns {
    Names(Vec<String>),
    Detailed(Vec<ColumnInfo>),
}

impl TableColumns {
    fn from_columns(columns: Vec<ColumnInfo>, detailed: bool) -> Self {
        if detailed {
            TableColumns::Detailed(columns)
        } else {
            TableColumns::Names(columns.into_iter().map(|c| c.name).collect())
        }
    }

    pub fn names(&self) -> Vec<&str> {
        match self {
            TableColumns::Names(names) => names.iter().map(String::as_str).collect(),
            TableColumns::Detailed(columns) => columns.iter().map(|c| c.name.as_str()).collect(),
        }
    }
}

fn escape_sqlite_str(value: &str) -> String {
    value.replace('\'', "''")
}

fn is_internal_table(name: &str) -> bool {
    name.contains("sqlite")
}

fn table_info_sql(table: &str) -> String {
    format!("PRAGMA table_info('{}')", escape_sqlite_str(table))
}

fn update_log_sql(table: &str) -> String {
    format!(
        "SELECT CAST(timestamp AS TEXT) AS value FROM {} WHERE table_name = '{}' \
         ORDER BY timestamp DESC LIMIT 1",
        UPDATE_LOG_TABLE,
        escape_sqlite_str(table)
    )
}

/// Parses the timestamp shapes found in replica tables. Naive values are UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

// ─────────────────────────────────────────────────────────────────────────────
// Local (rusqlite for the catalog, diesel for data)
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn list_tables_local(conn: &rusqlite::Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(TABLE_LIST_SQL).map_err(StorageError::from)?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>("name"))
        .map_err(StorageError::from)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StorageError::from)?;
    Ok(names.into_iter().filter(|name| !is_internal_table(name)).collect())
}

pub(crate) fn describe_table_local(
    conn: &rusqlite::Connection,
    table: &str,
    detailed: bool,
) -> Result<TableColumns> {
    let mut stmt = conn.prepare(&table_info_sql(table)).map_err(StorageError::from)?;
    let columns = stmt
        .query_map([], |row| {
            Ok(ColumnInfo {
                cid: row.get("cid")?,
                name: row.get("name")?,
                column_type: row.get("type")?,
                not_null: row.get::<_, i64>("notnull")? != 0,
                default_value: row.get("dflt_value")?,
                primary_key: row.get::<_, i64>("pk")? != 0,
            })
        })
        .map_err(StorageError::from)?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(StorageError::from)?;
    Ok(TableColumns::from_columns(columns, detailed))
}

#[derive(QueryableByName)]
struct ScalarTextRow {
    #[diesel(sql_type = Nullable<Text>)]
    value: Option<String>,
}

/// First `value` cell of a scalar query, `None` on no rows or NULL.
pub(crate) fn scalar_text_local(conn: &mut SqliteConnection, sql: &str) -> Result<Option<String>> {
    let row = diesel::sql_query(sql)
        .get_result::<ScalarTextRow>(conn)
        .optional()
        .map_err(StorageError::from)?;
    Ok(row.and_then(|r| r.value))
}

pub(crate) fn most_recent_update_local(
    conn: &mut SqliteConnection,
    table: &str,
) -> Result<Option<DateTime<Utc>>> {
    let raw = scalar_text_local(conn, &update_log_sql(table))?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

// ─────────────────────────────────────────────────────────────────────────────
// Remote
// ─────────────────────────────────────────────────────────────────────────────

fn remote_query(alias: DatabaseAlias, remote: &dyn RemoteStore, sql: &str) -> Result<QueryResult> {
    remote.execute(sql).map_err(|e| remote_error(alias, e))
}

fn shape_error(err: wcmkt_remote::RemoteError) -> Error {
    Error::Database(DatabaseError::UnexpectedShape(err.to_string()))
}

pub(crate) fn list_tables_remote(alias: DatabaseAlias, remote: &dyn RemoteStore) -> Result<Vec<String>> {
    let result = remote_query(alias, remote, TABLE_LIST_SQL)?;
    let mut names = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        if let Some(name) = result.get(row, "name").map_err(shape_error)?.as_text() {
            if !is_internal_table(&name) {
                names.push(name);
            }
        }
    }
    Ok(names)
}

pub(crate) fn describe_table_remote(
    alias: DatabaseAlias,
    remote: &dyn RemoteStore,
    table: &str,
    detailed: bool,
) -> Result<TableColumns> {
    let result = remote_query(alias, remote, &table_info_sql(table))?;
    let mut columns = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let cell = |name: &str| result.get(row, name).map_err(shape_error);
        columns.push(ColumnInfo {
            cid: cell("cid")?.as_i64().unwrap_or_default(),
            name: cell("name")?.as_text().unwrap_or_default(),
            column_type: cell("type")?.as_text().unwrap_or_default(),
            not_null: cell("notnull")?.as_i64().unwrap_or_default() != 0,
            default_value: cell("dflt_value")?.as_text(),
            primary_key: cell("pk")?.as_i64().unwrap_or_default() != 0,
        });
    }
    Ok(TableColumns::from_columns(columns, detailed))
}

pub(crate) fn scalar_text_remote(
    alias: DatabaseAlias,
    remote: &dyn RemoteStore,
    sql: &str,
) -> Result<Option<String>> {
    Ok(remote_query(alias, remote, sql)?.scalar_text())
}

pub(crate) fn most_recent_update_remote(
    alias: DatabaseAlias,
    remote: &dyn RemoteStore,
    table: &str,
) -> Result<Option<DateTime<Utc>>> {
    let raw = scalar_text_remote(alias, remote, &update_log_sql(table))?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE marketstats (
                type_id INTEGER PRIMARY KEY,
                price REAL NOT NULL DEFAULT 0,
                last_update TEXT
             );
             CREATE TABLE doctrines (id INTEGER PRIMARY KEY, fit_name TEXT);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn lists_user_tables_only() {
        let conn = seeded();
        let tables = list_tables_local(&conn).unwrap();
        assert!(tables.contains(&"marketstats".to_string()));
        assert!(tables.contains(&"doctrines".to_string()));
        assert!(tables.iter().all(|t| !t.contains("sqlite")));
    }

    #[test]
    fn describes_columns_in_both_shapes() {
        let conn = seeded();
        let names = describe_table_local(&conn, "marketstats", false).unwrap();
        assert_eq!(names, TableColumns::Names(vec![
            "type_id".to_string(),
            "price".to_string(),
            "last_update".to_string(),
        ]));

        let detailed = describe_table_local(&conn, "marketstats", true).unwrap();
        let TableColumns::Detailed(columns) = detailed else {
            panic!("expected detailed columns");
        };
        assert_eq!(columns[0].cid, 0);
        assert!(columns[0].primary_key);
        assert_eq!(columns[1].column_type, "REAL");
        assert!(columns[1].not_null);
        assert_eq!(columns[1].default_value.as_deref(), Some("0"));
        assert!(!columns[2].not_null);
    }

    #[test]
    fn escapes_table_names() {
        assert_eq!(table_info_sql("o'brien"), "PRAGMA table_info('o''brien')");
        assert!(update_log_sql("x'y").contains("table_name = 'x''y'"));
    }

    #[test]
    fn parses_common_timestamp_shapes() {
        let expected = Utc.with_ymd_and_hms(2025, 7, 4, 10, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2025-07-04 10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-07-04 10:30:00.000000"), Some(expected));
        assert_eq!(parse_timestamp("2025-07-04T10:30:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-07-04T10:30:00+00:00"), Some(expected));
        assert_eq!(parse_timestamp("not a time"), None);
    }
}
