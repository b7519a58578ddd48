//! Wire types for the pipeline endpoint and the decoded result set.

use serde::{Deserialize, Serialize};

use crate::error::{RemoteError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Request
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct PipelineRequest<'a> {
    pub requests: Vec<StreamRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamRequest<'a> {
    Execute { stmt: Statement<'a> },
    Close,
}

#[derive(Debug, Serialize)]
pub(crate) struct Statement<'a> {
    pub sql: &'a str,
    pub want_rows: bool,
}

impl<'a> PipelineRequest<'a> {
    pub fn execute(sql: &'a str) -> Self {
        Self {
            requests: vec![
                StreamRequest::Execute {
                    stmt: Statement {
                        sql,
                        want_rows: true,
                    },
                },
                StreamRequest::Close,
            ],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Response
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct PipelineResponse {
    pub results: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: StreamError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StreamResponse {
    Execute { result: ExecuteResult },
    Close,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StreamError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExecuteResult {
    pub cols: Vec<Column>,
    pub rows: Vec<Vec<WireValue>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Column {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireValue {
    Null,
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

impl PipelineResponse {
    /// Extracts the result of the single `execute` request.
    pub fn into_query_result(self) -> Result<QueryResult> {
        let first = self
            .results
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::invalid_request("Pipeline response contained no results"))?;

        match first {
            StreamResult::Error { error } => Err(RemoteError::Statement {
                code: error.code,
                message: error.message,
            }),
            StreamResult::Ok {
                response: StreamResponse::Execute { result },
            } => QueryResult::from_wire(result),
            StreamResult::Ok {
                response: StreamResponse::Close,
            } => Err(RemoteError::invalid_request(
                "Pipeline response out of order: close before execute",
            )),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Decoded values
// ─────────────────────────────────────────────────────────────────────────────

/// One decoded cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    /// Base64 payload, left encoded.
    Blob(String),
}

impl RemoteValue {
    /// Text rendering used for freshness comparison; `None` for NULL.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RemoteValue::Null => None,
            RemoteValue::Integer(v) => Some(v.to_string()),
            RemoteValue::Float(v) => Some(v.to_string()),
            RemoteValue::Text(v) => Some(v.clone()),
            RemoteValue::Blob(v) => Some(v.clone()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RemoteValue::Integer(v) => Some(*v),
            RemoteValue::Text(v) => v.parse().ok(),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, RemoteValue::Null)
    }
}

impl TryFrom<WireValue> for RemoteValue {
    type Error = RemoteError;

    fn try_from(value: WireValue) -> Result<Self> {
        Ok(match value {
            WireValue::Null => RemoteValue::Null,
            WireValue::Integer { value } => RemoteValue::Integer(value.parse().map_err(|_| {
                RemoteError::invalid_request(format!("Integer cell is not numeric: '{}'", value))
            })?),
            WireValue::Float { value } => RemoteValue::Float(value),
            WireValue::Text { value } => RemoteValue::Text(value),
            WireValue::Blob { base64 } => RemoteValue::Blob(base64),
        })
    }
}

/// Column names and rows of one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<RemoteValue>>,
}

impl QueryResult {
    fn from_wire(result: ExecuteResult) -> Result<Self> {
        let columns = result
            .cols
            .into_iter()
            .enumerate()
            .map(|(idx, col)| col.name.unwrap_or_else(|| format!("column{}", idx)))
            .collect::<Vec<_>>();
        let rows = result
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(RemoteValue::try_from).collect::<Result<Vec<_>>>())
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col == name)
    }

    /// Cell `name` of `row`, or an error naming the missing column.
    pub fn get<'a>(&self, row: &'a [RemoteValue], name: &str) -> Result<&'a RemoteValue> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| RemoteError::invalid_request(format!("Result has no column '{}'", name)))?;
        row.get(idx)
            .ok_or_else(|| RemoteError::invalid_request(format!("Row is missing column '{}'", name)))
    }

    /// First cell of the first row as text, `None` when absent or NULL.
    pub fn scalar_text(&self) -> Option<String> {
        self.rows
            .first()
            .and_then(|row| row.first())
            .and_then(RemoteValue::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_request_serializes_with_close() {
        let body = serde_json::to_value(PipelineRequest::execute("SELECT 1")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "requests": [
                    {"type": "execute", "stmt": {"sql": "SELECT 1", "want_rows": true}},
                    {"type": "close"}
                ]
            })
        );
    }

    #[test]
    fn decodes_typed_rows() {
        let raw = serde_json::json!({
            "baton": null,
            "base_url": null,
            "results": [
                {"type": "ok", "response": {"type": "execute", "result": {
                    "cols": [{"name": "name", "decltype": "TEXT"}, {"name": "ncol", "decltype": null}],
                    "rows": [
                        [{"type": "text", "value": "marketstats"}, {"type": "integer", "value": "12"}],
                        [{"type": "text", "value": "sqlite_schema"}, {"type": "null"}]
                    ],
                    "affected_row_count": 0,
                    "last_insert_rowid": null
                }}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        });
        let response: PipelineResponse = serde_json::from_value(raw).unwrap();
        let result = response.into_query_result().unwrap();

        assert_eq!(result.columns, vec!["name", "ncol"]);
        assert_eq!(result.scalar_text().as_deref(), Some("marketstats"));
        let ncol = result.get(&result.rows[0], "ncol").unwrap();
        assert_eq!(ncol.as_i64(), Some(12));
        assert!(result.get(&result.rows[1], "ncol").unwrap().is_null());
        assert!(result.get(&result.rows[0], "missing").is_err());
    }

    #[test]
    fn statement_error_is_surfaced() {
        let raw = serde_json::json!({
            "results": [
                {"type": "error", "error": {"message": "no such table: foo", "code": "SQLITE_ERROR"}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        });
        let response: PipelineResponse = serde_json::from_value(raw).unwrap();
        match response.into_query_result() {
            Err(RemoteError::Statement { code, message }) => {
                assert_eq!(code.as_deref(), Some("SQLITE_ERROR"));
                assert!(message.contains("foo"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
