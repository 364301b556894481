//! Read-only SQL query tool.
//!
//! The guard is a lexical denylist, not a SQL parser or sandbox: the
//! statement must begin with SELECT and must not contain any mutation
//! keyword anywhere in its text. Statements that smuggle writes through
//! constructs the denylist does not know about are out of scope; the
//! tool pool is expected to point at a read-intended database.

use serde_json::{Map, Value, json};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row};
use tracing::{info, warn};

use super::{ToolContext, tool_error};

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "create", "alter", "truncate",
];

/// Reject anything that is not lexically a plain SELECT.
pub fn check_read_only(query: &str) -> Result<(), String> {
    let normalized = query.trim().to_lowercase();
    if !normalized.starts_with("select") {
        return Err("Only SELECT queries are allowed".to_string());
    }
    for keyword in FORBIDDEN_KEYWORDS {
        if normalized.contains(keyword) {
            return Err(format!("Query contains forbidden keyword: {keyword}"));
        }
    }
    Ok(())
}

pub async fn run(args: &Value, ctx: &ToolContext) -> Value {
    let Some(query) = args.get("query").and_then(Value::as_str) else {
        return tool_error("missing required argument: query");
    };
    let description = args
        .get("description")
        .and_then(Value::as_str)
        .unwrap_or("");

    if let Err(reason) = check_read_only(query) {
        warn!(query, reason, "rejected query");
        return tool_error(reason);
    }

    let Some(pool) = ctx.tool_db.as_ref() else {
        return tool_error("the query database is not configured");
    };

    let rows = match sqlx::query(query).fetch_all(pool).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(query, error = %e, "query execution failed");
            return tool_error(format!("Query failed: {e}"));
        }
    };

    let data: Vec<Value> = rows.iter().map(row_to_json).collect();
    info!(rows = data.len(), "query tool returned rows");

    json!({
        "description": description,
        "data": data,
        "rowCount": data.len(),
        "query": query,
        "message": "Query executed successfully"
    })
}

/// Decode a dynamically-typed SQLite row into a JSON object. Types are
/// probed in order; anything undecodable becomes null.
fn row_to_json(row: &SqliteRow) -> Value {
    let mut obj = Map::new();
    for (i, column) in row.columns().iter().enumerate() {
        let value = if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<String>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
            v.map(Value::from).unwrap_or(Value::Null)
        } else {
            Value::Null
        };
        obj.insert(column.name().to_string(), value);
    }
    Value::Object(obj)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_accepted() {
        assert!(check_read_only("SELECT * FROM chats").is_ok());
        assert!(check_read_only("  select id from messages limit 5").is_ok());
    }

    #[test]
    fn test_non_select_rejected() {
        assert!(check_read_only("PRAGMA table_info(chats)").is_err());
        assert!(check_read_only("DROP TABLE chats").is_err());
    }

    #[test]
    fn test_mutation_keyword_anywhere_rejected() {
        assert!(check_read_only("SELECT 1; DELETE FROM chats").is_err());
        assert!(check_read_only("select * from x where note = 'drop'").is_err());
    }

    #[test]
    fn test_case_insensitive() {
        assert!(check_read_only("SeLeCt 1; InSeRt into t values (1)").is_err());
    }
}
