//! Relational query collaborator.
//!
//! The default implementation runs against the server's sqlite pool.
//! Named `:param` markers are rewritten to positional binds in order of
//! appearance; markers inside quoted literals are not recognized.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use regex::Regex;
use serde_json::{Map, Value};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::{Column, Row, TypeInfo};

use crate::envelope::wrap_base64;

#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn run(&self, sql: &str, params: &Map<String, Value>) -> Result<Vec<Value>>;
}

pub struct SqliteQueryEngine {
    pool: SqlitePool,
}

impl SqliteQueryEngine {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Rewrite `:name` markers into `?` placeholders, returning the rewritten
/// SQL and the marker names in order of appearance.
fn rewrite_named_params(sql: &str) -> (String, Vec<String>) {
    // One compiled pattern per call is fine — queries are not a hot path.
    let marker = Regex::new(r":([A-Za-z_][A-Za-z0-9_]*)").expect("static regex");
    let mut names = Vec::new();
    let rewritten = marker
        .replace_all(sql, |caps: &regex::Captures<'_>| {
            names.push(caps[1].to_string());
            "?".to_string()
        })
        .to_string();
    (rewritten, names)
}

fn row_to_json(row: &SqliteRow) -> Value {
    let mut obj = Map::new();
    for col in row.columns() {
        let i = col.ordinal();
        let value = match col.type_info().name() {
            "INTEGER" => row
                .try_get::<Option<i64>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "REAL" => row
                .try_get::<Option<f64>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "BOOLEAN" => row
                .try_get::<Option<bool>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
            "BLOB" => row
                .try_get::<Option<Vec<u8>>, _>(i)
                .ok()
                .flatten()
                .map(|b| wrap_base64(&b)),
            _ => row
                .try_get::<Option<String>, _>(i)
                .ok()
                .flatten()
                .map(Value::from),
        };
        obj.insert(col.name().to_string(), value.unwrap_or(Value::Null));
    }
    Value::Object(obj)
}

#[async_trait]
impl QueryEngine for SqliteQueryEngine {
    async fn run(&self, sql: &str, params: &Map<String, Value>) -> Result<Vec<Value>> {
        let (rewritten, names) = rewrite_named_params(sql);

        let mut query = sqlx::query(&rewritten);
        for name in &names {
            let value = params
                .get(name)
                .ok_or_else(|| anyhow!("missing query parameter: {name}"))?;
            query = match value {
                Value::Null => query.bind(Option::<String>::None),
                Value::Bool(b) => query.bind(*b),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        query.bind(i)
                    } else {
                        query.bind(n.as_f64().unwrap_or(0.0))
                    }
                }
                Value::String(s) => query.bind(s.clone()),
                other => query.bind(other.to_string()),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}
