//! Embedded script execution collaborator.
//!
//! Interface only — the core passes script source, content, filter and the
//! acting username across this boundary and gets a JSON string back.  The
//! default implementation is disabled; deployments plug their own engine.

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait ScriptEngine: Send + Sync {
    async fn run(
        &self,
        source: &str,
        content: &Value,
        filter: Option<&Value>,
        username: &str,
    ) -> Result<String>;
}

pub struct DisabledScriptEngine;

#[async_trait]
impl ScriptEngine for DisabledScriptEngine {
    async fn run(
        &self,
        _source: &str,
        _content: &Value,
        _filter: Option<&Value>,
        _username: &str,
    ) -> Result<String> {
        bail!("script engine is not configured")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_engine_refuses() {
        let engine = DisabledScriptEngine;
        let err = engine
            .run("return 1", &Value::Null, None, "ada")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }
}
