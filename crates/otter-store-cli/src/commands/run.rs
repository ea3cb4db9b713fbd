//! Run command - execute a JSON-lines op script.
//!
//! Each non-empty line is one call:
//!
//! ```json
//! {"op": "open", "args": ["app.db"], "as": "db"}
//! {"op": "put", "args": [{"$var": "db"}, "k", "v"]}
//! {"op": "get", "args": [{"$var": "db"}, "missing"], "expectError": false}
//! ```
//!
//! `{"$var": name}` is replaced by the result an earlier line bound with
//! `"as"`. Buffers are written as `{"$bytes": [...]}` both ways. Lines
//! starting with `#` or `//` are comments.

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use otter_host::value::BYTES_TAG;
use otter_host::{HostContext, HostValue};
use otter_store::store_context;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;

use crate::config::Config;

const VAR_TAG: &str = "$var";

#[derive(Args)]
pub struct RunCommand {
    /// Script to execute
    pub script: PathBuf,
}

impl RunCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        let source = std::fs::read_to_string(&self.script)
            .with_context(|| format!("Failed to read {}", self.script.display()))?;

        let ctx = store_context(config.store.clone())?;
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        let calls = execute(&ctx, &source, &mut out)?;

        tracing::info!(calls, script = %self.script.display(), "Script finished");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptLine {
    op: String,
    #[serde(default)]
    args: Vec<JsonValue>,
    #[serde(default, rename = "as")]
    bind: Option<String>,
    #[serde(default)]
    expect_error: bool,
}

/// Executes script lines against one context, keeping bound results
struct ScriptRunner<'a> {
    ctx: &'a HostContext,
    vars: HashMap<String, HostValue>,
}

impl<'a> ScriptRunner<'a> {
    fn new(ctx: &'a HostContext) -> Self {
        Self {
            ctx,
            vars: HashMap::new(),
        }
    }

    fn resolve(&self, value: JsonValue) -> Result<HostValue> {
        match value {
            JsonValue::Object(map) if map.contains_key(VAR_TAG) => {
                let name = map
                    .get(VAR_TAG)
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| anyhow!("{VAR_TAG} must name a variable"))?;
                self.vars
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("Unknown variable {name}"))
            }
            JsonValue::Object(map) if map.contains_key(BYTES_TAG) => {
                Ok(HostValue::from(JsonValue::Object(map)))
            }
            JsonValue::Object(map) => Ok(HostValue::Object(
                map.into_iter()
                    .map(|(k, v)| self.resolve(v).map(|v| (k, v)))
                    .collect::<Result<_>>()?,
            )),
            JsonValue::Array(items) => Ok(HostValue::Array(
                items
                    .into_iter()
                    .map(|v| self.resolve(v))
                    .collect::<Result<_>>()?,
            )),
            other => Ok(HostValue::from(other)),
        }
    }

    /// Run one line and return the JSON record to print
    fn step(&mut self, line_no: usize, line: ScriptLine) -> Result<JsonValue> {
        let args = line
            .args
            .into_iter()
            .map(|v| self.resolve(v))
            .collect::<Result<Vec<_>>>()
            .with_context(|| format!("line {line_no}"))?;

        match self.ctx.call(&line.op, args) {
            Ok(value) if line.expect_error => {
                bail!(
                    "line {line_no}: {} returned {} but an error was expected",
                    line.op,
                    value.to_json()
                )
            }
            Ok(value) => {
                let record = json!({ "line": line_no, "op": line.op, "result": value.to_json() });
                if let Some(name) = line.bind {
                    self.vars.insert(name, value);
                }
                Ok(record)
            }
            Err(e) if line.expect_error => Ok(json!({
                "line": line_no,
                "op": line.op,
                "error": { "name": e.name(), "message": e.message() },
            })),
            Err(e) => Err(anyhow!(e).context(format!("line {line_no}: {} failed", line.op))),
        }
    }
}

/// Execute every line of `source`, writing one JSON record per call to
/// `out`. Returns the number of calls made.
fn execute<W: Write>(ctx: &HostContext, source: &str, out: &mut W) -> Result<usize> {
    let mut runner = ScriptRunner::new(ctx);
    let mut calls = 0;

    for (index, raw) in source.lines().enumerate() {
        let text = raw.trim();
        if text.is_empty() || text.starts_with('#') || text.starts_with("//") {
            continue;
        }
        let line_no = index + 1;
        let line: ScriptLine = serde_json::from_str(text)
            .with_context(|| format!("line {line_no}: invalid script line"))?;

        let record = runner.step(line_no, line)?;
        writeln!(out, "{record}")?;
        calls += 1;
    }

    Ok(calls)
}
