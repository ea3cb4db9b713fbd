//! Bench command - write random keys, then read them back with a cursor.

use anyhow::{Result, anyhow, bail};
use clap::Args;
use otter_host::{HostContext, HostValue};
use otter_store::{StoreConfig, store_context};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::Config;

#[derive(Args)]
pub struct BenchCommand {
    /// Number of keys to write
    #[arg(long, default_value_t = 10_000)]
    pub keys: usize,

    /// Store to benchmark against
    #[arg(long, default_value = "otter-store-bench")]
    pub store: String,

    /// Write all keys in one batch instead of one put per key
    #[arg(long)]
    pub batch: bool,

    /// Keep the store on disk afterwards
    #[arg(long)]
    pub keep: bool,
}

/// Timings of one benchmark run
#[derive(Debug)]
pub struct BenchReport {
    pub keys: usize,
    pub write: Duration,
    pub read: Duration,
}

impl BenchReport {
    fn per_ms(items: usize, elapsed: Duration) -> f64 {
        let ms = elapsed.as_secs_f64() * 1000.0;
        if ms == 0.0 { f64::INFINITY } else { items as f64 / ms }
    }

    pub fn write_per_ms(&self) -> f64 {
        Self::per_ms(self.keys, self.write)
    }

    pub fn read_per_ms(&self) -> f64 {
        Self::per_ms(self.keys, self.read)
    }
}

impl BenchCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        let store_config = StoreConfig {
            default_store: None,
            ..config.store.clone()
        };
        let report = bench(&store_config, &self.store, self.keys, self.batch, self.keep)?;

        println!(
            "wrote {} keys in {:?} ({:.1} items/ms)",
            report.keys,
            report.write,
            report.write_per_ms()
        );
        println!(
            "read {} keys in {:?} ({:.1} items/ms)",
            report.keys,
            report.read,
            report.read_per_ms()
        );
        Ok(())
    }
}

/// Random hex keys mapped to their values
fn random_entries(count: usize) -> Result<BTreeMap<String, String>> {
    let mut seed = vec![0u8; count * 8];
    getrandom::fill(&mut seed).map_err(|e| anyhow!("Random source failed: {e}"))?;

    Ok(seed
        .chunks_exact(8)
        .enumerate()
        .map(|(i, chunk)| {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            (format!("{:016x}", u64::from_le_bytes(word)), format!("value-{i}"))
        })
        .collect())
}

fn call(ctx: &HostContext, op: &str, args: Vec<HostValue>) -> Result<HostValue> {
    ctx.call(op, args).map_err(|e| anyhow!(e).context(format!("{op} failed")))
}

pub fn bench(
    config: &StoreConfig,
    name: &str,
    count: usize,
    batched: bool,
    keep: bool,
) -> Result<BenchReport> {
    let entries = random_entries(count)?;
    let ctx = store_context(config.clone())?;
    let store = call(&ctx, "open", vec![name.into()])?;

    let started = Instant::now();
    if batched {
        let batch = call(&ctx, "beginBatch", vec![store.clone()])?;
        for (key, value) in &entries {
            call(
                &ctx,
                "batchPut",
                vec![batch.clone(), key.as_str().into(), value.as_str().into()],
            )?;
        }
        call(&ctx, "applyBatch", vec![batch])?;
    } else {
        for (key, value) in &entries {
            call(
                &ctx,
                "put",
                vec![store.clone(), key.as_str().into(), value.as_str().into()],
            )?;
        }
    }
    let write = started.elapsed();

    let started = Instant::now();
    let it = call(&ctx, "newIterator", vec![store.clone()])?;
    call(&ctx, "iterSeekToFirst", vec![it.clone()])?;
    let mut seen = 0;
    while call(&ctx, "iterValid", vec![it.clone()])? == HostValue::Bool(true) {
        let key = call(&ctx, "iterKeyStr", vec![it.clone()])?;
        let value = call(&ctx, "iterValueStr", vec![it.clone()])?;
        let key = key.as_str().unwrap_or_default();
        if entries.get(key).map(String::as_str) != value.as_str() {
            bail!("Mismatch at key {key}: got {}", value.to_json());
        }
        seen += 1;
        call(&ctx, "iterNext", vec![it.clone()])?;
    }
    call(&ctx, "iterClose", vec![it])?;
    let read = started.elapsed();

    if seen != entries.len() {
        bail!("Read back {seen} entries, expected {}", entries.len());
    }

    call(&ctx, "close", vec![store])?;
    if !keep {
        call(&ctx, "destroy", vec![name.into()])?;
    }
    tracing::debug!(keys = entries.len(), ?write, ?read, "Benchmark finished");

    Ok(BenchReport {
        keys: entries.len(),
        write,
        read,
    })
}
