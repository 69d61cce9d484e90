use crate::AdapterError;
use anyhow::Context;
use gpdload_domain::{
    Clock, IdSource, SystemClock, UuidIdSource, generate_batch, generate_iupd_document,
};
use gpdload_types::Validity;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A JSON document written to disk, with the exact text that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fixture {
    pub path: PathBuf,
    pub json: String,
}

/// Writes generated documents as `dir/test<xxxx>.json`.
#[derive(Debug, Default, Clone)]
pub struct FixtureWriter<I = UuidIdSource, C = SystemClock> {
    pub ids: I,
    pub clock: C,
}

impl FixtureWriter {
    /// Random ids and the system clock.
    pub fn system() -> Self {
        Self::new(UuidIdSource, SystemClock)
    }
}

impl<I: IdSource, C: Clock> FixtureWriter<I, C> {
    pub fn new(ids: I, clock: C) -> Self {
        Self { ids, clock }
    }

    pub fn payment_positions(
        &self,
        dir: &Path,
        count: usize,
        validity: Validity,
    ) -> Result<Fixture, AdapterError> {
        let extender = self.ids.fragment(4);
        self.payment_positions_as(dir, count, validity, &extender)
    }

    /// Like [`payment_positions`](Self::payment_positions) with a fixed
    /// file-name suffix, e.g. `"1"` for `test1.json`.
    pub fn payment_positions_as(
        &self,
        dir: &Path,
        count: usize,
        validity: Validity,
        extender: &str,
    ) -> Result<Fixture, AdapterError> {
        let batch = generate_batch(count, validity, &self.ids, &self.clock);
        write_pretty(dir, extender, &batch)
    }

    pub fn iupds(
        &self,
        dir: &Path,
        count: usize,
        validity: Validity,
        existing: &[String],
    ) -> Result<Fixture, AdapterError> {
        let doc = generate_iupd_document(count, validity, existing, &self.ids);
        write_pretty(dir, &self.ids.fragment(4), &doc)
    }
}

fn write_pretty<T: Serialize>(
    dir: &Path,
    extender: &str,
    doc: &T,
) -> Result<Fixture, AdapterError> {
    let json = serde_json::to_string_pretty(doc).context("serialize fixture")?;
    std::fs::create_dir_all(dir).with_context(|| format!("create dir {}", dir.display()))?;
    let path = dir.join(format!("test{extender}.json"));
    std::fs::write(&path, &json).with_context(|| format!("write {}", path.display()))?;
    debug!(path = %path.display(), bytes = json.len(), "fixture written");
    Ok(Fixture { path, json })
}

/// Position identifiers of a payment-position batch file, in order.
///
/// Unreadable or unparseable files yield an empty list.
pub fn extract_iupds(path: &Path) -> Vec<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read fixture");
            return Vec::new();
        }
    };
    let value: serde_json::Value = match serde_json::from_str(&text) {
        Ok(value) => value,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "fixture is not valid JSON");
            return Vec::new();
        }
    };
    value["paymentPositions"]
        .as_array()
        .map(|positions| {
            positions
                .iter()
                .filter_map(|p| p["iupd"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
