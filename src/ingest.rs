// 📥 Multi-file ingest
// Each uploaded export is parsed on its own scoped thread with its own parser;
// outcomes come back in input order, so results match a sequential run.

use crate::error::{Error, Result};
use crate::parser::{EventRecord, ParseOutcome, PayrollParser};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::path::Path;
use std::thread;
use tracing::info;

/// One export file held in memory
#[derive(Debug, Clone)]
pub struct ExportInput {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ExportInput {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        ExportInput {
            file_name: file_name.into(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|source| Error::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.csv")
            .to_string();

        Ok(ExportInput { file_name, bytes })
    }

    /// SHA-256 of the raw bytes, used to recognise re-uploads
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

/// Parse every input, at most one worker thread per available core
pub fn parse_many(inputs: &[ExportInput], cache_capacity: usize) -> Vec<ParseOutcome> {
    let workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);
    let outcomes = parse_in_batches(inputs, cache_capacity, workers);

    info!(
        "Parsed {} files, {} records total",
        outcomes.len(),
        outcomes.iter().map(|o| o.records.len()).sum::<usize>()
    );
    outcomes
}

/// Batches of `workers` files run concurrently; outcomes keep input order
fn parse_in_batches(
    inputs: &[ExportInput],
    cache_capacity: usize,
    workers: usize,
) -> Vec<ParseOutcome> {
    let mut outcomes = Vec::with_capacity(inputs.len());

    for batch in inputs.chunks(workers.max(1)) {
        thread::scope(|scope| {
            let handles: Vec<_> = batch
                .iter()
                .map(|input| {
                    scope.spawn(move || {
                        PayrollParser::new(cache_capacity).parse_bytes(&input.bytes, &input.file_name)
                    })
                })
                .collect();

            for handle in handles {
                outcomes.push(handle.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)));
            }
        });
    }

    outcomes
}

/// Flatten per-file outcomes into one record sequence, file order preserved
pub fn concat_records(outcomes: &[ParseOutcome]) -> Vec<EventRecord> {
    outcomes
        .iter()
        .flat_map(|o| o.records.iter().cloned())
        .collect()
}
