//! Auxiliary logs derived from the worker's structured process log.
//!
//! The worker appends one JSON object per line to `process.log` in its
//! output directory. Each record carries a `trace_type`; records of the
//! three well-known trace types are split into their own files so users
//! can inspect agent, rule and task activity separately.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde_json::Value;

/// Name of the structured log the worker writes.
pub const PROCESS_LOG_FILENAME: &str = "process.log";

/// Trace type → derived file name.
pub const DERIVED_LOGS: [(&str, &str); 3] = [
    ("agent_activity", "process-agent.jsonl"),
    ("rule_process", "process-rule.jsonl"),
    ("task_process", "process-task.jsonl"),
];

/// Split `process.log` in `dir` into the per-trace-type files.
///
/// Lines that are not JSON objects are skipped. Returns the paths written,
/// or `Ok(vec![])` if the worker produced no process log.
pub fn derive_filtered_logs(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let source = dir.join(PROCESS_LOG_FILENAME);
    let file = match fs::File::open(&source) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut buckets: [Vec<String>; 3] = Default::default();
    let mut skipped = 0usize;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let trace_type = match serde_json::from_str::<Value>(&line) {
            Ok(record) => record
                .get("trace_type")
                .and_then(Value::as_str)
                .map(str::to_owned),
            Err(_) => {
                skipped += 1;
                continue;
            }
        };
        if let Some(i) = DERIVED_LOGS
            .iter()
            .position(|(kind, _)| Some(*kind) == trace_type.as_deref())
        {
            buckets[i].push(line);
        }
    }
    if skipped > 0 {
        tracing::debug!(skipped, path = %source.display(), "Skipped malformed process log lines");
    }

    let mut written = Vec::with_capacity(DERIVED_LOGS.len());
    for ((_, filename), lines) in DERIVED_LOGS.iter().zip(buckets) {
        let path = dir.join(filename);
        let mut out = io::BufWriter::new(fs::File::create(&path)?);
        for line in lines {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        written.push(path);
    }
    Ok(written)
}
