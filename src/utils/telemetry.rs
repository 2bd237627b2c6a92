//! Trace Telemetry
//!
//! Aggregates statistics across traces: outcome counts, graph sizes, bridge
//! crossings and adapter failures per chain. Exported as JSON snapshots, an
//! appended CSV history, and a JSONL stream of per-trace summaries.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::models::types::{TraceResult, TraceStatus};

/// Per-trace summary record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceSummaryEvent {
    pub timestamp: u64,
    pub trace_id: String,
    pub source_chain: String,
    pub status: TraceStatus,
    pub completed: bool,
    pub nodes: usize,
    pub edges: usize,
    pub bridge_crossings: usize,
    pub adapter_failures: usize,
    pub execution_ms: u64,
}

impl TraceSummaryEvent {
    pub fn from_result(result: &TraceResult) -> Self {
        Self {
            timestamp: current_timestamp(),
            trace_id: result.trace_id.clone(),
            source_chain: result.source_chain.to_string(),
            status: result.status,
            completed: result.completed,
            nodes: result.total_nodes,
            edges: result.total_edges,
            bridge_crossings: result
                .edges
                .iter()
                .filter(|e| e.chain_from.is_some() && e.chain_to.is_some())
                .count(),
            adapter_failures: result.adapter_failures.len(),
            execution_ms: (result.execution_time_seconds * 1000.0) as u64,
        }
    }
}

/// Aggregated statistics for reporting
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryStats {
    pub total_traces: u64,
    pub completed: u64,
    pub truncated: u64,
    pub failed: u64,
    /// Completed but with adapter failures
    pub partial: u64,
    pub total_nodes: u64,
    pub total_edges: u64,
    pub bridge_crossings: u64,
    pub adapter_failures_by_chain: BTreeMap<String, u64>,
    pub avg_execution_ms: f64,
    pub period_start: u64,
    pub period_end: u64,
}

impl TelemetryStats {
    /// Export as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    /// Export as CSV row
    pub fn to_csv_row(&self) -> String {
        let failures: u64 = self.adapter_failures_by_chain.values().sum();
        format!(
            "{},{},{},{},{},{},{},{},{},{},{},{:.2}\n",
            self.period_start,
            self.period_end,
            self.total_traces,
            self.completed,
            self.truncated,
            self.failed,
            self.partial,
            self.total_nodes,
            self.total_edges,
            self.bridge_crossings,
            failures,
            self.avg_execution_ms,
        )
    }
}

/// Telemetry collector shared by concurrent traces
pub struct TraceTelemetry {
    events: Arc<RwLock<Vec<TraceSummaryEvent>>>,
    total_traces: AtomicU64,
    completed: AtomicU64,
    truncated: AtomicU64,
    failed: AtomicU64,
    partial: AtomicU64,
    total_nodes: AtomicU64,
    total_edges: AtomicU64,
    bridge_crossings: AtomicU64,
    total_execution_ms: AtomicU64,
    failures_by_chain: Arc<RwLock<BTreeMap<String, u64>>>,
    session_start: u64,
    export_dir: PathBuf,
    max_buffer_size: usize,
}

impl TraceTelemetry {
    pub fn new() -> Self {
        Self::with_config(PathBuf::from("./telemetry"), 100)
    }

    pub fn with_config(export_dir: PathBuf, max_buffer_size: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::with_capacity(max_buffer_size))),
            total_traces: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            truncated: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            partial: AtomicU64::new(0),
            total_nodes: AtomicU64::new(0),
            total_edges: AtomicU64::new(0),
            bridge_crossings: AtomicU64::new(0),
            total_execution_ms: AtomicU64::new(0),
            failures_by_chain: Arc::new(RwLock::new(BTreeMap::new())),
            session_start: current_timestamp(),
            export_dir,
            max_buffer_size: max_buffer_size.max(1),
        }
    }

    /// Record a finished trace
    pub fn record_trace(&self, result: &TraceResult) {
        let event = TraceSummaryEvent::from_result(result);

        self.total_traces.fetch_add(1, Ordering::Relaxed);
        match result.status {
            TraceStatus::Completed if result.completed => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            TraceStatus::Completed => {
                self.partial.fetch_add(1, Ordering::Relaxed);
            }
            TraceStatus::Truncated => {
                self.truncated.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.total_nodes.fetch_add(event.nodes as u64, Ordering::Relaxed);
        self.total_edges.fetch_add(event.edges as u64, Ordering::Relaxed);
        self.bridge_crossings
            .fetch_add(event.bridge_crossings as u64, Ordering::Relaxed);
        self.total_execution_ms
            .fetch_add(event.execution_ms, Ordering::Relaxed);

        if let Ok(mut by_chain) = self.failures_by_chain.write() {
            for failure in &result.adapter_failures {
                *by_chain.entry(failure.chain.to_string()).or_insert(0) += 1;
            }
        }

        if let Ok(mut events) = self.events.write() {
            events.push(event);

            if events.len() >= self.max_buffer_size {
                let to_flush = std::mem::take(&mut *events);
                drop(events); // release lock before I/O
                let _ = self.flush_events(&to_flush);
            }
        }
    }

    pub fn get_stats(&self) -> TelemetryStats {
        let total_traces = self.total_traces.load(Ordering::Relaxed);
        let total_ms = self.total_execution_ms.load(Ordering::Relaxed);

        let avg_execution_ms = if total_traces > 0 {
            total_ms as f64 / total_traces as f64
        } else {
            0.0
        };

        TelemetryStats {
            total_traces,
            completed: self.completed.load(Ordering::Relaxed),
            truncated: self.truncated.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            partial: self.partial.load(Ordering::Relaxed),
            total_nodes: self.total_nodes.load(Ordering::Relaxed),
            total_edges: self.total_edges.load(Ordering::Relaxed),
            bridge_crossings: self.bridge_crossings.load(Ordering::Relaxed),
            adapter_failures_by_chain: self
                .failures_by_chain
                .read()
                .map(|m| m.clone())
                .unwrap_or_default(),
            avg_execution_ms,
            period_start: self.session_start,
            period_end: current_timestamp(),
        }
    }

    /// Export current stats to a JSON file
    pub fn export_stats_json(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let stats = self.get_stats();
        let path = self
            .export_dir
            .join(format!("stats_{}.json", current_timestamp()));

        fs::write(&path, stats.to_json())?;
        Ok(path)
    }

    /// Append stats to the CSV history
    pub fn export_stats_csv(&self) -> Result<PathBuf, std::io::Error> {
        fs::create_dir_all(&self.export_dir)?;
        let stats = self.get_stats();
        let path = self.export_dir.join("trace_history.csv");

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        if file.metadata()?.len() == 0 {
            writeln!(file, "period_start,period_end,total_traces,completed,truncated,failed,partial,total_nodes,total_edges,bridge_crossings,adapter_failures,avg_execution_ms")?;
        }

        write!(file, "{}", stats.to_csv_row())?;
        Ok(path)
    }

    /// Write buffered summaries to disk
    pub fn flush(&self) -> Result<(), std::io::Error> {
        let to_flush = match self.events.write() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(_) => return Ok(()),
        };
        self.flush_events(&to_flush)
    }

    fn flush_events(&self, events: &[TraceSummaryEvent]) -> Result<(), std::io::Error> {
        if events.is_empty() {
            return Ok(());
        }

        fs::create_dir_all(&self.export_dir)?;
        let path = self.export_dir.join("trace_events.jsonl");
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        for event in events {
            if let Ok(json) = serde_json::to_string(event) {
                writeln!(file, "{}", json)?;
            }
        }

        Ok(())
    }
}

impl Default for TraceTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
