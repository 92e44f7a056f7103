//! Pipeline progress reporting.
//!
//! Reports the three levels of progress a fetch or import goes through:
//! search pages collected, completion batches finished, and import batches
//! persisted. Progress is emitted on **stderr** so stdout remains parseable
//! for scripts.

use std::io::Write;

/// A single progress event.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// A search page came back. `fetched` is this page's count, `total` the
    /// running count across pages.
    SearchPage {
        page: usize,
        fetched: usize,
        total: usize,
    },
    /// A completion batch finished, successfully or not.
    CompletionBatch {
        completed: usize,
        total: usize,
        failed: usize,
    },
    /// An import batch was persisted.
    ImportBatch {
        current: usize,
        total: usize,
        percentage: f64,
    },
}

/// Reports pipeline progress. Implementations write to stderr (human or JSON).
pub trait PipelineProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline stages.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "import  1,225 / 2,000 orders (61.3%)".
pub struct StderrProgress;

impl PipelineProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::SearchPage {
                page,
                fetched,
                total,
            } => format!(
                "search  page {}  +{}  ({} orders)\n",
                page,
                format_number(*fetched),
                format_number(*total)
            ),
            ProgressEvent::CompletionBatch {
                completed,
                total,
                failed,
            } => {
                let mut line = format!("completion  {} / {} batches", completed, total);
                if *failed > 0 {
                    line.push_str(&format!("  ({} failed)", failed));
                }
                line.push('\n');
                line
            }
            ProgressEvent::ImportBatch {
                current,
                total,
                percentage,
            } => format!(
                "import  {} / {} orders ({:.1}%)\n",
                format_number(*current),
                format_number(*total),
                percentage
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl JsonProgress {
    fn to_json(event: &ProgressEvent) -> serde_json::Value {
        match event {
            ProgressEvent::SearchPage {
                page,
                fetched,
                total,
            } => serde_json::json!({
                "event": "progress",
                "phase": "search",
                "page": page,
                "fetched": fetched,
                "total": total
            }),
            ProgressEvent::CompletionBatch {
                completed,
                total,
                failed,
            } => serde_json::json!({
                "event": "progress",
                "phase": "completion",
                "completed": completed,
                "total": total,
                "failed": failed
            }),
            ProgressEvent::ImportBatch {
                current,
                total,
                percentage,
            } => serde_json::json!({
                "event": "progress",
                "phase": "import",
                "current": current,
                "total": total,
                "percentage": percentage
            }),
        }
    }
}

impl PipelineProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        if let Ok(line) = serde_json::to_string(&Self::to_json(&event)) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl PipelineProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn PipelineProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
