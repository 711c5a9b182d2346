// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes; doubles as an event sink.

use serde::Serialize;
use std::time::Instant;

use crate::diagnostics::Warning;
use crate::pipeline::{EventSink, StageEvent, StageStatus};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
#[derive(Debug, Clone)]
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => match self.duration() {
                Some(elapsed) => println!("{message} ({elapsed:.1}s)"),
                None => println!("{message}"),
            },
            OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => print_json(&JsonMessage {
                event: "success",
                message,
                duration_secs: self.duration(),
            }),
        }
    }

    pub fn warning(&self, warning: &Warning) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Warning: {}", warning.message),
            OutputMode::Json => print_json(&JsonWarning {
                event: "warning",
                warning,
            }),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => {
                let event = JsonMessage {
                    event: "error",
                    message,
                    duration_secs: self.duration(),
                };
                if let Ok(json) = serde_json::to_string(&event) {
                    eprintln!("{json}");
                }
            }
        }
    }
}

impl EventSink for Output {
    fn emit(&self, event: &StageEvent) {
        match self.mode {
            OutputMode::Normal => match event.status {
                StageStatus::Running => println!("→ {} ...", event.stage),
                StageStatus::Succeeded => match event.duration_ms {
                    Some(ms) => println!("✓ {} ({:.1}s)", event.stage, ms as f64 / 1000.0),
                    None => println!("✓ {}", event.stage),
                },
                StageStatus::Failed => println!("✗ {}", event.stage),
                StageStatus::Pending => {}
            },
            OutputMode::Quiet => {}
            OutputMode::Json => print_json(&JsonStage {
                event: "stage",
                stage: event,
            }),
        }
    }
}

fn print_json<T: Serialize>(value: &T) {
    if let Ok(json) = serde_json::to_string(value) {
        println!("{json}");
    }
}

#[derive(Serialize)]
struct JsonMessage<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct JsonWarning<'a> {
    event: &'a str,
    #[serde(flatten)]
    warning: &'a Warning,
}

#[derive(Serialize)]
struct JsonStage<'a> {
    event: &'a str,
    #[serde(flatten)]
    stage: &'a StageEvent,
}
