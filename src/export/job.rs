use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::foundation::error::{SkyloopError, SkyloopResult};

/// Output container of an export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// VP9 in WebM, via the live-capture backend.
    Webm,
    /// H.264 in MP4, via the live-capture backend.
    Mp4,
    /// Animated GIF, via the worker backend.
    Gif,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Webm => "webm",
            Self::Mp4 => "mp4",
            Self::Gif => "gif",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = SkyloopError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webm" => Ok(Self::Webm),
            "mp4" => Ok(Self::Mp4),
            "gif" => Ok(Self::Gif),
            other => Err(SkyloopError::validation(format!(
                "unknown export format '{other}' (expected webm, mp4 or gif)"
            ))),
        }
    }
}

/// `{prefix}-{sourceKey|multi}-{YYYYMMDDTHHMMSSZ}.{ext}`
pub fn artifact_name(
    prefix: &str,
    source_key: Option<&str>,
    format: ExportFormat,
    at: DateTime<Utc>,
) -> String {
    format!(
        "{prefix}-{}-{}.{}",
        source_key.unwrap_or("multi"),
        at.format("%Y%m%dT%H%M%SZ"),
        format.extension()
    )
}

/// Lifecycle of an export job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportState {
    /// Created, nothing started.
    Idle,
    /// Frames are being composed and handed to the backend.
    Running,
    /// All frames pushed; waiting for the backend to flush.
    Draining,
    /// Flushed; the artifact is being written out.
    Finalizing,
    /// Artifact delivered.
    Complete,
    /// Backend or composition failure, with its cause.
    Error(String),
    /// Stopped by the user; nothing delivered.
    Cancelled,
}

impl ExportState {
    /// Return `true` for `Complete`, `Error` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error(_) | Self::Cancelled)
    }

    /// Short lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Finalizing => "finalizing",
            Self::Complete => "complete",
            Self::Error(_) => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Return `true` when moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: &ExportState) -> bool {
        use ExportState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Idle | Running | Draining | Finalizing, Error(_))
                | (Idle | Running | Draining, Cancelled)
                | (Running, Draining)
                | (Draining, Finalizing)
                | (Finalizing, Complete)
        )
    }
}

impl fmt::Display for ExportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error(cause) => write!(f, "error: {cause}"),
            other => f.write_str(other.name()),
        }
    }
}

/// Phase a progress report belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Composing and submitting frames.
    Rendering,
    /// Background encoder catching up.
    Encoding,
    /// Flushing and writing the artifact.
    Finalizing,
}

impl Stage {
    /// Label shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            Self::Rendering => "Rendering frames",
            Self::Encoding => "Encoding",
            Self::Finalizing => "Finalizing",
        }
    }
}

/// `(current, total, stage)` progress report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    /// Completed units.
    pub current: usize,
    /// Units in this stage.
    pub total: usize,
    /// Stage the counts refer to.
    pub stage: Stage,
}

/// Message published while a job runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportEvent {
    /// The job entered a new state.
    State(ExportState),
    /// Progress within the current stage.
    Progress(Progress),
}

/// State machine of one export; publishes transitions and progress to an optional listener.
#[derive(Debug)]
pub struct ExportJob {
    format: ExportFormat,
    total: usize,
    state: ExportState,
    progress: Option<Progress>,
    high_water: HashMap<Stage, usize>,
    listener: Option<tokio::sync::mpsc::UnboundedSender<ExportEvent>>,
}

impl ExportJob {
    /// Idle job for `total` frames.
    pub fn new(format: ExportFormat, total: usize) -> Self {
        Self {
            format,
            total,
            state: ExportState::Idle,
            progress: None,
            high_water: HashMap::new(),
            listener: None,
        }
    }

    /// Publish events to `tx`.
    pub fn with_listener(mut self, tx: tokio::sync::mpsc::UnboundedSender<ExportEvent>) -> Self {
        self.listener = Some(tx);
        self
    }

    /// Output format.
    pub fn format(&self) -> ExportFormat {
        self.format
    }

    /// Frames in the job.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Current state.
    pub fn state(&self) -> &ExportState {
        &self.state
    }

    /// Last progress report.
    pub fn progress(&self) -> Option<Progress> {
        self.progress
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition(&mut self, next: ExportState) -> SkyloopResult<()> {
        if !self.state.can_transition_to(&next) {
            return Err(SkyloopError::validation(format!(
                "illegal export transition {} -> {}",
                self.state.name(),
                next.name()
            )));
        }
        debug!(from = self.state.name(), to = next.name(), "export state");
        self.state = next.clone();
        self.publish(ExportEvent::State(next));
        Ok(())
    }

    /// Record progress; counts may not go backwards within a stage.
    pub fn report(&mut self, current: usize, total: usize, stage: Stage) -> SkyloopResult<()> {
        let seen = self.high_water.entry(stage).or_default();
        if current < *seen {
            return Err(SkyloopError::validation(format!(
                "progress for '{}' went backwards: {seen} -> {current}",
                stage.label()
            )));
        }
        *seen = current;
        let progress = Progress {
            current,
            total,
            stage,
        };
        self.progress = Some(progress);
        self.publish(ExportEvent::Progress(progress));
        Ok(())
    }

    fn publish(&self, event: ExportEvent) {
        if let Some(tx) = &self.listener {
            let _ = tx.send(event);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/export/job.rs"]
mod tests;
