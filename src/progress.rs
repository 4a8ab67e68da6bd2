//! Structured progress events emitted by the pipeline.
//!
//! Front ends subscribe by passing a [`ProgressSink`]; the library never
//! prints on its own.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Classify,
    Harvest,
    Download,
    Assemble,
    Cleanup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Stage::Classify => "classify",
            Stage::Harvest => "harvest",
            Stage::Download => "download",
            Stage::Assemble => "assemble",
            Stage::Cleanup => "cleanup",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ProgressEvent {
    StageStarted {
        stage: Stage,
        detail: String,
    },
    StageProgress {
        stage: Stage,
        current: usize,
        total: usize,
        detail: String,
    },
    StageFailed {
        stage: Stage,
        detail: String,
    },
    StageCompleted {
        stage: Stage,
        detail: String,
    },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::StageStarted { stage, detail } => {
                write!(f, "[{stage}] {detail}\u{2026}")
            }
            ProgressEvent::StageProgress {
                stage,
                current,
                total,
                detail,
            } => write!(f, "[{stage}] {current}/{total} {detail}"),
            ProgressEvent::StageFailed { stage, detail } => write!(f, "[{stage}] failed: {detail}"),
            ProgressEvent::StageCompleted { stage, detail } => write!(f, "[{stage}] {detail}"),
        }
    }
}

pub type ProgressSink = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Optional sink with convenience emitters.
#[derive(Clone, Default)]
pub struct Progress {
    sink: Option<ProgressSink>,
}

impl Progress {
    pub fn new(sink: Option<ProgressSink>) -> Self {
        Self { sink }
    }

    pub fn silent() -> Self {
        Self { sink: None }
    }

    pub fn emit(&self, event: ProgressEvent) {
        if let Some(cb) = &self.sink {
            cb(&event);
        }
    }

    pub fn started(&self, stage: Stage, detail: impl Into<String>) {
        self.emit(ProgressEvent::StageStarted {
            stage,
            detail: detail.into(),
        });
    }

    pub fn step(&self, stage: Stage, current: usize, total: usize, detail: impl Into<String>) {
        self.emit(ProgressEvent::StageProgress {
            stage,
            current,
            total,
            detail: detail.into(),
        });
    }

    pub fn failed(&self, stage: Stage, detail: impl Into<String>) {
        self.emit(ProgressEvent::StageFailed {
            stage,
            detail: detail.into(),
        });
    }

    pub fn completed(&self, stage: Stage, detail: impl Into<String>) {
        self.emit(ProgressEvent::StageCompleted {
            stage,
            detail: detail.into(),
        });
    }
}

impl fmt::Debug for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Progress")
            .field("sink", &self.sink.as_ref().map(|_| "<callback>"))
            .finish()
    }
}
