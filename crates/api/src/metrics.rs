use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::audit::Stage;

#[derive(Default)]
struct StageCounters {
    runs: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    total_time_us: AtomicU64,
}

impl StageCounters {
    fn record(&self, success: bool, duration: Duration) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        if success {
            self.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.total_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> StageSnapshot {
        let runs = self.runs.load(Ordering::Relaxed);
        let total_us = self.total_time_us.load(Ordering::Relaxed) as f64;
        StageSnapshot {
            runs,
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            avg_time_ms: if runs > 0 {
                total_us / runs as f64 / 1000.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Default)]
pub struct Metrics {
    total_requests: AtomicUsize,
    rejected_requests: AtomicUsize,

    analysis: StageCounters,
    matching: StageCounters,
    full_pipeline: StageCounters,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// A request turned away before any pipeline ran (bad body, empty catalog).
    pub fn record_rejection(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_run(&self, stage: Stage, success: bool, duration: Duration) {
        self.counters(stage).record(success, duration);
    }

    fn counters(&self, stage: Stage) -> &StageCounters {
        match stage {
            Stage::AiProcessing => &self.analysis,
            Stage::ProductMatching => &self.matching,
            Stage::FullPipeline => &self.full_pipeline,
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            analysis: self.analysis.snapshot(),
            matching: self.matching.snapshot(),
            full_pipeline: self.full_pipeline.snapshot(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StageSnapshot {
    pub runs: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub avg_time_ms: f64,
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub total_requests: usize,
    pub rejected_requests: usize,
    pub analysis: StageSnapshot,
    pub matching: StageSnapshot,
    pub full_pipeline: StageSnapshot,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
