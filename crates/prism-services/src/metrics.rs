//! OpenTelemetry instruments for the variant pipeline and the worker
//!
//! Instruments are created from whatever meter the caller passes in. With no
//! meter provider installed, `opentelemetry::global` hands out a noop meter and
//! recording costs nothing.

use std::time::Duration;

use opentelemetry::{
    metrics::{Counter, Histogram, Meter, UpDownCounter},
    KeyValue,
};

use crate::pipeline::VariantSource;

pub const METER_NAME: &str = "prism";

/// Which entry point produced a variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformMode {
    Sync,
    Async,
}

impl TransformMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMode::Sync => "sync",
            TransformMode::Async => "async",
        }
    }
}

/// Status label of one finished transformation; `None` means it failed
pub fn status_label(source: Option<VariantSource>) -> &'static str {
    match source {
        Some(VariantSource::CacheHit) => "cache_hit",
        Some(VariantSource::Produced) => "produced",
        Some(VariantSource::ConflictResolved) => "conflict_resolved",
        None => "failed",
    }
}

pub fn transformation_attributes(mode: TransformMode, status: &'static str) -> [KeyValue; 2] {
    [
        KeyValue::new("mode", mode.as_str()),
        KeyValue::new("status", status),
    ]
}

#[derive(Clone)]
pub struct PipelineMetrics {
    transformations: Counter<u64>,
    transformation_duration: Histogram<f64>,
    worker_jobs: Counter<u64>,
    worker_active_jobs: UpDownCounter<i64>,
}

impl PipelineMetrics {
    pub fn new(meter: &Meter) -> Self {
        let transformations = meter
            .u64_counter("prism.transformations.count")
            .with_description("Transformations by entry point and result")
            .build();

        let transformation_duration = meter
            .f64_histogram("prism.transformations.duration")
            .with_description("Time to return a variant, in seconds")
            .with_unit("s")
            .build();

        let worker_jobs = meter
            .u64_counter("prism.worker.jobs.count")
            .with_description("Queue deliveries settled by the worker, by outcome")
            .build();

        let worker_active_jobs = meter
            .i64_up_down_counter("prism.worker.active_jobs")
            .with_description("Jobs currently held by the worker")
            .build();

        Self {
            transformations,
            transformation_duration,
            worker_jobs,
            worker_active_jobs,
        }
    }

    /// Instruments on the globally installed meter provider
    pub fn from_global() -> Self {
        Self::new(&opentelemetry::global::meter(METER_NAME))
    }

    pub fn record_transformation(
        &self,
        mode: TransformMode,
        source: Option<VariantSource>,
        elapsed: Duration,
    ) {
        let attributes = transformation_attributes(mode, status_label(source));
        self.transformations.add(1, &attributes);
        self.transformation_duration.record(elapsed.as_secs_f64(), &attributes);
    }

    pub fn record_job_started(&self) {
        self.worker_active_jobs.add(1, &[]);
    }

    /// `outcome` labels how the delivery was settled, e.g. `acked` or `requeued`
    pub fn record_job_finished(&self, outcome: &'static str) {
        self.worker_active_jobs.add(-1, &[]);
        self.worker_jobs.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::from_global()
    }
}
