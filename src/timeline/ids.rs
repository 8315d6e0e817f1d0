//! Deterministic trace and span identifiers.
//!
//! Re-exporting the same pipeline yields the same identifiers, so a collector
//! deduplicates or overwrites instead of growing a second copy. Two pipelines
//! with the same numeric id (e.g. from different GitLab instances) collide.

use std::fmt;

/// A 32-character lowercase hex trace identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(String);

/// A 16-character lowercase hex span identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpanId(String);

impl TraceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SpanId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives identifiers for the three levels of a pipeline trace.
pub trait IdGenerator {
    fn trace_id(&self, pipeline_id: u64) -> TraceId;
    fn pipeline_span_id(&self, pipeline_id: u64) -> SpanId;
    fn job_span_id(&self, job_id: u64) -> SpanId;
    /// `index` is the task's position within its job.
    fn task_span_id(&self, job_id: u64, index: usize) -> SpanId;
}

/// Decimal ids left-padded with zeros, which are valid hex strings.
///
/// | span     | layout                                     |
/// |----------|--------------------------------------------|
/// | trace    | pipeline id, 32 digits                     |
/// | pipeline | `f` + pipeline id mod 10^15, 15 digits     |
/// | job      | job id mod 10^16, 16 digits                |
/// | task     | `e` + job id mod 10^11 + index mod 10^4    |
///
/// The `f`/`e` prefixes keep pipeline and task spans from ever equalling a
/// job span. Job ids above 10^16, or above 10^11 for tasks, wrap and may
/// collide with a smaller id; GitLab ids are far below that.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroPaddedIds;

impl IdGenerator for ZeroPaddedIds {
    fn trace_id(&self, pipeline_id: u64) -> TraceId {
        TraceId(format!("{pipeline_id:032}"))
    }

    fn pipeline_span_id(&self, pipeline_id: u64) -> SpanId {
        SpanId(format!("f{:015}", pipeline_id % 10u64.pow(15)))
    }

    fn job_span_id(&self, job_id: u64) -> SpanId {
        SpanId(format!("{:016}", job_id % 10u64.pow(16)))
    }

    fn task_span_id(&self, job_id: u64, index: usize) -> SpanId {
        SpanId(format!("e{:011}{:04}", job_id % 10u64.pow(11), index % 10_000))
    }
}
