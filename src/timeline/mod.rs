//! Recovering job phases from GitLab logs and assembling them into a
//! Gantt chart or a trace.

pub mod attributes;
pub mod catalogue;
pub mod gantt;
pub mod ids;
pub mod job;
pub mod span;
pub mod timestamp;
pub mod trace;

pub use gantt::{render_gantt, GanttOptions, SortKey};
pub use ids::ZeroPaddedIds;
pub use job::Job;
pub use trace::emit_trace;
