use crate::providers::gitlab::types::GitLabPipeline;

pub mod mermaid;
pub mod otlp;
mod progress;
mod styling;
mod tables;

pub use mermaid::MermaidRenderer;
pub use otlp::{OtlpExporter, TraceDestination};
pub use progress::PhaseProgress;
use styling::{heading, link, note, status, title};
pub use tables::print_job_summary;

/// Prints the `pipespan` banner to stderr.
pub fn print_banner() {
    eprintln!(
        r"
{} {}
  {}
",
        title("🕒 pipespan"),
        note(env!("CARGO_PKG_VERSION")),
        note("GitLab pipeline timelines")
    );
}

/// Prints the pipeline outcome followed by what this run produced.
pub fn print_outputs(pipeline: &GitLabPipeline, outputs: &[String]) {
    eprintln!("{}", heading("📦", "Output"));
    eprintln!(
        "  pipeline #{} {} ({})",
        pipeline.id,
        pipeline.title(),
        status(&pipeline.status)
    );
    for output in outputs {
        eprintln!("  {}", link(output));
    }
    eprintln!();
}
