use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use super::styling::{done, heading, pending};

/// Progress for one run: fetch the pipeline, fetch and scan job logs, then
/// write the chart or export the trace.
pub struct PhaseProgress {
    pb: ProgressBar,
}

impl PhaseProgress {
    pub fn start_pipeline(pipeline_id: u64) -> Self {
        eprintln!("{}", heading("⚙️", "Phases"));
        let pb = create_spinner(
            pending(format!("Phase 1/3: Fetching pipeline #{pipeline_id}")).to_string(),
        );
        Self { pb }
    }

    pub fn finish_pipeline_start_jobs(self, title: &str) -> Self {
        self.pb.finish_with_message(
            done(format!("Phase 1/3: Fetched pipeline \"{title}\" ✓")).to_string(),
        );
        let pb = create_spinner(pending("Phase 2/3: Fetching and scanning job logs").to_string());
        Self { pb }
    }

    /// `output` names the last phase, e.g. "Rendering chart".
    pub fn finish_jobs_start_output(self, kept: usize, fetched: usize, output: &str) -> Self {
        self.pb.finish_with_message(
            done(format!("Phase 2/3: Scanned {kept} of {fetched} jobs ✓")).to_string(),
        );
        let pb = create_spinner(pending(format!("Phase 3/3: {output}")).to_string());
        Self { pb }
    }

    pub fn finish_output(self, summary: &str) {
        self.pb
            .finish_with_message(done(format!("Phase 3/3: {summary} ✓")).to_string());
        eprintln!();
    }
}

fn create_spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_draw_target(ProgressDrawTarget::stderr());
    if let Ok(style) = ProgressStyle::default_spinner().template("  {msg} {spinner}") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
