use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use super::styling::{heading, note};
use crate::timeline::job::Job;

pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

#[allow(clippy::cast_precision_loss)]
pub fn color_coded_duration_cell(duration: chrono::Duration) -> Cell {
    let minutes = duration.num_milliseconds() as f64 / 60_000.0;
    let text = format!("{minutes:.1}min");
    if minutes <= 5.0 {
        Cell::new(text).fg(TableColor::Green)
    } else if minutes <= 10.0 {
        Cell::new(text).fg(TableColor::Yellow)
    } else {
        Cell::new(text).fg(TableColor::Red)
    }
}

pub fn status_cell(status: &str) -> Cell {
    let color = match status {
        "success" => TableColor::Green,
        "failed" => TableColor::Red,
        _ => TableColor::Yellow,
    };
    Cell::new(status).fg(color)
}

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn log_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}

/// Per-job table: status, runner, duration and the phases found in its log.
pub fn render_job_summary(jobs: &[Job]) -> String {
    let mut table = create_table();
    table.set_header(create_cyan_header(&["Job", "Status", "Runner", "Duration", "Log", "Phases"]));

    for job in jobs {
        let runner = match &job.runner.version {
            Some(version) => format!("#{} (v{version})", job.runner.id),
            None => format!("#{}", job.runner.id),
        };

        let phases = if job.spans.is_empty() {
            "-".to_string()
        } else {
            job.spans
                .iter()
                .map(|span| {
                    let marker = if span.start_adjusted { "*" } else { "" };
                    format!("{}{marker} {}s", span.name, span.duration().num_seconds())
                })
                .collect::<Vec<_>>()
                .join("\n")
        };

        table.add_row(vec![
            Cell::new(format!("{} #{}", job.name, job.id)),
            status_cell(&job.status),
            Cell::new(runner),
            color_coded_duration_cell(job.duration()),
            Cell::new(log_size(job.log.len())),
            Cell::new(phases),
        ]);
    }

    table.to_string()
}

/// Prints the job summary to stderr, keeping stdout for machine output.
pub fn print_job_summary(jobs: &[Job]) {
    eprintln!("{}", heading("📋", "Jobs"));
    if jobs.is_empty() {
        eprintln!("  {}\n", note("No complete jobs"));
        return;
    }
    eprintln!("{}", render_job_summary(jobs));
    eprintln!("  {}\n", note("* start re-derived from log lines"));
}
