use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde_json::json;
use tempfile::{Builder, NamedTempFile};
use tokio::process::Command;

use crate::error::{PipeSpanError, Result};

pub const DEFAULT_MERMAID_CLI: &str = "mmdc";

const VIEWPORT_WIDTH: u32 = 2000;
const VIEWPORT_HEIGHT: u32 = 1000;

/// Paths of the files written for one pipeline chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartFiles {
    pub source: PathBuf,
    pub svg: Option<PathBuf>,
}

/// `gantt-<pipeline>.mmd` inside `dir`.
pub fn source_path(dir: &Path, pipeline_id: u64) -> PathBuf {
    dir.join(format!("gantt-{pipeline_id}.mmd"))
}

/// `gantt-<pipeline>.svg` inside `dir`.
pub fn svg_path(dir: &Path, pipeline_id: u64) -> PathBuf {
    dir.join(format!("gantt-{pipeline_id}.svg"))
}

/// Writes `contents` to `path` through a temporary file in the same
/// directory, so readers never see a partial file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file cannot be
/// written or renamed.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.persist(path)
        .map_err(|e| PipeSpanError::Io(e.error))?;

    debug!("Wrote {}", path.display());
    Ok(())
}

/// Renders Mermaid documents to SVG through the Mermaid CLI.
#[derive(Debug, Clone)]
pub struct MermaidRenderer {
    program: String,
}

impl MermaidRenderer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Writes the document for `pipeline_id` into `dir` and, with `svg`,
    /// renders it next to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be written or the renderer
    /// fails. A failed render leaves the `.mmd` file in place.
    pub async fn write_chart(
        &self,
        document: &str,
        dir: &Path,
        pipeline_id: u64,
        svg: bool,
    ) -> Result<ChartFiles> {
        let source = source_path(dir, pipeline_id);
        write_atomic(&source, document)?;
        info!("Wrote Mermaid chart to {}", source.display());

        if !svg {
            return Ok(ChartFiles { source, svg: None });
        }

        let output = svg_path(dir, pipeline_id);
        let staged = Builder::new()
            .prefix(".gantt-")
            .suffix(".svg")
            .tempfile_in(dir)?;
        self.render(&source, staged.path()).await?;
        staged
            .persist(&output)
            .map_err(|e| PipeSpanError::Io(e.error))?;
        info!("Rendered SVG to {}", output.display());

        Ok(ChartFiles {
            source,
            svg: Some(output),
        })
    }

    /// Runs the Mermaid CLI on `input`, writing the SVG to `output`.
    ///
    /// Job links in the chart are `click` directives, which Mermaid only
    /// honours under the `loose` security level. That level cannot be set
    /// from the document itself, so it goes in a temporary config file.
    ///
    /// # Errors
    ///
    /// Returns [`PipeSpanError::Render`] if the program cannot be started or
    /// exits unsuccessfully.
    pub async fn render(&self, input: &Path, output: &Path) -> Result<()> {
        debug!("Rendering {} with {}", input.display(), self.program);

        let mut config = Builder::new()
            .prefix("pipespan-mermaid-")
            .suffix(".json")
            .tempfile()?;
        serde_json::to_writer(&mut config, &json!({ "securityLevel": "loose" }))?;
        config.flush()?;

        let result = Command::new(&self.program)
            .args(render_args(input, output, config.path()))
            .output()
            .await
            .map_err(|e| PipeSpanError::Render(format!("failed to run `{}`: {e}", self.program)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(PipeSpanError::Render(format!(
                "`{}` exited with {}: {}",
                self.program,
                result.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

fn render_args(input: &Path, output: &Path, config: &Path) -> Vec<OsString> {
    vec![
        "-i".into(),
        input.into(),
        "-o".into(),
        output.into(),
        "-c".into(),
        config.into(),
        "-w".into(),
        VIEWPORT_WIDTH.to_string().into(),
        "-H".into(),
        VIEWPORT_HEIGHT.to_string().into(),
    ]
}
