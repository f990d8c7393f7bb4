//! One source text through one tool: scratch file, subprocess, classification.

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::classify::{Classification, Classifier};
use crate::runner::{CommandRunner, ProcessOutput, RunError};
use crate::scratch::{Scratch, ScratchError};
use crate::tool::{Mode, ToolSpec};

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("No code provided")]
    EmptySource,
    #[error(transparent)]
    Scratch(#[from] ScratchError),
    #[error(transparent)]
    Run(#[from] RunError),
}

#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub mode: Mode,
    pub output: ProcessOutput,
    pub classification: Classification,
}

/// Runs `tool` over `source`.
///
/// Empty source is rejected before anything touches the filesystem. The
/// scratch file is released before this returns, whatever the outcome, and
/// also if the returned future is dropped mid-run.
pub async fn analyze(
    runner: &dyn CommandRunner,
    scratch: &Scratch,
    tool: &ToolSpec,
    classifier: &Classifier,
    mode: Mode,
    source: &str,
) -> Result<Analysis, AnalyzeError> {
    if source.is_empty() {
        return Err(AnalyzeError::EmptySource);
    }

    let file = scratch.materialize(source, &tool.suffix)?;
    let args = tool.args_for(mode, file.path());
    let result = runner
        .run(tool.program.as_os_str(), &args, tool.timeout_for(mode))
        .await;
    file.release();

    let output = result?;
    let classification = classifier.classify(&output.combined(), output.exit_code);
    info!(
        tool = %tool.name,
        %mode,
        exit_code = output.exit_code,
        status = %classification.status,
        "analysis finished"
    );
    Ok(Analysis {
        mode,
        output,
        classification,
    })
}
