//! Two-phase run: dry run → validate → real run → save.
//!
//! The dry run pushes the whole prompt source through the orchestrator with
//! placeholder text and writes the result to a throwaway file in the target
//! format. Only if that write succeeds (and the file is removed again) does the
//! real run start spending API budget.
//!
//! # Error Handling
//! - [`PipelineError::DryRun`]: the assembly/serialization path is broken; nothing
//!   was generated, nothing is left on disk.
//! - [`PipelineError::Save`]: the final write failed after generation. The raw
//!   Markdown is dumped next to the requested output (`<output>.recovery.md`) so
//!   the generated content survives.
//!
//! Phases never overlap and there are no retries between them.

use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::RunConfig;
use crate::contract::{DocumentWriter, TextBackend, WriteError};
use crate::document::Document;
use crate::generator::ContentGenerator;
use crate::orchestrator::{Orchestrator, RunMode};
use crate::prompt_source::PromptSource;

#[derive(Debug)]
pub struct DryRunReport {
    /// Where the throwaway artifact was written (and removed again).
    pub artifact_path: PathBuf,
    pub sections: usize,
}

#[derive(Debug)]
pub struct RunReport {
    pub output_path: PathBuf,
    pub prompts: usize,
    pub fallbacks: usize,
    pub sections: usize,
}

#[derive(Debug)]
pub enum PipelineError {
    DryRun(WriteError),
    Save {
        source: WriteError,
        recovery_path: Option<PathBuf>,
    },
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::DryRun(e) => write!(f, "dry run failed, no content was generated: {e}"),
            PipelineError::Save {
                source,
                recovery_path: Some(p),
            } => write!(
                f,
                "failed to save final document: {source}; raw Markdown saved to {}",
                p.display()
            ),
            PipelineError::Save {
                source,
                recovery_path: None,
            } => write!(
                f,
                "failed to save final document: {source}; recovery dump also failed"
            ),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::DryRun(e) | PipelineError::Save { source: e, .. } => Some(e),
        }
    }
}

pub fn recovery_path(output: &Path) -> PathBuf {
    let mut raw = OsString::from(output.as_os_str());
    raw.push(".recovery.md");
    PathBuf::from(raw)
}

/// Run the orchestrator in dry mode and prove the document can be written.
pub async fn dry_run<B, W>(
    orchestrator: &Orchestrator<B>,
    source: &PromptSource,
    config: &RunConfig,
    writer: &W,
) -> Result<DryRunReport, PipelineError>
where
    B: TextBackend + ?Sized + 'static,
    W: DocumentWriter + ?Sized,
{
    info!("[DRY RUN] Starting dry run with placeholder content");
    let document = orchestrator.run(source, RunMode::Dry).await;

    let artifact = tempfile::Builder::new()
        .prefix("promptdoc-dry-")
        .suffix(&format!(".{}", config.format.extension()))
        .tempfile()
        .map_err(|e| {
            error!(error = ?e, "[DRY RUN][ERROR] Failed to create throwaway artifact");
            PipelineError::DryRun(WriteError::Io(e))
        })?;
    let artifact_path = artifact.path().to_path_buf();

    if let Err(e) = writer.write(&document, &artifact_path) {
        error!(error = %e, path = %artifact_path.display(), "[DRY RUN][ERROR] Dry run failed");
        return Err(PipelineError::DryRun(e));
    }
    info!(path = %artifact_path.display(), "[DRY RUN] Dry-run document saved");

    artifact.close().map_err(|e| {
        error!(error = ?e, path = %artifact_path.display(), "[DRY RUN][ERROR] Failed to delete throwaway artifact");
        PipelineError::DryRun(WriteError::Io(e))
    })?;
    info!(path = %artifact_path.display(), "[DRY RUN] Deleted throwaway artifact");

    Ok(DryRunReport {
        artifact_path,
        sections: document.sections.len(),
    })
}

/// Write the final document; on failure dump the raw Markdown for recovery.
pub fn save<W>(document: &Document, output: &Path, writer: &W) -> Result<(), PipelineError>
where
    W: DocumentWriter + ?Sized,
{
    match writer.write(document, output) {
        Ok(()) => {
            info!(path = %output.display(), "[SAVE] Final document successfully saved");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, path = %output.display(), "[SAVE][ERROR] Failed to save final document");
            let recovery = recovery_path(output);
            let recovery_path = match fs::write(&recovery, document.to_markdown()) {
                Ok(()) => {
                    warn!(path = %recovery.display(), "[SAVE] Raw Markdown written for recovery");
                    Some(recovery)
                }
                Err(dump_err) => {
                    error!(error = ?dump_err, path = %recovery.display(), "[SAVE][ERROR] Recovery dump failed too");
                    None
                }
            };
            Err(PipelineError::Save {
                source: e,
                recovery_path,
            })
        }
    }
}

/// Entrypoint: dry run, then real run, then save to `output`.
pub async fn execute<B, W>(
    source: &PromptSource,
    config: &RunConfig,
    output: &Path,
    backend: Arc<B>,
    writer: &W,
) -> Result<RunReport, PipelineError>
where
    B: TextBackend + ?Sized + 'static,
    W: DocumentWriter + ?Sized,
{
    let orchestrator = Orchestrator::new(ContentGenerator::new(backend, config), config.concurrency);

    let dry = dry_run(&orchestrator, source, config, writer).await?;
    info!(sections = dry.sections, "[DRY RUN] Dry run successful, now running real generation");

    info!("[REAL RUN] Starting real generation");
    let document = orchestrator.run(source, RunMode::Real).await;
    if document.fallback_count() > 0 {
        warn!(
            fallbacks = document.fallback_count(),
            prompts = document.prompt_count(),
            "[REAL RUN] Some prompts fell back to placeholder text"
        );
    }

    save(&document, output, writer)?;

    Ok(RunReport {
        output_path: output.to_path_buf(),
        prompts: document.prompt_count(),
        fallbacks: document.fallback_count(),
        sections: document.sections.len(),
    })
}
