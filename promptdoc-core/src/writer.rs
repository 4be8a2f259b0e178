//! File writer for every supported output format.
//!
//! - `md`: the assembled Markdown, sections joined by a horizontal rule.
//! - `pdf`: laid out in-process by [`crate::markdown_to_pdf`].
//! - `docx` / `epub`: the Markdown is piped to an external `pandoc` process.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{error, info, warn};

use crate::config::{OutputFormat, RunConfig};
use crate::contract::{DocumentWriter, WriteError};
use crate::document::Document;
use crate::markdown_to_pdf::render_pdf;

#[derive(Debug, Clone)]
pub struct FileWriter {
    format: OutputFormat,
    toc_level: usize,
    optimize: bool,
    css: Option<PathBuf>,
    pandoc: PathBuf,
}

impl FileWriter {
    pub fn new(config: &RunConfig) -> Self {
        if let Some(css) = config.css.as_ref().filter(|_| config.format != OutputFormat::Epub) {
            warn!(
                css = %css.display(),
                format = %config.format,
                "Stylesheet is only applied to epub output, ignoring it"
            );
        }
        Self {
            format: config.format,
            toc_level: config.toc_level,
            optimize: config.optimize,
            css: config.css.clone(),
            pandoc: PathBuf::from("pandoc"),
        }
    }

    /// Use a specific `pandoc` executable instead of the one on `PATH`.
    pub fn with_pandoc(mut self, pandoc: impl Into<PathBuf>) -> Self {
        self.pandoc = pandoc.into();
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// The stylesheet actually handed to the converter; `None` for formats that ignore it.
    pub fn stylesheet(&self) -> Option<&Path> {
        match self.format {
            OutputFormat::Epub => self.css.as_deref(),
            _ => None,
        }
    }

    fn convert_with_pandoc(&self, markdown: &str, path: &Path) -> Result<(), WriteError> {
        let mut cmd = Command::new(&self.pandoc);
        cmd.arg("--from")
            .arg("markdown")
            .arg("--to")
            .arg(self.format.extension())
            .arg("--output")
            .arg(path)
            .arg("--toc")
            .arg(format!("--toc-depth={}", self.toc_level.max(1)));
        if let Some(css) = self.stylesheet() {
            cmd.arg("--css").arg(css);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            error!(error = ?e, pandoc = %self.pandoc.display(), "Failed to launch pandoc");
            WriteError::Converter(format!(
                "failed to launch {}: {e}",
                self.pandoc.display()
            ))
        })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(markdown.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!(
                status = %output.status,
                stderr = %stderr,
                path = %path.display(),
                "pandoc exited with non-zero code"
            );
            Err(WriteError::Converter(format!(
                "pandoc exited with {}: {stderr}",
                output.status
            )))
        }
    }
}

impl DocumentWriter for FileWriter {
    fn write(&self, document: &Document, path: &Path) -> Result<(), WriteError> {
        if document.sections.is_empty() {
            return Err(WriteError::EmptyDocument);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        match self.format {
            OutputFormat::Md => fs::write(path, document.to_markdown())?,
            OutputFormat::Pdf => {
                let bytes = render_pdf(document, self.toc_level, self.optimize)?;
                fs::write(path, bytes)?;
            }
            OutputFormat::Docx | OutputFormat::Epub => {
                self.convert_with_pandoc(&document.to_markdown(), path)?
            }
        }
        info!(format = %self.format, path = %path.display(), "Document written");
        Ok(())
    }
}
