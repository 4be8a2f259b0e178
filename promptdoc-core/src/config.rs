use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2000;
pub const DEFAULT_CONCURRENCY: usize = 20;
pub const DEFAULT_TOC_LEVEL: usize = 3;

/// Target encoding of the generated document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Pdf,
    #[serde(alias = "markdown")]
    Md,
    Docx,
    Epub,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Md => "md",
            OutputFormat::Docx => "docx",
            OutputFormat::Epub => "epub",
        }
    }

    /// Returns `path` with this format's extension appended when it is missing.
    pub fn ensure_extension(&self, path: &Path) -> PathBuf {
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(self.extension()))
            .unwrap_or(false);
        if matches {
            path.to_path_buf()
        } else {
            let mut raw = path.as_os_str().to_owned();
            raw.push(".");
            raw.push(self.extension());
            PathBuf::from(raw)
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pdf" => Ok(OutputFormat::Pdf),
            "md" | "markdown" => Ok(OutputFormat::Md),
            "docx" => Ok(OutputFormat::Docx),
            "epub" => Ok(OutputFormat::Epub),
            other => Err(format!(
                "unknown output format '{other}', expected one of: pdf, md, docx, epub"
            )),
        }
    }
}

/// Run-wide settings, resolved once at startup and shared read-only by every component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: String,
    pub max_output_tokens: u32,
    pub concurrency: usize,
    pub use_web_search: bool,
    pub format: OutputFormat,
    pub toc_level: usize,
    pub optimize: bool,
    /// Stylesheet forwarded to writers that support one (EPUB).
    pub css: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            concurrency: DEFAULT_CONCURRENCY,
            use_web_search: true,
            format: OutputFormat::Pdf,
            toc_level: DEFAULT_TOC_LEVEL,
            optimize: false,
            css: None,
        }
    }
}

impl RunConfig {
    pub fn trace_loaded(&self) {
        info!(
            model = %self.model,
            format = %self.format,
            concurrency = self.concurrency,
            use_web_search = self.use_web_search,
            "Loaded RunConfig"
        );
        debug!(?self, "RunConfig loaded (full debug)");
    }
}
