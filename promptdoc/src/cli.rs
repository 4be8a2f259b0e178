/// # promptdoc CLI Interface (Module)
///
/// Command parsing and the async [`run`] entrypoint for the `promptdoc` binary.
/// All prompt parsing, generation and document writing lives in `promptdoc-core`;
/// this module wires settings, secrets and the OpenAI backend together.
///
/// ## Modes
/// - One `--input`: `--output` is the document path (extension appended if missing).
/// - Several `--input`s: `--output` is a directory and each input produces
///   `<output>/<stem>.<ext>`. Two inputs sharing a stem are rejected before any
///   generation. Missing inputs are skipped; the command fails at the end if any
///   input failed.
use crate::load_config::{load_config, load_secrets, Overrides};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use promptdoc_core::config::{OutputFormat, RunConfig};
use promptdoc_core::openai::OpenAiClient;
use promptdoc_core::pipeline::{execute, RunReport};
use promptdoc_core::prompt_source::load_prompt_source;
use promptdoc_core::writer::FileWriter;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// CLI for promptdoc: turn prompt files into generated documents.
#[derive(Parser)]
#[clap(
    name = "promptdoc",
    version,
    about = "Generate PDF/Markdown/DOCX/EPUB documents by answering every prompt in a prompt file"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Build(args) => args.verbose,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Dry-run, generate and save a document for each input prompt file
    Build(BuildArgs),
}

#[derive(Args, Debug, Clone)]
pub struct BuildArgs {
    /// Prompt file(s): flat text (`#` headers) or YAML (`.yaml`/`.yml`)
    #[clap(short = 'i', long = "input", default_value = "prompts.yaml")]
    pub input: Vec<PathBuf>,

    /// Output document, or output directory when several inputs are given
    #[clap(short = 'o', long, default_value = "result")]
    pub output: PathBuf,

    /// Model name sent to the API
    #[clap(long)]
    pub model: Option<String>,

    /// Deepest heading level listed in the table of contents
    #[clap(long)]
    pub toc_level: Option<usize>,

    /// Output format: pdf, md, docx or epub
    #[clap(short = 'f', long)]
    pub format: Option<OutputFormat>,

    /// Optimize the PDF size
    #[clap(long)]
    pub optimize: bool,

    /// Disable the web-search tool in API requests
    #[clap(long)]
    pub no_web_search: bool,

    /// Enable debug logging
    #[clap(long)]
    pub verbose: bool,

    /// Maximum number of API calls in flight
    #[clap(long)]
    pub concurrency: Option<usize>,

    /// Per-response token budget
    #[clap(long)]
    pub max_output_tokens: Option<u32>,

    /// YAML settings file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Stylesheet for EPUB output
    #[clap(long)]
    pub css: Option<PathBuf>,
}

impl BuildArgs {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            model: self.model.clone(),
            max_output_tokens: self.max_output_tokens,
            concurrency: self.concurrency,
            toc_level: self.toc_level,
            optimize: self.optimize,
            no_web_search: self.no_web_search,
            format: self.format,
            css: self.css.clone(),
        }
    }
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Build(args) => build(args).await,
    }
}

async fn build(args: BuildArgs) -> Result<()> {
    let config = load_config(args.config.as_deref(), &args.overrides())?;
    let secrets = load_secrets()?;
    let backend = Arc::new(
        OpenAiClient::new(secrets.api_key, secrets.base_url)
            .map_err(|e| anyhow::anyhow!("Failed to construct API client: {e}"))?,
    );
    let writer = FileWriter::new(&config);

    if let [input] = args.input.as_slice() {
        let output = config.format.ensure_extension(&args.output);
        let report = build_one(input, &output, &config, Arc::clone(&backend), &writer).await?;
        log_report(input, &report);
        return Ok(());
    }

    let plan = plan_batch(&args.output, &args.input, config.format)?;
    let total = plan.len();
    let mut failed = 0usize;
    for (input, output) in &plan {
        if !input.exists() {
            tracing::error!(input = %input.display(), "Input file not found, skipping");
            failed += 1;
            continue;
        }
        match build_one(input, output, &config, Arc::clone(&backend), &writer).await {
            Ok(report) => log_report(input, &report),
            Err(e) => {
                tracing::error!(input = %input.display(), error = %e, "Build failed for input");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(anyhow::anyhow!("{failed} of {total} inputs failed"));
    }
    tracing::info!(inputs = total, "Batch build complete");
    Ok(())
}

async fn build_one(
    input: &Path,
    output: &Path,
    config: &RunConfig,
    backend: Arc<OpenAiClient>,
    writer: &FileWriter,
) -> Result<RunReport> {
    tracing::info!(input = %input.display(), output = %output.display(), "Building document");
    let source = load_prompt_source(input)?;
    let report = execute(&source, config, output, backend, writer).await?;
    Ok(report)
}

fn log_report(input: &Path, report: &RunReport) {
    tracing::info!(
        input = %input.display(),
        output = %report.output_path.display(),
        prompts = report.prompts,
        fallbacks = report.fallbacks,
        sections = report.sections,
        "Document generated"
    );
}

/// Pair every batch input with its output path.
///
/// Fails before any generation when two inputs would write the same file.
pub fn plan_batch(
    dir: &Path,
    inputs: &[PathBuf],
    format: OutputFormat,
) -> Result<Vec<(PathBuf, PathBuf)>> {
    let mut claimed: HashMap<PathBuf, &Path> = HashMap::new();
    let mut plan = Vec::with_capacity(inputs.len());
    for input in inputs {
        let output = batch_output_path(dir, input, format);
        if let Some(previous) = claimed.insert(output.clone(), input.as_path()) {
            tracing::error!(
                first = %previous.display(),
                second = %input.display(),
                output = %output.display(),
                "Batch inputs share an output path"
            );
            return Err(anyhow::anyhow!(
                "inputs {} and {} would both be written to {}; rename one of them",
                previous.display(),
                input.display(),
                output.display()
            ));
        }
        plan.push((input.clone(), output));
    }
    Ok(plan)
}

/// `<dir>/<input stem>.<ext>` for batch builds.
pub fn batch_output_path(dir: &Path, input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("result"));
    format.ensure_extension(&dir.join(stem))
}
