//! Bounded-concurrency orchestration of one prompt source.
//!
//! Every prompt item becomes a spawned task. Tasks acquire an owned permit from a
//! shared [`Semaphore`] before touching the backend, so at most `concurrency`
//! generations are in flight; the rest wait on the permit. Completion order is
//! whatever the backend makes of it. Results are joined back in submission order
//! and stitched between the heading lines they came from, so the document reads
//! exactly like the prompt file.
//!
//! Failures stay per-item: a generation error is already a fallback fragment by the
//! time it reaches here, and a task that panics is replaced by the same fallback.

use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

use crate::contract::{GenerationResult, TextBackend};
use crate::document::{Document, DocumentSection, SectionBlock};
use crate::generator::{fallback_markdown, placeholder_markdown, ContentGenerator};
use crate::prompt_source::{PromptItem, PromptSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Resolve every prompt to a placeholder without calling the backend.
    Dry,
    Real,
}

pub struct Orchestrator<B: ?Sized> {
    generator: ContentGenerator<B>,
    concurrency: usize,
}

impl<B> Orchestrator<B>
where
    B: TextBackend + ?Sized + 'static,
{
    /// `concurrency` below 1 is treated as 1.
    pub fn new(generator: ContentGenerator<B>, concurrency: usize) -> Self {
        Self {
            generator,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run(&self, source: &PromptSource, mode: RunMode) -> Document {
        info!(
            mode = ?mode,
            prompts = source.prompt_count(),
            concurrency = self.concurrency,
            "Processing prompt source"
        );
        let results = self.generate_all(source, mode).await;
        let document = assemble_document(&source.items, results, source.section_split_depth());
        info!(
            mode = ?mode,
            sections = document.sections.len(),
            fallbacks = document.fallback_count(),
            "Prompt source processed"
        );
        document
    }

    /// One result per prompt item, in submission order.
    async fn generate_all(&self, source: &PromptSource, mode: RunMode) -> Vec<GenerationResult> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let system_override: Option<Arc<str>> = source.system_override.as_deref().map(Arc::from);
        let prompts: Vec<String> = source
            .items
            .iter()
            .filter(|item| !item.is_heading())
            .map(|item| item.text.clone())
            .collect();
        let total = prompts.len();

        let handles: Vec<_> = prompts
            .iter()
            .enumerate()
            .map(|(idx, prompt)| {
                let semaphore = Arc::clone(&semaphore);
                let generator = self.generator.clone();
                let system_override = system_override.clone();
                let prompt = prompt.clone();
                tokio::spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        error!(prompt = %prompt, "Concurrency permit unavailable");
                        return GenerationResult::Fallback(fallback_markdown(&prompt));
                    };
                    match mode {
                        RunMode::Dry => GenerationResult::Markdown(placeholder_markdown(&prompt)),
                        RunMode::Real => {
                            info!("Processing AI call {}/{}…", idx + 1, total);
                            generator.generate(&prompt, system_override.as_deref()).await
                        }
                    }
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .zip(prompts.iter())
            .map(|(joined, prompt)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!(prompt = %prompt, error = ?e, "Generation task did not complete");
                    GenerationResult::Fallback(fallback_markdown(prompt))
                }
            })
            .collect()
    }
}

/// Interleave `results` (one per prompt item, in order) with the heading items.
///
/// A heading whose depth is at most `split_depth` closes the current section and
/// opens a new one; prompts before the first such heading form an unheaded leading
/// section.
pub fn assemble_document(
    items: &[PromptItem],
    results: Vec<GenerationResult>,
    split_depth: usize,
) -> Document {
    let mut sections = Vec::new();
    let mut current = DocumentSection::default();
    let mut results = results.into_iter();

    for item in items {
        if item.is_heading() {
            if item.depth <= split_depth && !current.is_empty() {
                sections.push(std::mem::take(&mut current));
            }
            current.blocks.push(SectionBlock::Heading {
                depth: item.depth,
                line: item.text.clone(),
            });
        } else if let Some(result) = results.next() {
            current.blocks.push(SectionBlock::Content(result));
        }
    }
    if !current.is_empty() {
        sections.push(current);
    }
    debug!(sections = sections.len(), "Assembled document sections");
    Document { sections }
}
