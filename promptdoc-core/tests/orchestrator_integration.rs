use async_trait::async_trait;
use promptdoc_core::config::RunConfig;
use promptdoc_core::contract::{
    GenerationError, GenerationRequest, GenerationResult, MockTextBackend, Role, TextBackend,
};
use promptdoc_core::document::SectionBlock;
use promptdoc_core::generator::{fallback_markdown, placeholder_markdown, ContentGenerator};
use promptdoc_core::orchestrator::{assemble_document, Orchestrator, RunMode};
use promptdoc_core::prompt_source::PromptSource;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Backend that answers `<ANSWER to: prompt>` after a per-prompt delay and
/// records how many calls were in flight at once.
#[derive(Default)]
struct InstrumentedBackend {
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: Mutex<Vec<String>>,
    fail_on: Option<String>,
}

impl InstrumentedBackend {
    fn failing_on(prompt: &str) -> Self {
        Self {
            fail_on: Some(prompt.to_string()),
            ..Self::default()
        }
    }

    fn delay_for(prompt: &str) -> Duration {
        // Earlier prompts sleep longer so completion order is reversed.
        let n: u64 = prompt
            .trim_start_matches("prompt ")
            .parse()
            .unwrap_or(0);
        Duration::from_millis(5 + (30u64.saturating_sub(n)) * 3)
    }
}

#[async_trait]
impl TextBackend for InstrumentedBackend {
    async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let prompt = request.user_text().unwrap_or_default().trim().to_string();
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.lock().unwrap().push(prompt.clone());

        tokio::time::sleep(Self::delay_for(&prompt)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if self.fail_on.as_deref() == Some(prompt.as_str()) {
            return Err(GenerationError::RequestFailed("simulated outage".into()));
        }
        Ok(format!("<ANSWER to: {prompt}>"))
    }
}

fn orchestrator<B: TextBackend + 'static>(backend: Arc<B>, concurrency: usize) -> Orchestrator<B> {
    let config = RunConfig {
        concurrency,
        ..RunConfig::default()
    };
    Orchestrator::new(ContentGenerator::new(backend, &config), concurrency)
}

fn numbered_prompts(n: usize) -> String {
    (0..n).map(|i| format!("prompt {i}\n")).collect()
}

#[tokio::test]
async fn output_order_matches_submission_order() {
    let backend = Arc::new(InstrumentedBackend::default());
    let source = PromptSource::from_flat_text(&numbered_prompts(12));

    let document = orchestrator(backend.clone(), 12).run(&source, RunMode::Real).await;

    let texts: Vec<String> = document
        .sections
        .iter()
        .flat_map(|s| s.contents())
        .map(|r| r.text().to_string())
        .collect();
    let expected: Vec<String> = (0..12)
        .map(|i| format!("Prompt: prompt {i}\n\n<ANSWER to: prompt {i}>"))
        .collect();
    assert_eq!(texts, expected);
}

#[tokio::test]
async fn never_exceeds_concurrency_limit() {
    let backend = Arc::new(InstrumentedBackend::default());
    let source = PromptSource::from_flat_text(&numbered_prompts(25));

    let document = orchestrator(backend.clone(), 4).run(&source, RunMode::Real).await;

    assert_eq!(document.prompt_count(), 25);
    assert_eq!(backend.calls.lock().unwrap().len(), 25);
    let max = backend.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 4, "observed {max} concurrent calls with a limit of 4");
    assert!(max >= 2, "expected some parallelism, observed {max}");
}

#[tokio::test]
async fn zero_concurrency_is_clamped_to_one() {
    let backend = Arc::new(InstrumentedBackend::default());
    let source = PromptSource::from_flat_text(&numbered_prompts(3));

    let orch = orchestrator(backend.clone(), 0);
    assert_eq!(orch.concurrency(), 1);
    orch.run(&source, RunMode::Real).await;
    assert_eq!(backend.max_in_flight.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn headers_pass_through_and_are_never_sent() {
    let backend = Arc::new(InstrumentedBackend::default());
    let source = PromptSource::from_flat_text("# Intro\nprompt 1\n## Details *here*\nprompt 2\n");

    let document = orchestrator(backend.clone(), 2).run(&source, RunMode::Real).await;

    let calls = backend.calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2);
    assert!(calls.iter().all(|c| !c.starts_with('#')));
    assert_eq!(document.sections[0].heading(), Some("# Intro"));
    assert_eq!(document.sections[1].heading(), Some("## Details *here*"));
}

#[tokio::test]
async fn single_failure_is_isolated() {
    let backend = Arc::new(InstrumentedBackend::failing_on("prompt 3"));
    let source = PromptSource::from_flat_text(&numbered_prompts(6));

    let document = orchestrator(backend, 3).run(&source, RunMode::Real).await;

    let results: Vec<&GenerationResult> = document.sections.iter().flat_map(|s| s.contents()).collect();
    assert_eq!(results.len(), 6);
    for (i, result) in results.iter().enumerate() {
        if i == 3 {
            assert_eq!(
                **result,
                GenerationResult::Fallback(fallback_markdown("prompt 3"))
            );
        } else {
            assert_eq!(
                **result,
                GenerationResult::Markdown(format!("Prompt: prompt {i}\n\n<ANSWER to: prompt {i}>"))
            );
        }
    }
    assert_eq!(document.fallback_count(), 1);
}

#[tokio::test]
async fn end_to_end_sections_split_at_headers() {
    let mut backend = MockTextBackend::new();
    backend.expect_complete().times(3).returning(|req| {
        let prompt = req.user_text().unwrap_or_default().trim().to_string();
        Ok(format!("<ANSWER to: {prompt}>"))
    });
    let source =
        PromptSource::from_flat_text("# Intro\nWhat is X?\nWhy does X matter?\n# Outro\nSummarize.");

    let document = orchestrator(Arc::new(backend), 2).run(&source, RunMode::Real).await;

    assert_eq!(document.sections.len(), 2);
    let intro = &document.sections[0];
    assert_eq!(intro.heading(), Some("# Intro"));
    let intro_texts: Vec<&str> = intro.contents().map(|r| r.text()).collect();
    assert_eq!(
        intro_texts,
        vec![
            "Prompt: What is X?\n\n<ANSWER to: What is X?>",
            "Prompt: Why does X matter?\n\n<ANSWER to: Why does X matter?>",
        ]
    );
    let outro = &document.sections[1];
    assert_eq!(outro.heading(), Some("# Outro"));
    let outro_texts: Vec<&str> = outro.contents().map(|r| r.text()).collect();
    assert_eq!(outro_texts, vec!["Prompt: Summarize.\n\n<ANSWER to: Summarize.>"]);
}

#[tokio::test]
async fn prompts_before_first_header_form_leading_section() {
    let source = PromptSource::from_flat_text("Lead question\n# Body\nInner question\n");
    let document = orchestrator(Arc::new(InstrumentedBackend::default()), 2)
        .run(&source, RunMode::Dry)
        .await;

    assert_eq!(document.sections.len(), 2);
    assert_eq!(document.sections[0].heading(), None);
    assert_eq!(
        document.sections[0].blocks,
        vec![SectionBlock::Content(GenerationResult::Markdown(
            placeholder_markdown("Lead question")
        ))]
    );
    assert_eq!(document.sections[1].heading(), Some("# Body"));
}

#[tokio::test]
async fn dry_mode_never_calls_backend() {
    let mut backend = MockTextBackend::new();
    backend.expect_complete().never();
    let source = PromptSource::from_flat_text("# A\none\ntwo\n");

    let document = orchestrator(Arc::new(backend), 2).run(&source, RunMode::Dry).await;

    assert_eq!(document.prompt_count(), 2);
    assert!(document
        .sections
        .iter()
        .flat_map(|s| s.contents())
        .all(|r| r.text().ends_with("_test placeholder_")));
}

#[tokio::test]
async fn system_override_is_sent_with_every_prompt() {
    let mut backend = MockTextBackend::new();
    backend
        .expect_complete()
        .times(2)
        .withf(|req| {
            let systems: Vec<&str> = req
                .messages
                .iter()
                .filter(|m| m.role == Role::System)
                .map(|m| m.content.as_str())
                .collect();
            systems.len() == 2 && systems[1] == "Answer like a pirate."
        })
        .returning(|_| Ok("Arr.".to_string()));
    let source = PromptSource::from_flat_text("```system\nAnswer like a pirate.\n```\nQ1\nQ2\n");

    let document = orchestrator(Arc::new(backend), 2).run(&source, RunMode::Real).await;
    assert_eq!(document.fallback_count(), 0);
}

#[tokio::test]
async fn empty_backend_answer_falls_back() {
    let mut backend = MockTextBackend::new();
    backend.expect_complete().returning(|_| Ok("   \n".to_string()));
    let source = PromptSource::from_flat_text("Q\n");

    let document = orchestrator(Arc::new(backend), 1).run(&source, RunMode::Real).await;
    assert_eq!(document.fallback_count(), 1);
    assert!(document.to_markdown().contains("*Error generating content.*"));
}

#[tokio::test]
async fn tree_sources_split_only_at_top_level_headings() {
    let source = PromptSource::from_yaml_str(
        "Part One:\n  Chapter A:\n    - q1\n  Chapter B:\n    - q2\nPart Two:\n  - q3\n",
    )
    .unwrap();
    let document = orchestrator(Arc::new(InstrumentedBackend::default()), 3)
        .run(&source, RunMode::Dry)
        .await;

    assert_eq!(document.sections.len(), 2);
    let first = document.sections[0].to_markdown();
    assert!(first.starts_with("# Part One\n\n## Chapter A\n\nPrompt: q1"));
    assert!(first.contains("## Chapter B"));
    assert_eq!(document.sections[1].heading(), Some("# Part Two"));
}

#[test]
fn assemble_ignores_missing_results() {
    let source = PromptSource::from_flat_text("# H\na\nb\n");
    let document = assemble_document(
        &source.items,
        vec![GenerationResult::Markdown("only one".into())],
        usize::MAX,
    );
    assert_eq!(document.prompt_count(), 1);
}
