use promptdoc_core::config::{OutputFormat, RunConfig};
use promptdoc_core::contract::{DocumentWriter, GenerationResult, WriteError};
use promptdoc_core::document::{Document, DocumentSection, SectionBlock};
use promptdoc_core::generator::{fallback_markdown, success_markdown};
use promptdoc_core::writer::FileWriter;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn sample_document() -> Document {
    Document {
        sections: vec![
            DocumentSection {
                blocks: vec![
                    SectionBlock::Heading {
                        depth: 1,
                        line: "# Basics".into(),
                    },
                    SectionBlock::Content(GenerationResult::Markdown(success_markdown(
                        "What is a tensor?",
                        "**Tensor**\n\nA multi-dimensional array.",
                    ))),
                    SectionBlock::Content(GenerationResult::Fallback(fallback_markdown(
                        "Why do GPUs help?",
                    ))),
                ],
            },
            DocumentSection {
                blocks: vec![
                    SectionBlock::Heading {
                        depth: 1,
                        line: "# Advanced".into(),
                    },
                    SectionBlock::Content(GenerationResult::Markdown(success_markdown(
                        "Explain autograd.",
                        "It records operations.",
                    ))),
                ],
            },
        ],
    }
}

fn writer_for(format: OutputFormat) -> FileWriter {
    FileWriter::new(&RunConfig {
        format,
        ..RunConfig::default()
    })
}

/// Stand-in converter: records its argv and stdin next to itself, then writes
/// a marker to the `--output` path.
#[cfg(unix)]
fn fake_pandoc(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("pandoc");
    let body = format!(
        "#!/bin/sh\n\
         printf '%s\\n' \"$@\" > '{args}'\n\
         cat > '{stdin}'\n\
         out=''\n\
         prev=''\n\
         for a in \"$@\"; do\n\
         \x20 if [ \"$prev\" = '--output' ]; then out=\"$a\"; fi\n\
         \x20 prev=\"$a\"\n\
         done\n\
         printf 'converted' > \"$out\"\n",
        args = dir.join("args.txt").display(),
        stdin = dir.join("stdin.md").display(),
    );
    fs::write(&script, body).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[cfg(unix)]
fn recorded_args(dir: &Path) -> Vec<String> {
    fs::read_to_string(dir.join("args.txt"))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn markdown_output_joins_sections_with_rules() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("guide.md");

    writer_for(OutputFormat::Md)
        .write(&sample_document(), &path)
        .expect("markdown write succeeds");

    let written = fs::read_to_string(&path).unwrap();
    assert_eq!(written, sample_document().to_markdown());
    assert!(written.starts_with("# Basics\n\nPrompt: What is a tensor?"));
    assert!(written.contains("Why do GPUs help?\n\n*Error generating content.*\n\n---\n\n# Advanced"));
}

#[test]
fn pdf_output_is_a_pdf_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("out").join("guide.pdf");

    writer_for(OutputFormat::Pdf)
        .write(&sample_document(), &path)
        .expect("pdf write succeeds");

    let bytes = fs::read(&path).unwrap();
    assert!(bytes.starts_with(b"%PDF"), "missing PDF header");
}

#[test]
fn missing_pandoc_is_a_converter_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("guide.docx");

    let err = writer_for(OutputFormat::Docx)
        .with_pandoc("/nonexistent/bin/pandoc")
        .write(&sample_document(), &path)
        .unwrap_err();

    assert!(matches!(err, WriteError::Converter(_)), "got {err:?}");
    assert!(!path.exists());
}

#[cfg(unix)]
#[test]
fn docx_is_converted_with_toc_depth_and_without_css() {
    let tools = tempdir().unwrap();
    let out = tempdir().unwrap();
    let path = out.path().join("guide.docx");
    let writer = FileWriter::new(&RunConfig {
        format: OutputFormat::Docx,
        toc_level: 2,
        css: Some(PathBuf::from("book.css")),
        ..RunConfig::default()
    })
    .with_pandoc(fake_pandoc(tools.path()));

    writer
        .write(&sample_document(), &path)
        .expect("conversion succeeds");

    assert_eq!(fs::read_to_string(&path).unwrap(), "converted");
    assert_eq!(
        recorded_args(tools.path()),
        vec![
            "--from".to_string(),
            "markdown".into(),
            "--to".into(),
            "docx".into(),
            "--output".into(),
            path.display().to_string(),
            "--toc".into(),
            "--toc-depth=2".into(),
        ]
    );
    let piped = fs::read_to_string(tools.path().join("stdin.md")).unwrap();
    assert_eq!(piped, sample_document().to_markdown());
}

#[cfg(unix)]
#[test]
fn epub_conversion_forwards_stylesheet() {
    let tools = tempdir().unwrap();
    let out = tempdir().unwrap();
    let path = out.path().join("guide.epub");
    let writer = FileWriter::new(&RunConfig {
        format: OutputFormat::Epub,
        css: Some(PathBuf::from("styles/book.css")),
        ..RunConfig::default()
    })
    .with_pandoc(fake_pandoc(tools.path()));

    writer
        .write(&sample_document(), &path)
        .expect("conversion succeeds");

    let args = recorded_args(tools.path());
    assert!(args.contains(&"--to".to_string()));
    assert!(args.contains(&"epub".to_string()));
    assert!(args.contains(&"--toc-depth=3".to_string()));
    assert_eq!(&args[args.len() - 2..], ["--css", "styles/book.css"]);
    assert!(path.exists());
}

#[cfg(unix)]
#[test]
fn failing_converter_reports_its_stderr() {
    use std::os::unix::fs::PermissionsExt;

    let tools = tempdir().unwrap();
    let script = tools.path().join("pandoc");
    fs::write(&script, "#!/bin/sh\ncat > /dev/null\necho 'unknown writer' >&2\nexit 3\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let err = writer_for(OutputFormat::Epub)
        .with_pandoc(&script)
        .write(&sample_document(), &tools.path().join("guide.epub"))
        .unwrap_err();

    match err {
        WriteError::Converter(msg) => assert!(msg.contains("unknown writer"), "got {msg}"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn stylesheet_only_applies_to_epub() {
    let css = Some(PathBuf::from("book.css"));
    let for_format = |format| {
        FileWriter::new(&RunConfig {
            format,
            css: css.clone(),
            ..RunConfig::default()
        })
    };
    assert_eq!(
        for_format(OutputFormat::Epub).stylesheet(),
        Some(Path::new("book.css"))
    );
    assert_eq!(for_format(OutputFormat::Pdf).stylesheet(), None);
    assert_eq!(for_format(OutputFormat::Docx).stylesheet(), None);
}

#[test]
fn empty_document_is_rejected() {
    let dir = tempdir().unwrap();
    let err = writer_for(OutputFormat::Md)
        .write(&Document::default(), &dir.path().join("empty.md"))
        .unwrap_err();
    assert!(matches!(err, WriteError::EmptyDocument));
}

#[test]
fn output_extension_is_appended_when_missing() {
    let md = OutputFormat::Md;
    assert_eq!(md.ensure_extension(Path::new("result")), PathBuf::from("result.md"));
    assert_eq!(md.ensure_extension(Path::new("notes.MD")), PathBuf::from("notes.MD"));
    assert_eq!(
        OutputFormat::Epub.ensure_extension(Path::new("book.pdf")),
        PathBuf::from("book.pdf.epub")
    );
    assert_eq!("markdown".parse::<OutputFormat>(), Ok(OutputFormat::Md));
    assert!("odt".parse::<OutputFormat>().is_err());
}
