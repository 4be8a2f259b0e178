//! Prompt source reader: turns a prompt file into an ordered list of headings and prompts.
//!
//! Two on-disk formats are understood:
//!
//! - **Flat** text: one prompt per non-empty line, lines starting with `#` are headings
//!   that pass through verbatim. An optional fenced block opened by a line
//!   ```` ```system ```` and closed by a line ```` ``` ```` carries a system prompt
//!   override for every prompt of the file. Only the first such block is honored.
//! - **Tree** YAML (`.yaml`/`.yml`): mapping keys become headings whose depth is
//!   their nesting level, sequences recurse at the same depth, scalars are prompts.
//!
//! Both formats end up as a [`PromptSource`]: the ordered [`PromptItem`]s the
//! orchestrator walks, plus the optional override.

use regex::Regex;
use serde_yaml::Value;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, error, info};

static SYSTEM_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*```system[ \t]*\r?\n((?s:.*?))^[ \t]*```[ \t]*\r?(?:\n|\z)")
        .expect("system block pattern is valid")
});

/// A node of a structured prompt tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptNode {
    Leaf(String),
    Section {
        title: String,
        children: Vec<PromptNode>,
    },
}

/// A line of a flat prompt file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatLine {
    Header(String),
    Prompt(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Heading,
    Prompt,
}

/// One entry of the flattened walk. For headings `text` is the full Markdown heading line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptItem {
    pub depth: usize,
    pub kind: ItemKind,
    pub text: String,
}

impl PromptItem {
    pub fn heading(depth: usize, line: impl Into<String>) -> Self {
        Self {
            depth,
            kind: ItemKind::Heading,
            text: line.into(),
        }
    }

    pub fn prompt(depth: usize, text: impl Into<String>) -> Self {
        Self {
            depth,
            kind: ItemKind::Prompt,
            text: text.into(),
        }
    }

    pub fn is_heading(&self) -> bool {
        self.kind == ItemKind::Heading
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Flat,
    Tree,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                SourceFormat::Tree
            }
            _ => SourceFormat::Flat,
        }
    }
}

/// The parsed content of one prompt file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSource {
    pub format: SourceFormat,
    pub items: Vec<PromptItem>,
    pub system_override: Option<String>,
}

impl PromptSource {
    /// Parse flat prompt text, extracting the system override block first.
    pub fn from_flat_text(text: &str) -> Self {
        let (system_override, body) = extract_system_override(text);
        let items = parse_flat_lines(&body)
            .into_iter()
            .map(|line| match line {
                FlatLine::Header(h) => {
                    let depth = h.chars().take_while(|c| *c == '#').count();
                    PromptItem::heading(depth, h)
                }
                FlatLine::Prompt(p) => PromptItem::prompt(0, p),
            })
            .collect();
        Self {
            format: SourceFormat::Flat,
            items,
            system_override,
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, PromptSourceError> {
        let value: Value = serde_yaml::from_str(text).map_err(PromptSourceError::Yaml)?;
        Ok(Self::from_tree(&yaml_to_nodes(&value)))
    }

    pub fn from_tree(nodes: &[PromptNode]) -> Self {
        Self {
            format: SourceFormat::Tree,
            items: flatten_tree(nodes, 1),
            system_override: None,
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.items.iter().filter(|i| !i.is_heading()).count()
    }

    /// Headings at or above this depth start a new document section.
    pub fn section_split_depth(&self) -> usize {
        match self.format {
            SourceFormat::Flat => usize::MAX,
            SourceFormat::Tree => 1,
        }
    }
}

#[derive(Debug)]
pub enum PromptSourceError {
    Io { path: PathBuf, source: std::io::Error },
    Yaml(serde_yaml::Error),
    Empty(PathBuf),
}

impl fmt::Display for PromptSourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptSourceError::Io { path, source } => {
                write!(f, "failed to read prompt file {}: {source}", path.display())
            }
            PromptSourceError::Yaml(e) => write!(f, "failed to parse prompt YAML: {e}"),
            PromptSourceError::Empty(path) => {
                write!(f, "prompt file {} contains no prompts", path.display())
            }
        }
    }
}

impl std::error::Error for PromptSourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PromptSourceError::Io { source, .. } => Some(source),
            PromptSourceError::Yaml(e) => Some(e),
            PromptSourceError::Empty(_) => None,
        }
    }
}

/// Split off the first ```` ```system ```` block.
///
/// Returns the trimmed block content and the text with the whole fenced region removed.
/// Without a block the text is returned unchanged.
pub fn extract_system_override(text: &str) -> (Option<String>, String) {
    match SYSTEM_BLOCK.captures(text) {
        Some(caps) => {
            let (Some(whole), Some(inner)) = (caps.get(0), caps.get(1)) else {
                return (None, text.to_string());
            };
            let mut body = String::with_capacity(text.len());
            body.push_str(&text[..whole.start()]);
            body.push_str(&text[whole.end()..]);
            (Some(inner.as_str().trim().to_string()), body)
        }
        None => (None, text.to_string()),
    }
}

pub fn parse_flat_lines(body: &str) -> Vec<FlatLine> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| {
            if l.starts_with('#') {
                FlatLine::Header(l.to_string())
            } else {
                FlatLine::Prompt(l.to_string())
            }
        })
        .collect()
}

pub fn yaml_to_nodes(value: &Value) -> Vec<PromptNode> {
    match value {
        Value::Mapping(map) => map
            .iter()
            .map(|(key, val)| PromptNode::Section {
                title: scalar_to_string(key),
                children: yaml_to_nodes(val),
            })
            .collect(),
        Value::Sequence(seq) => seq.iter().flat_map(yaml_to_nodes).collect(),
        Value::Null => Vec::new(),
        Value::Tagged(tagged) => yaml_to_nodes(&tagged.value),
        scalar => vec![PromptNode::Leaf(scalar_to_string(scalar))],
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

/// Depth-first walk; section titles become `#`-headings at `depth`.
pub fn flatten_tree(nodes: &[PromptNode], depth: usize) -> Vec<PromptItem> {
    let mut items = Vec::new();
    for node in nodes {
        match node {
            PromptNode::Leaf(text) => items.push(PromptItem::prompt(depth, text.clone())),
            PromptNode::Section { title, children } => {
                items.push(PromptItem::heading(
                    depth,
                    format!("{} {}", "#".repeat(depth), title),
                ));
                items.extend(flatten_tree(children, depth + 1));
            }
        }
    }
    items
}

/// Load a prompt file from disk, picking the format from its extension.
pub fn load_prompt_source<P: AsRef<Path>>(path: P) -> Result<PromptSource, PromptSourceError> {
    let path = path.as_ref();
    info!(path = %path.display(), "Loading prompt source");

    let content = fs::read_to_string(path).map_err(|e| {
        error!(error = ?e, path = %path.display(), "Failed to read prompt file");
        PromptSourceError::Io {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    let source = match SourceFormat::from_path(path) {
        SourceFormat::Flat => PromptSource::from_flat_text(&content),
        SourceFormat::Tree => PromptSource::from_yaml_str(&content).map_err(|e| {
            error!(error = %e, path = %path.display(), "Failed to parse prompt YAML");
            e
        })?,
    };

    if source.prompt_count() == 0 {
        error!(path = %path.display(), "Prompt file contains no prompts");
        return Err(PromptSourceError::Empty(path.to_path_buf()));
    }

    debug!(
        items = source.items.len(),
        has_override = source.system_override.is_some(),
        "Parsed prompt items"
    );
    info!(
        path = %path.display(),
        prompts = source.prompt_count(),
        format = ?source.format,
        "Prompt source loaded"
    );
    Ok(source)
}
