//! The assembled document: an ordered list of sections, each an ordered list of blocks.
//!
//! A section is the unit a page-oriented writer starts on a fresh page.

use crate::contract::GenerationResult;
use crate::generator::BLOCK_SEPARATOR;

/// Joins sections when the document is flattened to one Markdown string.
pub const SECTION_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionBlock {
    /// A heading line reproduced verbatim from the prompt source.
    Heading { depth: usize, line: String },
    Content(GenerationResult),
}

impl SectionBlock {
    pub fn markdown(&self) -> &str {
        match self {
            SectionBlock::Heading { line, .. } => line,
            SectionBlock::Content(result) => result.text(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSection {
    pub blocks: Vec<SectionBlock>,
}

impl DocumentSection {
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// The heading that opened this section; `None` for an unheaded leading section.
    pub fn heading(&self) -> Option<&str> {
        match self.blocks.first() {
            Some(SectionBlock::Heading { line, .. }) => Some(line),
            _ => None,
        }
    }

    pub fn contents(&self) -> impl Iterator<Item = &GenerationResult> {
        self.blocks.iter().filter_map(|b| match b {
            SectionBlock::Content(r) => Some(r),
            SectionBlock::Heading { .. } => None,
        })
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let mut previous_was_content = false;
        for block in &self.blocks {
            let is_content = matches!(block, SectionBlock::Content(_));
            if !md.is_empty() {
                md.push_str(if previous_was_content && is_content {
                    BLOCK_SEPARATOR
                } else {
                    "\n\n"
                });
            }
            md.push_str(block.markdown());
            previous_was_content = is_content;
        }
        md
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    pub sections: Vec<DocumentSection>,
}

impl Document {
    pub fn prompt_count(&self) -> usize {
        self.sections.iter().map(|s| s.contents().count()).sum()
    }

    pub fn fallback_count(&self) -> usize {
        self.sections
            .iter()
            .flat_map(|s| s.contents())
            .filter(|r| r.is_fallback())
            .count()
    }

    pub fn to_markdown(&self) -> String {
        self.sections
            .iter()
            .map(DocumentSection::to_markdown)
            .collect::<Vec<_>>()
            .join(SECTION_SEPARATOR)
    }
}
