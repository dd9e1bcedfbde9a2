//! Anchor block extraction using comrak
//!
//! This module wraps comrak's parser to find the block-level elements the
//! preview renders as separate boxes, together with their source positions.
//! Each block becomes one sync anchor.

use comrak::{
    nodes::{AstNode, NodeValue},
    parse_document, Arena, Options,
};
use serde::Serialize;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration options for markdown parsing.
#[derive(Debug, Clone)]
pub struct MarkdownOptions {
    /// Enable GitHub Flavored Markdown tables
    pub tables: bool,
    /// Enable strikethrough syntax (~~text~~)
    pub strikethrough: bool,
    /// Enable autolink URLs and emails
    pub autolink: bool,
    /// Enable task lists (- [ ] and - [x])
    pub tasklist: bool,
    /// Enable footnotes
    pub footnotes: bool,
    /// Enable front matter (YAML/TOML)
    pub front_matter_delimiter: Option<String>,
}

impl Default for MarkdownOptions {
    fn default() -> Self {
        Self {
            tables: true,
            strikethrough: true,
            autolink: true,
            tasklist: true,
            footnotes: true,
            front_matter_delimiter: Some("---".to_string()),
        }
    }
}

impl MarkdownOptions {
    /// Convert to comrak Options.
    fn to_comrak_options(&self) -> Options {
        let mut options = Options::default();

        options.extension.strikethrough = self.strikethrough;
        options.extension.table = self.tables;
        options.extension.autolink = self.autolink;
        options.extension.tasklist = self.tasklist;
        options.extension.footnotes = self.footnotes;
        options.extension.front_matter_delimiter = self.front_matter_delimiter.clone();

        options
    }
}

/// Kind of rendered block an anchor stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    CodeBlock,
    HtmlBlock,
    ThematicBreak,
    Table,
}

impl BlockKind {
    pub fn label(self) -> &'static str {
        match self {
            BlockKind::Heading(_) => "heading",
            BlockKind::Paragraph => "paragraph",
            BlockKind::CodeBlock => "code",
            BlockKind::HtmlBlock => "html",
            BlockKind::ThematicBreak => "rule",
            BlockKind::Table => "table",
        }
    }
}

/// A leaf block with its source span.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorBlock {
    /// Index in document order
    pub sequence: u64,
    pub kind: BlockKind,
    /// Start line (1-indexed)
    pub start_line: usize,
    /// End line (1-indexed, inclusive)
    pub end_line: usize,
    /// Start character offset (0-indexed)
    pub start_offset: usize,
    /// End character offset (0-indexed, exclusive)
    pub end_offset: usize,
}

impl AnchorBlock {
    /// Number of source lines the block covers.
    pub fn line_count(&self) -> usize {
        self.end_line.saturating_sub(self.start_line) + 1
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Extract anchor blocks with default options.
///
/// # Example
/// ```ignore
/// let blocks = extract_anchor_blocks("# Title\n\nBody");
/// assert_eq!(blocks[1].start_line, 3);
/// ```
pub fn extract_anchor_blocks(markdown: &str) -> Vec<AnchorBlock> {
    extract_anchor_blocks_with_options(markdown, &MarkdownOptions::default())
}

/// Extract anchor blocks with custom options.
///
/// Containers (lists, list items, block quotes) are not anchors themselves;
/// the leaves inside them are.
pub fn extract_anchor_blocks_with_options(
    markdown: &str,
    options: &MarkdownOptions,
) -> Vec<AnchorBlock> {
    let arena = Arena::new();
    let comrak_options = options.to_comrak_options();
    let root = parse_document(&arena, markdown, &comrak_options);
    let index = SourceIndex::new(markdown);

    let mut blocks = Vec::new();
    for node in root.descendants() {
        let Some(kind) = block_kind(node) else {
            continue;
        };
        let pos = node.data.borrow().sourcepos;
        if pos.start.line == 0 {
            continue;
        }
        let end_line = pos.end.line.max(pos.start.line);
        blocks.push(AnchorBlock {
            sequence: blocks.len() as u64,
            kind,
            start_line: pos.start.line,
            end_line,
            start_offset: index.start_offset(pos.start.line, pos.start.column),
            end_offset: index.end_offset(end_line, pos.end.column),
        });
    }
    blocks
}

fn block_kind<'a>(node: &'a AstNode<'a>) -> Option<BlockKind> {
    match &node.data.borrow().value {
        NodeValue::Heading(heading) => Some(BlockKind::Heading(heading.level)),
        NodeValue::Paragraph => Some(BlockKind::Paragraph),
        NodeValue::CodeBlock(_) => Some(BlockKind::CodeBlock),
        NodeValue::HtmlBlock(_) => Some(BlockKind::HtmlBlock),
        NodeValue::ThematicBreak => Some(BlockKind::ThematicBreak),
        NodeValue::Table(..) => Some(BlockKind::Table),
        _ => None,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Source Positions
// ─────────────────────────────────────────────────────────────────────────────

/// Converts comrak's (line, byte column) positions to character offsets.
struct SourceIndex<'a> {
    text: &'a str,
    /// Byte offset of each line start
    line_bytes: Vec<usize>,
    /// Character offset of each line start
    line_chars: Vec<usize>,
}

impl<'a> SourceIndex<'a> {
    fn new(text: &'a str) -> Self {
        let mut line_bytes = vec![0];
        let mut line_chars = vec![0];
        for (chars, (byte, ch)) in text.char_indices().enumerate() {
            if ch == '\n' {
                line_bytes.push(byte + 1);
                line_chars.push(chars + 1);
            }
        }
        Self {
            text,
            line_bytes,
            line_chars,
        }
    }

    fn line_end(&self, line_idx: usize) -> usize {
        self.line_bytes
            .get(line_idx + 1)
            .map_or(self.text.len(), |next| next - 1)
    }

    /// Character offset of the byte at `column` (1-based) on `line` (1-based),
    /// snapped back to a character boundary.
    fn char_at(&self, line: usize, column: usize) -> (usize, usize) {
        let line_idx = line
            .saturating_sub(1)
            .min(self.line_bytes.len().saturating_sub(1));
        let start = self.line_bytes[line_idx];
        let mut byte = (start + column.saturating_sub(1)).min(self.line_end(line_idx));
        while !self.text.is_char_boundary(byte) {
            byte -= 1;
        }
        let chars = self.line_chars[line_idx] + self.text[start..byte].chars().count();
        (byte, chars)
    }

    fn start_offset(&self, line: usize, column: usize) -> usize {
        self.char_at(line, column).1
    }

    /// Exclusive end offset for an inclusive end column.
    fn end_offset(&self, line: usize, column: usize) -> usize {
        if column == 0 {
            return self.char_at(line, 1).1;
        }
        let (byte, chars) = self.char_at(line, column);
        if byte < self.text.len() && !self.text[byte..].starts_with('\n') {
            chars + 1
        } else {
            chars
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_has_no_blocks() {
        assert!(extract_anchor_blocks("").is_empty());
    }

    #[test]
    fn test_heading_and_paragraph() {
        let blocks = extract_anchor_blocks("# Title\n\nBody text\n");
        assert_eq!(blocks.len(), 2);

        assert_eq!(blocks[0].kind, BlockKind::Heading(1));
        assert_eq!(blocks[0].start_line, 1);
        assert_eq!(blocks[0].start_offset, 0);
        assert_eq!(blocks[0].end_offset, 7);

        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
        assert_eq!(blocks[1].start_line, 3);
        assert_eq!(blocks[1].start_offset, 9);
        assert_eq!(blocks[1].sequence, 1);
    }

    #[test]
    fn test_sequence_in_document_order() {
        let blocks = extract_anchor_blocks("# A\n\none\n\n## B\n\ntwo\n\n---\n");
        let sequences: Vec<u64> = blocks.iter().map(|b| b.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        let lines: Vec<usize> = blocks.iter().map(|b| b.start_line).collect();
        assert!(lines.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(blocks[4].kind, BlockKind::ThematicBreak);
    }

    #[test]
    fn test_fenced_code_spans_lines() {
        let blocks = extract_anchor_blocks("```rust\nfn main() {}\nlet x = 1;\n```\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::CodeBlock);
        assert_eq!(blocks[0].start_line, 1);
        assert_eq!(blocks[0].end_line, 4);
        assert_eq!(blocks[0].line_count(), 4);
        assert!(blocks[0].end_offset > blocks[0].start_offset);
    }

    #[test]
    fn test_list_items_yield_their_paragraphs() {
        let blocks = extract_anchor_blocks("- one\n- two\n\n> quoted\n");
        let kinds: Vec<BlockKind> = blocks.iter().map(|b| b.kind).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::Paragraph,
                BlockKind::Paragraph,
                BlockKind::Paragraph
            ]
        );
        assert_eq!(blocks[0].start_line, 1);
        assert_eq!(blocks[1].start_line, 2);
        assert_eq!(blocks[2].start_line, 4);
    }

    #[test]
    fn test_table_is_one_block() {
        let blocks = extract_anchor_blocks("| a | b |\n|---|---|\n| 1 | 2 |\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Table);
        assert_eq!(blocks[0].end_line, 3);
    }

    #[test]
    fn test_front_matter_is_not_an_anchor() {
        let blocks = extract_anchor_blocks("---\ntitle: x\n---\n\n# Heading\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].kind, BlockKind::Heading(1));
    }

    #[test]
    fn test_offsets_count_characters() {
        let text = "# Überschrift\n\nwörld\n";
        let blocks = extract_anchor_blocks(text);
        assert_eq!(blocks[1].start_offset, 15);
        let total = text.chars().count();
        for block in &blocks {
            assert!(block.start_offset < block.end_offset);
            assert!(block.end_offset <= total);
        }
    }

    #[test]
    fn test_source_index_snaps_to_char_boundary() {
        let index = SourceIndex::new("aé\nb");
        // Column 3 is the second byte of 'é'
        assert_eq!(index.start_offset(1, 3), 1);
        assert_eq!(index.start_offset(2, 1), 3);
        assert_eq!(index.end_offset(2, 1), 4);
    }
}
