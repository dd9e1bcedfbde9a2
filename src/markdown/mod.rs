//! Markdown parsing module
//!
//! Finds the rendered blocks of a markdown document and their source spans
//! using the comrak library, a CommonMark + GFM compatible parser. The blocks
//! are the sync anchors shared by the editor and the preview.
//!
//! # Example
//! ```ignore
//! use crate::markdown::{extract_anchor_blocks, BlockKind};
//!
//! let blocks = extract_anchor_blocks("# Hello\n\nThis is **bold** text.");
//! assert_eq!(blocks[0].kind, BlockKind::Heading(1));
//! ```

mod parser;

pub use parser::{
    extract_anchor_blocks, extract_anchor_blocks_with_options, AnchorBlock, BlockKind,
    MarkdownOptions,
};
