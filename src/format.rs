//! Flattens structured OCR output into display text.

use serde::Deserialize;

use crate::recognition::TextBlock;

/// Separators used when flattening recognized text.
///
/// The default joins lines within a block with a space and keeps a line break
/// only between blocks.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FormatPolicy {
    pub word_separator: String,
    pub line_separator: String,
    pub block_separator: String,
}

impl Default for FormatPolicy {
    fn default() -> Self {
        Self {
            word_separator: " ".into(),
            line_separator: " ".into(),
            block_separator: "\n".into(),
        }
    }
}

/// Joins words, then lines, then blocks, in the order the recognizer produced them.
pub fn format(blocks: &[TextBlock], policy: &FormatPolicy) -> String {
    blocks
        .iter()
        .map(|block| {
            block
                .lines
                .iter()
                .map(|line| line.words.join(&policy.word_separator))
                .collect::<Vec<_>>()
                .join(&policy.line_separator)
        })
        .collect::<Vec<_>>()
        .join(&policy.block_separator)
}
