//! Grounding-context assembly.
//!
//! Renders retrieved passages into the single context string handed to the
//! generation backend. The output depends only on the ordered input, and
//! the retriever's ranking order is kept (most similar first).

use crate::models::Passage;

/// Placed between consecutive passages.
pub const PASSAGE_SEPARATOR: &str = "\n\n---\n\n";

/// Render passages as `[title](url)\n<content>` joined by [`PASSAGE_SEPARATOR`].
pub fn assemble(passages: &[Passage]) -> String {
    passages
        .iter()
        .map(|p| format!("[{}]({})\n{}", p.title, p.url, p.content))
        .collect::<Vec<_>>()
        .join(PASSAGE_SEPARATOR)
}
