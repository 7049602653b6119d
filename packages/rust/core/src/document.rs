//! Assembling streamed chunks into the final post.

use std::collections::BTreeSet;

use blogsmith_shared::GeneratedChunk;

/// Collects chunks into one Markdown document.
///
/// Content is concatenated in arrival order. Sources from every chunk are
/// unioned and, when requested and non-empty, appended as a sorted
/// `## Sources` list.
#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    include_sources: bool,
    content: String,
    sources: BTreeSet<String>,
}

impl DocumentBuilder {
    pub fn new(include_sources: bool) -> Self {
        Self {
            include_sources,
            ..Self::default()
        }
    }

    pub fn push(&mut self, chunk: &GeneratedChunk) {
        self.content.push_str(&chunk.content);
        if let Some(sources) = &chunk.sources {
            self.sources.extend(sources.iter().cloned());
        }
    }

    /// The post text received so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sources(&self) -> &BTreeSet<String> {
        &self.sources
    }

    /// The trailing sources section, or an empty string when none applies.
    pub fn sources_section(&self) -> String {
        if !self.include_sources || self.sources.is_empty() {
            return String::new();
        }

        let mut section = String::from("\n\n## Sources\n");
        for source in &self.sources {
            section.push_str("- ");
            section.push_str(source);
            section.push('\n');
        }
        section
    }

    pub fn finish(self) -> String {
        let section = self.sources_section();
        let mut doc = self.content;
        doc.push_str(&section);
        doc
    }
}
