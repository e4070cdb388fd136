//! Research context: the text material every reasoning stage can see.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where a context fragment came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Provenance {
    /// A user-supplied file.
    File { path: PathBuf },
    /// Summaries returned by a web search.
    Search { query: String },
    /// Extracted page content.
    Extract { url: String },
    /// Free-form material supplied by the caller.
    Note,
}

/// One piece of context text with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    pub provenance: Provenance,
    pub text: String,
}

impl Fragment {
    fn render(&self) -> String {
        match &self.provenance {
            Provenance::File { path } => {
                let name = path
                    .file_name()
                    .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
                format!("--- {name} ---\n\n{}", self.text)
            }
            Provenance::Search { query } => {
                format!("Search results for \"{query}\":\n{}", self.text)
            }
            Provenance::Extract { url } => format!("Content from {url}:\n{}", self.text),
            Provenance::Note => self.text.clone(),
        }
    }
}

/// Append-only, ordered collection of context fragments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchContext {
    fragments: Vec<Fragment>,
}

impl ResearchContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a fragment. Blank text is ignored.
    pub fn push(&mut self, provenance: Provenance, text: impl Into<String>) {
        let text = text.into();
        if text.trim().is_empty() {
            return;
        }
        self.fragments.push(Fragment { provenance, text });
    }

    pub fn add_file(&mut self, path: &Path, content: impl Into<String>) {
        self.push(
            Provenance::File {
                path: path.to_path_buf(),
            },
            content,
        );
    }

    pub fn add_note(&mut self, text: impl Into<String>) {
        self.push(Provenance::Note, text);
    }

    /// Appends every fragment of `other`, preserving order.
    pub fn extend(&mut self, other: ResearchContext) {
        self.fragments.extend(other.fragments);
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Renders all fragments as one text block, or `None` when empty.
    pub fn render(&self) -> Option<String> {
        if self.fragments.is_empty() {
            return None;
        }
        Some(
            self.fragments
                .iter()
                .map(Fragment::render)
                .collect::<Vec<_>>()
                .join("\n\n"),
        )
    }
}
