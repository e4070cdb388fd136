//! Local file loading and paragraph chunking.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};

use crate::config::FilesConfig;
use crate::core::context::ResearchContext;

/// File extensions accepted as research material.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "py", "js", "ts", "rs", "html", "css", "json", "yaml", "yml", "xml", "csv", "toml",
];

/// Returns true if the file extension is one of `SUPPORTED_EXTENSIONS`.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Reads one supported text file.
///
/// # Errors
/// Returns an error naming the file if its type is unsupported or it cannot
/// be read as UTF-8.
pub fn read_file(path: &Path) -> Result<String> {
    if !is_supported(path) {
        bail!(
            "Unsupported file type: {} (supported: {})",
            path.display(),
            SUPPORTED_EXTENSIONS.join(", ")
        );
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Loads files into a fresh research context, in the given order.
///
/// A file longer than `max_chars` contributes only its first chunk.
///
/// # Errors
/// Fails on the first file that cannot be read.
pub fn read_files<P: AsRef<Path>>(paths: &[P], config: &FilesConfig) -> Result<ResearchContext> {
    let mut context = ResearchContext::new();
    for path in paths {
        let path = path.as_ref();
        let content = read_file(path)?;
        let char_count = content.chars().count();
        let content = if char_count > config.max_chars {
            let first = chunk_text(&content, config.chunk_size, config.chunk_overlap)
                .into_iter()
                .next()
                .unwrap_or_default();
            tracing::info!(
                path = %path.display(),
                chars = char_count,
                kept = first.chars().count(),
                "file exceeds limit, using first chunk"
            );
            first
        } else {
            content
        };
        context.add_file(path, content);
    }
    Ok(context)
}

/// Splits text into chunks on paragraph boundaries.
///
/// A new chunk starts when the next paragraph would push the current one past
/// `chunk_size` characters. Each new chunk begins with the last `overlap`
/// characters of the previous one. A single paragraph longer than
/// `chunk_size` becomes its own chunk.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n") {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        let current_len = current.chars().count();
        let needed = paragraph.chars().count() + if current.is_empty() { 0 } else { 2 };
        if current_len > 0 && current_len + needed > chunk_size {
            let tail = tail_chars(&current, overlap);
            chunks.push(std::mem::take(&mut current));
            current = tail;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.trim().is_empty() {
        chunks.push(current);
    }
    chunks
}

fn tail_chars(text: &str, count: usize) -> String {
    let total = text.chars().count();
    text.chars().skip(total.saturating_sub(count)).collect()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::TempDir;

    use super::*;

    fn files_config(max_chars: usize) -> FilesConfig {
        FilesConfig {
            max_chars,
            chunk_size: 20,
            chunk_overlap: 5,
        }
    }

    #[test]
    fn test_chunk_text_keeps_short_text_whole() {
        let chunks = chunk_text("one\n\ntwo", 100, 10);
        assert_eq!(chunks, vec!["one\n\ntwo".to_string()]);
    }

    #[test]
    fn test_chunk_text_splits_on_paragraphs_with_overlap() {
        let text = "aaaaaaaaaa\n\nbbbbbbbbbb\n\ncccccccccc";
        let chunks = chunk_text(text, 24, 4);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], "aaaaaaaaaa\n\nbbbbbbbbbb");
        assert!(chunks[1].starts_with("bbbb\n\ncccccccccc"));
    }

    #[test]
    fn test_chunk_text_ignores_blank_input() {
        assert!(chunk_text("\n\n  \n\n", 10, 2).is_empty());
    }

    #[test]
    fn test_read_files_labels_content_by_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        fs::write(&path, "Sea levels are rising.").unwrap();

        let context = read_files(&[&path], &files_config(1000)).unwrap();
        assert_eq!(context.len(), 1);
        assert_eq!(
            context.render().unwrap(),
            "--- notes.md ---\n\nSea levels are rising."
        );
    }

    #[test]
    fn test_read_files_uses_first_chunk_of_long_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("long.txt");
        let mut file = fs::File::create(&path).unwrap();
        write!(file, "first para\n\nsecond para\n\nthird para").unwrap();

        let context = read_files(&[&path], &files_config(10)).unwrap();
        let text = &context.fragments()[0].text;
        assert_eq!(text, "first para");
    }

    #[test]
    fn test_unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image.png");
        fs::write(&path, [0u8, 1, 2]).unwrap();

        let err = read_files(&[&path], &files_config(1000)).unwrap_err();
        assert!(err.to_string().contains("image.png"));
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = read_file(Path::new("/nonexistent/delve/notes.txt")).unwrap_err();
        assert!(format!("{err:#}").contains("notes.txt"));
    }
}
