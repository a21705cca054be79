//! Document corpus loading and section chunking.

use crate::error::CopilotError;
use std::path::Path;
use tracing::{debug, warn};
use unicode_normalization::UnicodeNormalization;
use walkdir::WalkDir;

/// A section of a corpus document
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `<file-stem>::chunk<i>`
    pub id: String,
    /// File name the chunk came from
    pub source: String,
    pub text: String,
}

/// Lowercased alphanumeric terms after NFKC normalization.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text.nfkc().collect::<String>().to_lowercase();
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split one markdown document into sections on second-level headings.
///
/// Section indices count every split piece, so ids stay stable when a blank section is skipped.
pub fn chunk_document(file_name: &str, content: &str) -> Vec<Chunk> {
    let stem = file_name.strip_suffix(".md").unwrap_or(file_name);
    content
        .split("\n## ")
        .enumerate()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(i, text)| {
            let text = if text.starts_with('#') {
                text.to_string()
            } else {
                format!("## {}", text)
            };
            Chunk {
                id: format!("{}::chunk{}", stem, i),
                source: file_name.to_string(),
                text,
            }
        })
        .collect()
}

/// Read every `*.md` file directly inside `docs_dir`, ordered by file name.
pub fn load_documents(docs_dir: &Path) -> Result<Vec<(String, String)>, CopilotError> {
    if !docs_dir.is_dir() {
        return Err(CopilotError::CorpusError(format!(
            "Docs directory not found: {}",
            docs_dir.display()
        )));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(docs_dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| CopilotError::CorpusError(e.to_string()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("md")
        {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        let content = std::fs::read_to_string(path)?;
        debug!(file = %file_name, bytes = content.len(), "Loaded corpus document");
        documents.push((file_name, content));
    }

    if documents.is_empty() {
        warn!(docs_dir = %docs_dir.display(), "Docs directory contains no markdown documents");
    }
    Ok(documents)
}
