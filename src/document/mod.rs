use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which path ended up committed to an element. Serialized into the
/// element's outcome marker as `"optimized"` / `"original"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatOutcome {
    Optimized,
    Original,
}

impl FormatOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatOutcome::Optimized => "optimized",
            FormatOutcome::Original => "original",
        }
    }
}

/// One image-bearing element of the consumed document. The resolver mutates
/// `src`, `processed` and `outcome`; it never creates or destroys elements.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageElement {
    src: Option<String>,
    staged_src: Option<String>,
    processed: bool,
    outcome: Option<FormatOutcome>,
}

impl ImageElement {
    pub fn with_src(src: impl Into<String>) -> Self {
        Self {
            src: Some(src.into()),
            ..Self::default()
        }
    }

    pub fn with_staged_src(staged_src: impl Into<String>) -> Self {
        Self {
            staged_src: Some(staged_src.into()),
            ..Self::default()
        }
    }

    pub fn src(&self) -> Option<&str> {
        self.src.as_deref()
    }

    /// The path the resolution decision starts from: the staged lazy-load
    /// attribute when present, otherwise whatever `src` already holds.
    pub fn original_path(&self) -> Option<&str> {
        self.staged_src
            .as_deref()
            .or(self.src.as_deref())
            .map(str::trim)
            .filter(|path| !path.is_empty())
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn mark_processed(&mut self) {
        self.processed = true;
    }

    pub fn outcome(&self) -> Option<FormatOutcome> {
        self.outcome
    }

    /// Terminal write: the chosen path lands in `src`, the outcome marker is
    /// set, and the element's resolution task is over.
    pub fn commit(&mut self, path: impl Into<String>, outcome: FormatOutcome) {
        self.src = Some(path.into());
        self.outcome = Some(outcome);
    }
}

/// Elements are committed out of order by concurrent resolution tasks, so
/// the document hands out shared handles rather than references.
pub type SharedImageElement = Arc<Mutex<ImageElement>>;

#[derive(Debug, Clone, Default)]
pub struct Document {
    elements: Vec<SharedImageElement>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: impl IntoIterator<Item = ImageElement>) -> Self {
        Self {
            elements: elements
                .into_iter()
                .map(|element| Arc::new(Mutex::new(element)))
                .collect(),
        }
    }

    pub fn push(&mut self, element: ImageElement) -> SharedImageElement {
        let handle = Arc::new(Mutex::new(element));
        self.elements.push(Arc::clone(&handle));
        handle
    }

    pub fn elements(&self) -> &[SharedImageElement] {
        self.elements.as_slice()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Plain copies of the current element states, for reporting.
    pub fn snapshot(&self) -> Vec<ImageElement> {
        self.elements
            .iter()
            .map(|handle| handle.lock().expect("element lock poisoned").clone())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_src: Option<String>,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read image manifest '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse image manifest JSON '{path}': {message}")]
    ParseJson { path: String, message: String },
}

/// Loads a JSON array of `{ "src": ..., "staged_src": ... }` objects into a
/// document. Entries carrying neither attribute are kept; the orchestrator
/// skips them as pathless.
pub fn load_document_manifest(path: &Path) -> Result<Document, ManifestError> {
    let raw = fs::read_to_string(path).map_err(|e| ManifestError::ReadFile {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(raw.as_str()).map_err(|e| ManifestError::ParseJson {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

    Ok(Document::from_elements(entries.into_iter().map(|entry| {
        ImageElement {
            src: entry.src,
            staged_src: entry.staged_src,
            ..ImageElement::default()
        }
    })))
}
