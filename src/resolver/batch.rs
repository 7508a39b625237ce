use std::sync::Arc;

use futures::future::join_all;
use tracing::debug;

use crate::document::{Document, SharedImageElement};
use crate::resolver::FormatResolver;

impl FormatResolver {
    /// Resolves every eligible element of the document and returns how many
    /// were dispatched by this invocation.
    ///
    /// Elements already marked processed, and elements with no usable path,
    /// are skipped; skipped-for-no-path elements stay unmarked. Each
    /// eligible element is marked processed under its lock before its
    /// resolution is dispatched, so a concurrent batch over the same
    /// document can never double-process one. All dispatched resolutions run
    /// concurrently and commit out of order; this call returns only once
    /// every one of them has settled.
    pub async fn process_all(&self, document: &Document) -> usize {
        let mut dispatched: Vec<SharedImageElement> = Vec::new();
        for handle in document.elements() {
            let mut element = handle.lock().expect("element lock poisoned");
            if element.is_processed() || element.original_path().is_none() {
                continue;
            }
            element.mark_processed();
            drop(element);
            dispatched.push(Arc::clone(handle));
        }

        let count = dispatched.len();
        join_all(
            dispatched
                .iter()
                .map(|handle| self.resolve_element(handle)),
        )
        .await;

        debug!(count, total = document.len(), "image batch settled");
        count
    }
}
