pub mod batch;

use std::sync::Arc;

use tracing::debug;

use crate::capability::CapabilityDetector;
use crate::config::ResolverConfig;
use crate::document::{FormatOutcome, SharedImageElement};
use crate::probe::SharedImageProbe;

/// Terminal result of one resolution: the path to commit plus which branch
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub path: String,
    pub outcome: FormatOutcome,
}

impl Resolution {
    fn original(path: &str) -> Self {
        Self {
            path: path.to_string(),
            outcome: FormatOutcome::Original,
        }
    }
}

/// Derives the optimized-variant candidate for an original asset path.
///
/// The candidate differs from the original only when the path sits under the
/// configured asset root (and not already under the optimized root) and its
/// trailing extension case-insensitively matches one of the configured
/// source extensions. Everything else passes through unchanged, which the
/// decision procedure reads as "no optimized mapping applies".
pub fn derive_candidate_path(config: &ResolverConfig, original: &str) -> String {
    let passthrough = original.to_string();

    let optimized_prefix = format!("{}/", config.optimized_root);
    if original.starts_with(optimized_prefix.as_str()) {
        return passthrough;
    }
    let asset_prefix = format!("{}/", config.asset_root);
    let Some(rest) = original.strip_prefix(asset_prefix.as_str()) else {
        return passthrough;
    };
    let Some(dot) = rest.rfind('.') else {
        return passthrough;
    };
    let extension = &rest[dot + 1..];
    if extension.contains('/') || !config.matches_source_extension(extension) {
        return passthrough;
    }

    format!(
        "{}/{}.{}",
        config.optimized_root,
        &rest[..dot],
        config.optimized_extension
    )
}

/// Per-image decision procedure gated by the capability detector. Never
/// errors: every failure mode resolves into a definite path commitment.
pub struct FormatResolver {
    config: ResolverConfig,
    detector: Arc<CapabilityDetector>,
    probe: SharedImageProbe,
}

impl FormatResolver {
    pub fn new(
        config: ResolverConfig,
        detector: Arc<CapabilityDetector>,
        probe: SharedImageProbe,
    ) -> Self {
        Self {
            config,
            detector,
            probe,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn detector(&self) -> &Arc<CapabilityDetector> {
        &self.detector
    }

    /// Resolves one original path to the path that should be committed.
    ///
    /// Unsupported runtime: the original, no probe issued. Supported with a
    /// distinct candidate: one existence probe decides; a failed probe falls
    /// back to the original. Supported with no applicable mapping: the
    /// original, no probe issued.
    pub async fn resolve(&self, original_path: &str) -> Resolution {
        if !self.detector.detect().await.is_supported() {
            return Resolution::original(original_path);
        }

        let candidate = derive_candidate_path(&self.config, original_path);
        if candidate == original_path {
            return Resolution::original(original_path);
        }

        if self.probe.exists(candidate.as_str()).await {
            Resolution {
                path: candidate,
                outcome: FormatOutcome::Optimized,
            }
        } else {
            debug!(
                original_path,
                candidate = candidate.as_str(),
                "optimized variant absent, keeping original"
            );
            Resolution::original(original_path)
        }
    }

    /// Resolves a live element and commits the result to it. Returns `None`
    /// when the element carries no usable path.
    pub async fn resolve_element(&self, element: &SharedImageElement) -> Option<Resolution> {
        let original = element
            .lock()
            .expect("element lock poisoned")
            .original_path()
            .map(str::to_string)?;
        let resolution = self.resolve(original.as_str()).await;
        element
            .lock()
            .expect("element lock poisoned")
            .commit(resolution.path.clone(), resolution.outcome);
        Some(resolution)
    }
}
