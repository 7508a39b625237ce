use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use image::ImageFormat;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Fixed, pre-encoded WebP probe payload: a 66-byte RIFF/VP8 bitstream with
/// intrinsic dimensions 2x2. A runtime counts as WebP-capable only when it
/// decodes this exact payload to an image of height 2.
pub const PROBE_PAYLOAD_BASE64: &str =
    "UklGRjoAAABXRUJQVlA4IC4AAACyAgCdASoCAAIALmk0mk0iIiIiIgBoSygABc6WWgAA/veff/0PP8bA//LwYAAA";

pub const EXPECTED_PROBE_HEIGHT: u32 = 2;

pub fn probe_payload() -> Vec<u8> {
    BASE64_STANDARD
        .decode(PROBE_PAYLOAD_BASE64)
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportStatus {
    Unknown,
    Supported,
    Unsupported,
}

impl SupportStatus {
    pub fn is_supported(self) -> bool {
        matches!(self, SupportStatus::Supported)
    }
}

/// Seam between the detector and the runtime's actual decoding facility.
/// Returns the decoded intrinsic dimensions, or `None` when the payload does
/// not decode at all.
pub trait PayloadDecoder: Send + Sync {
    fn decode_dimensions(&self, payload: &[u8]) -> Option<(u32, u32)>;
}

pub type SharedPayloadDecoder = Arc<dyn PayloadDecoder>;

/// Default decoder backed by the `image` crate's WebP support.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebpPayloadDecoder;

impl PayloadDecoder for WebpPayloadDecoder {
    fn decode_dimensions(&self, payload: &[u8]) -> Option<(u32, u32)> {
        image::load_from_memory_with_format(payload, ImageFormat::WebP)
            .ok()
            .map(|decoded| (decoded.width(), decoded.height()))
    }
}

/// Process-wide WebP capability check with a write-once memo. The first
/// caller runs the payload probe; concurrent first callers coalesce onto the
/// same probe; every later call returns the cached status without
/// re-evaluating. There is no invalidation path: capability is assumed
/// static for the process lifetime.
pub struct CapabilityDetector {
    decoder: SharedPayloadDecoder,
    memo: OnceCell<SupportStatus>,
}

impl CapabilityDetector {
    pub fn new() -> Self {
        Self::with_decoder(Arc::new(WebpPayloadDecoder))
    }

    pub fn with_decoder(decoder: SharedPayloadDecoder) -> Self {
        Self {
            decoder,
            memo: OnceCell::new(),
        }
    }

    /// Resolves and memoizes the capability. Never errors: an undecodable or
    /// wrong-sized probe payload reads as `Unsupported`.
    pub async fn detect(&self) -> SupportStatus {
        *self
            .memo
            .get_or_init(|| async { self.run_probe() })
            .await
    }

    /// Current memo without forcing the probe.
    pub fn status(&self) -> SupportStatus {
        self.memo.get().copied().unwrap_or(SupportStatus::Unknown)
    }

    fn run_probe(&self) -> SupportStatus {
        let payload = probe_payload();
        let status = match self.decoder.decode_dimensions(payload.as_slice()) {
            Some((_, height)) if height == EXPECTED_PROBE_HEIGHT => SupportStatus::Supported,
            Some((width, height)) => {
                debug!(width, height, "probe payload decoded with unexpected dimensions");
                SupportStatus::Unsupported
            }
            None => {
                debug!("probe payload failed to decode");
                SupportStatus::Unsupported
            }
        };
        info!(?status, "webp capability resolved");
        status
    }
}

impl Default for CapabilityDetector {
    fn default() -> Self {
        Self::new()
    }
}
