//! [`FrameEmitter`] – raw frame in, compressed image message out.
//!
//! For every frame the emitter
//!
//! 1. reverses the channel axis (the engine renders RGB, the image topic
//!    carries BGR-ordered data),
//! 2. encodes the result through an [`ImageEncoder`] (JPEG by default),
//! 3. publishes a [`CompressedImage`] whose `format` is the encoder's tag.
//!
//! Encoding failures are always fatal.  Transport failures are fatal once
//! `failure_limit` of them happen back to back; below that they are logged
//! and the frame is dropped.  Publishing with nobody subscribed is not a
//! failure.

use image::ExtendedColorType;
use image::codecs::jpeg;
use simbridge_middleware::Publisher;
use simbridge_types::{BridgeError, CompressedImage, EventPayload, Frame, PixelEncoding};
use tracing::{debug, error, warn};

/// Default JPEG quality (OpenCV's default for `imencode`).
pub const DEFAULT_JPEG_QUALITY: u8 = 95;

// ─────────────────────────────────────────────────────────────────────────────
// Encoders
// ─────────────────────────────────────────────────────────────────────────────

/// Turns a raw frame into a compressed byte stream.
pub trait ImageEncoder: Send {
    /// Codec tag written into [`CompressedImage::format`].
    fn format(&self) -> &str;

    /// Encode `frame`, which the encoder may reuse as scratch space.  The
    /// frame's [`PixelEncoding`] says how its bytes are ordered; the output
    /// must carry the colours faithfully.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Encode`] when the frame cannot be encoded.
    fn encode(&self, frame: Frame) -> Result<Vec<u8>, BridgeError>;
}

/// Baseline JPEG via the `image` crate.
#[derive(Debug, Clone)]
pub struct JpegEncoder {
    quality: u8,
}

impl JpegEncoder {
    /// # Errors
    ///
    /// Returns [`BridgeError::Config`] when `quality` is outside `1..=100`.
    pub fn new(quality: u8) -> Result<Self, BridgeError> {
        if !(1..=100).contains(&quality) {
            return Err(BridgeError::Config(format!(
                "jpeg quality must be within 1..=100, got {quality}"
            )));
        }
        Ok(Self { quality })
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageEncoder for JpegEncoder {
    fn format(&self) -> &str {
        "jpeg"
    }

    fn encode(&self, frame: Frame) -> Result<Vec<u8>, BridgeError> {
        if frame.data.len() != frame.expected_len() {
            return Err(BridgeError::Encode(format!(
                "frame buffer is {} bytes, expected {}",
                frame.data.len(),
                frame.expected_len()
            )));
        }
        // The codec only speaks RGB; BGR input is swapped back in place.
        let rgb = match frame.encoding {
            PixelEncoding::Rgb8 => frame,
            PixelEncoding::Bgr8 => frame.into_reversed_channels()?,
        };

        let mut out = Vec::with_capacity(rgb.data.len() / 8);
        jpeg::JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(&rgb.data, rgb.width, rgb.height, ExtendedColorType::Rgb8)
            .map_err(|e| BridgeError::Encode(e.to_string()))?;
        Ok(out)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FrameEmitter
// ─────────────────────────────────────────────────────────────────────────────

/// Converts, encodes and publishes frames on one image topic.
pub struct FrameEmitter {
    encoder: Box<dyn ImageEncoder>,
    publisher: Box<dyn Publisher>,
    failure_limit: u32,
    consecutive_failures: u32,
    emitted: u64,
}

impl FrameEmitter {
    /// `failure_limit` is clamped to at least one: the first failure is
    /// fatal when it is `1`.
    pub fn new(
        encoder: Box<dyn ImageEncoder>,
        publisher: Box<dyn Publisher>,
        failure_limit: u32,
    ) -> Self {
        Self {
            encoder,
            publisher,
            failure_limit: failure_limit.max(1),
            consecutive_failures: 0,
            emitted: 0,
        }
    }

    pub fn topic(&self) -> &str {
        self.publisher.topic()
    }

    /// Frames successfully handed to the transport so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    /// Convert, encode and publish one frame.  Returns how many subscribers
    /// received it.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Encode`] when conversion or encoding fails.
    /// - [`BridgeError::Transport`] once `failure_limit` consecutive publish
    ///   attempts have failed.
    pub fn emit(&mut self, frame: Frame) -> Result<usize, BridgeError> {
        let bgr = match frame.encoding {
            PixelEncoding::Rgb8 => frame.into_reversed_channels()?,
            PixelEncoding::Bgr8 => frame,
        };
        let data = self.encoder.encode(bgr)?;
        let bytes = data.len();
        let message = CompressedImage {
            format: self.encoder.format().to_string(),
            data,
        };

        match self.publisher.publish(EventPayload::CompressedImage(message)) {
            Ok(receivers) => {
                self.consecutive_failures = 0;
                self.emitted += 1;
                debug!(topic = self.topic(), bytes, receivers, "frame published");
                Ok(receivers)
            }
            Err(e) => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_limit {
                    error!(
                        topic = self.topic(),
                        failures = self.consecutive_failures,
                        error = %e,
                        "image transport failed"
                    );
                    Err(BridgeError::Transport(format!(
                        "{} consecutive publish failures on {}: {e}",
                        self.consecutive_failures,
                        self.topic()
                    )))
                } else {
                    warn!(
                        topic = self.topic(),
                        failures = self.consecutive_failures,
                        limit = self.failure_limit,
                        error = %e,
                        "dropping frame after publish failure"
                    );
                    Ok(0)
                }
            }
        }
    }
}

impl std::fmt::Debug for FrameEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameEmitter")
            .field("format", &self.encoder.format())
            .field("topic", &self.publisher.topic())
            .field("failure_limit", &self.failure_limit)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("emitted", &self.emitted)
            .finish()
    }
}
