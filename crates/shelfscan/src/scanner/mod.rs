//! Decoder abstraction and detection handling.
//!
//! A [`Decoder`] turns some input (a camera stream, a keyboard-wedge hand
//! scanner, a scripted feed) into [`DecoderEvent`]s delivered over a channel:
//! one `Processed` event per analysed frame and a `Detected` event for each
//! successful decode. The rest of the crate depends only on this trait.

pub mod bridge;
pub mod feed;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::ScannerConfig;
use crate::error::Result;
use crate::symbology::Symbology;

pub use bridge::DetectionBridge;
pub use feed::TextFeedDecoder;

/// A point on the video frame, in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position.
    pub x: f64,
    /// Vertical position.
    pub y: f64,
}

impl Point {
    /// Create a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Analysis result for one processed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameResult {
    /// Outlines of every region that looked like a barcode.
    pub boxes: Vec<Vec<Point>>,
    /// Outline of the best-matching region.
    #[serde(rename = "box")]
    pub best: Option<Vec<Point>>,
    /// Decoded symbol, when decoding succeeded on this frame.
    pub code: Option<String>,
    /// Symbology of `code`, when known.
    pub format: Option<Symbology>,
    /// Scan line the symbol was decoded along.
    pub line: Option<Vec<Point>>,
}

impl FrameResult {
    /// A frame result carrying only a decoded symbol and no geometry.
    #[must_use]
    pub fn decoded(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }
}

/// A successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Decoded symbol text.
    pub code: String,
    /// Symbology the symbol was read as, when known.
    pub format: Option<Symbology>,
}

impl Detection {
    /// Create a detection of unknown symbology.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            format: None,
        }
    }
}

/// Events a decoder delivers, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// A frame was analysed. `None` when the frame produced no result at all.
    Processed(Option<FrameResult>),
    /// A symbol was decoded.
    Detected(Detection),
}

/// Capability interface over a barcode decoding facility.
///
/// Implementations deliver events through the sender handed to [`init`]
/// until the input ends, at which point they drop the sender. While paused
/// a decoder must not deliver any events.
///
/// [`init`]: Decoder::init
#[async_trait::async_trait]
pub trait Decoder: std::fmt::Debug + Send {
    /// The name of this decoder (for logging/debugging).
    fn name(&self) -> &'static str;

    /// Acquire the input and start delivering events.
    ///
    /// # Errors
    ///
    /// Returns an error if the input cannot be acquired, for example when
    /// camera permission is denied. The decoder stays inactive.
    async fn init(
        &mut self,
        config: &ScannerConfig,
        events: mpsc::Sender<DecoderEvent>,
    ) -> Result<()>;

    /// Suspend event delivery.
    fn pause(&mut self);

    /// Resume event delivery.
    fn resume(&mut self);

    /// Check if event delivery is suspended.
    fn is_paused(&self) -> bool;
}
