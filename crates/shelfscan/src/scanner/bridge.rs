//! Detection de-duplication.

use tracing::debug;

use super::{Decoder, Detection};

/// Turns the decoder's detection stream into a single current barcode.
///
/// A detection is accepted only when its symbol differs from the last
/// accepted one. Accepting pauses the decoder and raises a one-shot
/// "just detected" flag for the overlay.
#[derive(Debug, Default)]
pub struct DetectionBridge {
    current: Option<String>,
    just_detected: bool,
}

impl DetectionBridge {
    /// Create a bridge with no current barcode.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a raw detection.
    ///
    /// Returns the symbol to reconcile when the detection is accepted, and
    /// `None` when it repeats the current barcode.
    pub fn offer<D: Decoder + ?Sized>(
        &mut self,
        detection: &Detection,
        decoder: &mut D,
    ) -> Option<String> {
        if self.current.as_deref() == Some(detection.code.as_str()) {
            debug!(code = %detection.code, "Ignoring repeat detection");
            return None;
        }

        self.current = Some(detection.code.clone());
        self.just_detected = true;
        decoder.pause();
        debug!(code = %detection.code, format = ?detection.format, "Accepted detection");
        Some(detection.code.clone())
    }

    /// The last accepted barcode.
    #[must_use]
    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Forget the current barcode so the same symbol can be accepted again.
    pub fn clear(&mut self) {
        self.current = None;
    }

    /// Consume the "just detected" flag.
    pub fn take_just_detected(&mut self) -> bool {
        std::mem::take(&mut self.just_detected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testing::MockDecoder;

    #[test]
    fn test_first_detection_accepted_and_pauses() {
        let mut bridge = DetectionBridge::new();
        let mut decoder = MockDecoder::default();

        let accepted = bridge.offer(&Detection::new("111"), &mut decoder);
        assert_eq!(accepted.as_deref(), Some("111"));
        assert_eq!(bridge.current(), Some("111"));
        assert!(decoder.is_paused());
    }

    #[test]
    fn test_repeat_detection_ignored() {
        let mut bridge = DetectionBridge::new();
        let mut decoder = MockDecoder::default();

        bridge.offer(&Detection::new("111"), &mut decoder);
        decoder.resume();
        assert!(bridge.offer(&Detection::new("111"), &mut decoder).is_none());
        assert!(!decoder.is_paused());
        assert_eq!(decoder.pauses, 1);
    }

    #[test]
    fn test_previously_seen_symbol_accepted_after_change() {
        let mut bridge = DetectionBridge::new();
        let mut decoder = MockDecoder::default();

        assert!(bridge.offer(&Detection::new("A"), &mut decoder).is_some());
        assert!(bridge.offer(&Detection::new("B"), &mut decoder).is_some());
        assert_eq!(
            bridge.offer(&Detection::new("A"), &mut decoder).as_deref(),
            Some("A")
        );
        assert_eq!(decoder.pauses, 3);
    }

    #[test]
    fn test_clear_allows_reacceptance() {
        let mut bridge = DetectionBridge::new();
        let mut decoder = MockDecoder::default();

        bridge.offer(&Detection::new("111"), &mut decoder);
        bridge.clear();
        assert!(bridge.current().is_none());
        assert!(bridge.offer(&Detection::new("111"), &mut decoder).is_some());
    }

    #[test]
    fn test_just_detected_is_one_shot() {
        let mut bridge = DetectionBridge::new();
        let mut decoder = MockDecoder::default();
        assert!(!bridge.take_just_detected());

        bridge.offer(&Detection::new("111"), &mut decoder);
        assert!(bridge.take_just_detected());
        assert!(!bridge.take_just_detected());

        // A repeat does not raise the flag again.
        bridge.offer(&Detection::new("111"), &mut decoder);
        assert!(!bridge.take_just_detected());
    }
}
