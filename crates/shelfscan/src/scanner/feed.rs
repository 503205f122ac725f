//! Text-feed decoder.
//!
//! Keyboard-wedge hand scanners type the decoded symbol followed by Enter,
//! so the "decode" already happened in hardware. This decoder consumes such
//! lines, checks them against the enabled symbologies and reports them the
//! same way a camera decoder would. A line starting with `{` is read as a
//! JSON [`FrameResult`], which lets an external camera pipeline feed boxes
//! and scan lines through the same path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{Decoder, DecoderEvent, Detection, FrameResult};
use crate::config::ScannerConfig;
use crate::error::{Error, Result};
use crate::symbology::{self, Symbology};

/// A cloneable pause switch shared between the decoder and its pump task.
#[derive(Debug, Clone, Default)]
pub struct PauseHandle {
    paused: Arc<AtomicBool>,
}

impl PauseHandle {
    /// Create a handle in the running state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend delivery.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    /// Resume delivery.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Check if delivery is suspended.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Decoder over a stream of text lines.
///
/// Every line read is counted once the pump is done with it, whether it was
/// delivered, filtered out or discarded while paused. See [`Self::progress`].
#[derive(Debug)]
pub struct TextFeedDecoder {
    lines: Option<mpsc::Receiver<String>>,
    consumed: Option<watch::Sender<u64>>,
    progress: watch::Receiver<u64>,
    handle: PauseHandle,
    task: Option<JoinHandle<()>>,
}

impl TextFeedDecoder {
    /// Create a decoder that reads lines from `lines` once initialized.
    #[must_use]
    pub fn new(lines: mpsc::Receiver<String>) -> Self {
        let (consumed, progress) = watch::channel(0);
        Self {
            lines: Some(lines),
            consumed: Some(consumed),
            progress,
            handle: PauseHandle::new(),
            task: None,
        }
    }

    /// A handle sharing this decoder's pause state.
    #[must_use]
    pub fn handle(&self) -> PauseHandle {
        self.handle.clone()
    }

    /// Count of lines the pump has finished with.
    ///
    /// Events for a line are queued before its count is published. The
    /// channel closes when the pump stops.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<u64> {
        self.progress.clone()
    }

    /// Check if the pump task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TextFeedDecoder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl Decoder for TextFeedDecoder {
    fn name(&self) -> &'static str {
        "text-feed"
    }

    async fn init(
        &mut self,
        config: &ScannerConfig,
        events: mpsc::Sender<DecoderEvent>,
    ) -> Result<()> {
        let (Some(mut lines), Some(consumed)) = (self.lines.take(), self.consumed.take()) else {
            return Err(Error::decoder_init(self.name(), "already initialized"));
        };
        let filter = SymbolFilter {
            readers: config.readers.clone(),
            verify_check_digits: config.verify_check_digits,
        };
        let handle = self.handle.clone();

        self.task = Some(tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                let open = pump_line(&line, &handle, &filter, &events).await;
                consumed.send_modify(|count| *count += 1);
                if !open {
                    break;
                }
            }
            debug!("Text feed ended");
        }));

        debug!(readers = ?config.readers, "Text feed decoder started");
        Ok(())
    }

    fn pause(&mut self) {
        self.handle.pause();
    }

    fn resume(&mut self) {
        self.handle.resume();
    }

    fn is_paused(&self) -> bool {
        self.handle.is_paused()
    }
}

/// Deliver the events for one line. Returns `false` once the receiver is gone.
async fn pump_line(
    line: &str,
    handle: &PauseHandle,
    filter: &SymbolFilter,
    events: &mpsc::Sender<DecoderEvent>,
) -> bool {
    if handle.is_paused() {
        trace!("Discarding input while paused");
        return true;
    }
    let Some(mut frame) = parse_line(line) else {
        return true;
    };
    let detection = filter.apply(&mut frame);

    if events.send(DecoderEvent::Processed(Some(frame))).await.is_err() {
        return false;
    }
    match detection {
        Some(detection) => events.send(DecoderEvent::Detected(detection)).await.is_ok(),
        None => true,
    }
}

/// Interpret one input line. Blank lines and malformed JSON yield `None`.
fn parse_line(line: &str) -> Option<FrameResult> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('{') {
        return match serde_json::from_str::<FrameResult>(line) {
            Ok(frame) => Some(frame),
            Err(e) => {
                warn!("Ignoring malformed frame: {}", e);
                None
            }
        };
    }
    Some(FrameResult::decoded(line))
}

#[derive(Debug)]
struct SymbolFilter {
    readers: Vec<Symbology>,
    verify_check_digits: bool,
}

impl SymbolFilter {
    /// Keep the frame's code only if an enabled symbology accepts it.
    fn apply(&self, frame: &mut FrameResult) -> Option<Detection> {
        let code = frame.code.take()?.trim().to_string();
        if code.is_empty() {
            return None;
        }

        let format = match frame.format {
            Some(format) if self.readers.contains(&format) => Some(format),
            Some(format) => {
                debug!(%code, %format, "Dropping symbol of disabled symbology");
                None
            }
            None => symbology::accept(&code, &self.readers, self.verify_check_digits),
        };

        let Some(format) = format else {
            debug!(%code, "Dropping unreadable symbol");
            return None;
        };

        frame.code = Some(code.clone());
        frame.format = Some(format);
        Some(Detection {
            code,
            format: Some(format),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::Point;

    fn config() -> ScannerConfig {
        ScannerConfig::default()
    }

    async fn started() -> (
        TextFeedDecoder,
        mpsc::Sender<String>,
        mpsc::Receiver<DecoderEvent>,
    ) {
        let (line_tx, line_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(16);
        let mut decoder = TextFeedDecoder::new(line_rx);
        decoder.init(&config(), event_tx).await.unwrap();
        (decoder, line_tx, event_rx)
    }

    #[test]
    fn test_parse_line() {
        assert!(parse_line("   ").is_none());
        assert_eq!(parse_line(" 111 \n"), Some(FrameResult::decoded("111")));
        assert!(parse_line("{not json").is_none());

        let frame = parse_line(r#"{"box":[{"x":1,"y":1}]}"#).unwrap();
        assert_eq!(frame.best, Some(vec![Point::new(1.0, 1.0)]));
        assert!(frame.code.is_none());
    }

    #[test]
    fn test_pause_handle_shared() {
        let handle = PauseHandle::new();
        let other = handle.clone();
        assert!(!other.is_paused());
        handle.pause();
        assert!(other.is_paused());
        handle.resume();
        assert!(!other.is_paused());
    }

    #[tokio::test]
    async fn test_symbol_line_emits_processed_then_detected() {
        let (_decoder, lines, mut events) = started().await;
        lines.send("012345678905".to_string()).await.unwrap();

        match events.recv().await.unwrap() {
            DecoderEvent::Processed(Some(frame)) => {
                assert_eq!(frame.code.as_deref(), Some("012345678905"));
                assert_eq!(frame.format, Some(Symbology::Upc));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(
            events.recv().await.unwrap(),
            DecoderEvent::Detected(Detection {
                code: "012345678905".to_string(),
                format: Some(Symbology::Upc),
            })
        );
    }

    #[tokio::test]
    async fn test_bad_check_digit_is_processed_but_not_detected() {
        let (_decoder, lines, mut events) = started().await;
        lines.send("012345678904".to_string()).await.unwrap();
        lines.send("111".to_string()).await.unwrap();

        match events.recv().await.unwrap() {
            DecoderEvent::Processed(Some(frame)) => assert!(frame.code.is_none()),
            other => panic!("unexpected event: {other:?}"),
        }
        // "111" reads as Code 39 and is the next detection.
        assert!(matches!(
            events.recv().await.unwrap(),
            DecoderEvent::Processed(Some(_))
        ));
        match events.recv().await.unwrap() {
            DecoderEvent::Detected(detection) => assert_eq!(detection.code, "111"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_paused_decoder_delivers_nothing() {
        let (mut decoder, lines, mut events) = started().await;
        decoder.pause();
        assert!(decoder.is_paused());
        lines.send("111".to_string()).await.unwrap();
        drop(lines);

        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_resumed_decoder_delivers_again() {
        let (mut decoder, lines, mut events) = started().await;
        decoder.pause();
        decoder.resume();
        lines.send("222".to_string()).await.unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            DecoderEvent::Processed(Some(_))
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            DecoderEvent::Detected(_)
        ));
    }

    #[tokio::test]
    async fn test_feed_end_closes_event_channel() {
        let (decoder, lines, mut events) = started().await;
        drop(lines);
        assert!(events.recv().await.is_none());
        drop(decoder);
    }

    #[tokio::test]
    async fn test_progress_counts_every_line() {
        let (mut decoder, lines, mut events) = started().await;
        let mut progress = decoder.progress();

        lines.send("111".to_string()).await.unwrap();
        lines.send("   ".to_string()).await.unwrap();
        progress.wait_for(|&count| count >= 2).await.unwrap();
        // Events for a counted line are already queued.
        assert!(matches!(events.try_recv(), Ok(DecoderEvent::Processed(_))));
        assert!(matches!(events.try_recv(), Ok(DecoderEvent::Detected(_))));
        assert!(events.try_recv().is_err());

        decoder.pause();
        lines.send("222".to_string()).await.unwrap();
        progress.wait_for(|&count| count >= 3).await.unwrap();
        assert!(events.try_recv().is_err());

        drop(lines);
        assert!(progress.wait_for(|&count| count > 3).await.is_err());
    }

    #[tokio::test]
    async fn test_init_twice_fails() {
        let (mut decoder, _lines, _events) = started().await;
        let (event_tx, _event_rx) = mpsc::channel(1);
        let err = decoder.init(&config(), event_tx).await.unwrap_err();
        assert!(matches!(err, Error::DecoderInit { .. }));
    }

    #[test]
    fn test_filter_respects_reported_format() {
        let filter = SymbolFilter {
            readers: vec![Symbology::Upc],
            verify_check_digits: true,
        };
        let mut frame = FrameResult {
            code: Some("ABC".to_string()),
            format: Some(Symbology::Code128),
            ..FrameResult::default()
        };
        assert!(filter.apply(&mut frame).is_none());
        assert!(frame.code.is_none());
    }
}
