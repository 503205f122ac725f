//! Scanning session.
//!
//! A [`Session`] owns the record store, the detection bridge, the workflow,
//! the overlay renderer, the decoder, the drawing surface and the notifier,
//! and routes decoder events and user commands between them on a single
//! task. All state changes happen inside one of the session's methods, so no
//! locking is needed.

use std::time::Instant;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info};

use crate::config::{Config, ScannerConfig};
use crate::error::Result;
use crate::overlay::{OverlayRenderer, Surface};
use crate::scanner::{Decoder, DecoderEvent, DetectionBridge, FrameResult};
use crate::store::RecordStore;
use crate::workflow::{Notice, Notifier, Phase, PromptForm, Reaction, Resume, Workflow};

/// A user action routed into a running session.
#[derive(Debug)]
pub enum Command {
    /// Submit the open prompt.
    Submit(PromptForm),
    /// Close the open prompt without saving.
    Dismiss,
    /// Reply once every decoder event queued before this command is handled.
    Sync(oneshot::Sender<()>),
}

/// One scanning session.
#[derive(Debug)]
pub struct Session<D, S, N> {
    store: RecordStore,
    bridge: DetectionBridge,
    workflow: Workflow,
    overlay: OverlayRenderer,
    last_frame: Option<FrameResult>,
    scanner: ScannerConfig,
    decoder: D,
    surface: S,
    notifier: N,
    active: bool,
}

impl<D: Decoder, S: Surface, N: Notifier> Session<D, S, N> {
    /// Assemble a session. The decoder is not started yet.
    #[must_use]
    pub fn new(config: &Config, store: RecordStore, decoder: D, surface: S, notifier: N) -> Self {
        Self {
            store,
            bridge: DetectionBridge::new(),
            workflow: Workflow::from_config(config),
            overlay: OverlayRenderer::new(config.overlay.clone()),
            last_frame: None,
            scanner: config.scanner.clone(),
            decoder,
            surface,
            notifier,
            active: false,
        }
    }

    /// Initialize the decoder so it starts delivering events to `events`.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error if it cannot start. A blocking notice is
    /// shown and the session stays inactive; calling `start` again retries.
    pub async fn start(&mut self, events: mpsc::Sender<DecoderEvent>) -> Result<()> {
        match self.decoder.init(&self.scanner, events).await {
            Ok(()) => {
                self.active = true;
                info!(decoder = self.decoder.name(), "Scanner started");
                Ok(())
            }
            Err(e) => {
                error!(decoder = self.decoder.name(), "Scanner failed to start: {}", e);
                self.notifier.notify(Notice::blocking(e.to_string()));
                Err(e)
            }
        }
    }

    /// Check if the decoder started successfully.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// The record store.
    #[must_use]
    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// The record store, mutably.
    pub fn store_mut(&mut self) -> &mut RecordStore {
        &mut self.store
    }

    /// The current workflow phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.workflow.phase()
    }

    /// Subscribe to workflow phase changes.
    #[must_use]
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.workflow.subscribe()
    }

    /// The last accepted barcode.
    #[must_use]
    pub fn current_barcode(&self) -> Option<&str> {
        self.bridge.current()
    }

    /// The decoder.
    #[must_use]
    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    /// The drawing surface.
    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// The notifier.
    #[must_use]
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Handle one decoder event.
    pub fn handle_event(&mut self, event: DecoderEvent, now: Instant) {
        match event {
            DecoderEvent::Processed(frame) => {
                self.last_frame = frame;
                self.render();
            }
            DecoderEvent::Detected(detection) => {
                if !self.workflow.is_ready() {
                    // Delivered before the pause took effect.
                    debug!(code = %detection.code, "Dropping detection while busy");
                    return;
                }
                if let Some(code) = self.bridge.offer(&detection, &mut self.decoder) {
                    // The decoder is paused now, so show the success guide on
                    // the frame that carried the detection.
                    self.render();
                    let reaction = self.workflow.handle_barcode(&code, &self.store, now);
                    self.apply(reaction);
                }
            }
        }
    }

    /// Submit the open prompt.
    pub fn submit(&mut self, form: &PromptForm) {
        let reaction = self.workflow.submit(form, &mut self.store);
        self.apply(reaction);
    }

    /// Dismiss the open prompt.
    pub fn dismiss(&mut self) {
        let reaction = self.workflow.dismiss();
        self.apply(reaction);
    }

    /// Advance timed behaviour to `now`.
    pub fn tick(&mut self, now: Instant) {
        let reaction = self.workflow.tick(now);
        self.apply(reaction);
    }

    /// Handle one user command.
    pub fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit(form) => self.submit(&form),
            Command::Dismiss => self.dismiss(),
            Command::Sync(done) => {
                // The requester may have given up waiting.
                let _ = done.send(());
            }
        }
    }

    /// Process events and commands until the decoder's event stream ends.
    ///
    /// Pending decoder events are handled before user commands.
    pub async fn run(
        &mut self,
        mut events: mpsc::Receiver<DecoderEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        let mut commands_open = true;
        loop {
            let deadline = self.workflow.next_deadline();
            tokio::select! {
                biased;

                event = events.recv() => match event {
                    Some(event) => self.handle_event(event, Instant::now()),
                    None => {
                        debug!("Decoder event stream ended");
                        break;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle_command(command),
                    None => commands_open = false,
                },
                () = sleep_until(deadline) => self.tick(Instant::now()),
            }
        }
        self.workflow.cancel_pending();
    }

    fn render(&mut self) {
        let just_detected = self.bridge.take_just_detected();
        self.overlay
            .render(&mut self.surface, self.last_frame.as_ref(), just_detected);
    }

    fn apply(&mut self, reaction: Reaction) {
        if let Some(notice) = reaction.notice {
            self.notifier.notify(notice);
        }
        match reaction.resume {
            Resume::Hold => {}
            Resume::Now => self.decoder.resume(),
            Resume::ClearAndResume => {
                self.bridge.clear();
                self.last_frame = None;
                self.overlay.clear(&mut self.surface);
                self.decoder.resume();
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::overlay::{DrawOp, RecordingSurface};
    use crate::record::Record;
    use crate::scanner::testing::MockDecoder;
    use crate::scanner::{Detection, Point};
    use crate::store::MemorySnapshot;
    use crate::workflow::testing::NoticeLog;
    use crate::workflow::{NoticeLevel, SAVED_MESSAGE};

    type TestSession = Session<MockDecoder, RecordingSurface, NoticeLog>;

    fn session_with(config: &Config, records: &[Record]) -> TestSession {
        let mut store = RecordStore::empty(Box::new(MemorySnapshot::default()));
        for record in records {
            store.upsert(record.clone()).unwrap();
        }
        Session::new(
            config,
            store,
            MockDecoder::default(),
            RecordingSurface::new(640.0, 480.0),
            NoticeLog::default(),
        )
    }

    fn detected(code: &str) -> DecoderEvent {
        DecoderEvent::Detected(Detection::new(code))
    }

    #[test]
    fn test_unknown_barcode_prompt_and_submit() {
        let mut session = session_with(&Config::default(), &[]);

        session.handle_event(detected("012345678905"), Instant::now());
        assert!(session.decoder().is_paused());
        assert_eq!(
            session.phase().prompt().map(|p| p.barcode.as_str()),
            Some("012345678905")
        );

        session.submit(&PromptForm::new("Widget", "Aisle 3", "P12"));
        assert_eq!(session.phase(), Phase::Idle);
        assert!(!session.decoder().is_paused());
        assert_eq!(session.notifier().messages(), vec![SAVED_MESSAGE]);
        assert_eq!(
            session.store().records(),
            &[Record::new("012345678905", "Widget", "Aisle 3", "P12")]
        );

        // The marker survives the save, so an immediate rescan is ignored.
        assert_eq!(session.current_barcode(), Some("012345678905"));
        session.handle_event(detected("012345678905"), Instant::now());
        assert_eq!(session.decoder().pauses, 1);
        assert_eq!(session.notifier().notices.len(), 1);
    }

    #[test]
    fn test_complete_record_resumes_after_tick() {
        let config = Config::default();
        let mut session = session_with(&config, &[Record::new("111", "Bolt", "A1", "P1")]);
        let start = Instant::now();

        session.handle_event(detected("111"), start);
        assert!(session.decoder().is_paused());
        assert_eq!(session.phase(), Phase::Idle);
        assert_eq!(
            session.notifier().messages(),
            vec!["Item: Bolt | Aisle: A1 | Pallet: P1"]
        );

        session.tick(start + config.resume_delay() - Duration::from_millis(1));
        assert!(session.decoder().is_paused());

        session.tick(start + config.resume_delay());
        assert!(!session.decoder().is_paused());
        assert!(session.current_barcode().is_none());

        // The same barcode is accepted again after the resume.
        session.handle_event(detected("111"), start + config.resume_delay());
        assert_eq!(session.notifier().notices.len(), 2);
    }

    #[test]
    fn test_incomplete_submission_keeps_prompt() {
        let mut session = session_with(&Config::default(), &[]);
        session.handle_event(detected("222"), Instant::now());

        session.submit(&PromptForm::new("Nut", "", "P2"));
        assert!(session.decoder().is_paused());
        assert!(session.store().is_empty());
        assert_eq!(session.phase().prompt().unwrap().barcode, "222");
        assert_eq!(session.notifier().notices[0].level, NoticeLevel::Error);
    }

    #[test]
    fn test_dismiss_resumes_but_keeps_marker() {
        let mut session = session_with(&Config::default(), &[]);
        session.handle_event(detected("333"), Instant::now());

        session.handle_command(Command::Dismiss);
        assert!(!session.decoder().is_paused());
        assert!(session.store().is_empty());
        assert_eq!(session.current_barcode(), Some("333"));

        // Still the current symbol, so a repeat is ignored.
        session.handle_event(detected("333"), Instant::now());
        assert_eq!(session.phase(), Phase::Idle);
    }

    #[test]
    fn test_detection_while_prompt_open_is_dropped() {
        let mut session = session_with(&Config::default(), &[]);
        session.handle_event(detected("444"), Instant::now());
        session.handle_event(detected("555"), Instant::now());

        assert_eq!(session.current_barcode(), Some("444"));
        assert_eq!(session.phase().prompt().unwrap().barcode, "444");
        assert_eq!(session.decoder().pauses, 1);
    }

    #[test]
    fn test_detection_renders_success_on_its_own_frame() {
        let mut session = session_with(&Config::default(), &[]);

        // Decoders report the frame first, then the detection it carried.
        let frame = FrameResult {
            line: Some(vec![Point::new(100.0, 240.0), Point::new(540.0, 240.0)]),
            ..FrameResult::decoded("666")
        };
        session.handle_event(DecoderEvent::Processed(Some(frame)), Instant::now());
        assert!(!session.surface().ops().contains(&DrawOp::Cue));

        session.handle_event(detected("666"), Instant::now());
        let ops = session.surface().ops();
        assert!(ops.contains(&DrawOp::Cue));
        assert!(ops.iter().any(|op| matches!(op, DrawOp::Path { .. })));

        // The next frame after resuming belongs to another scan.
        session.dismiss();
        session.handle_event(DecoderEvent::Processed(None), Instant::now());
        assert!(!session.surface().ops().contains(&DrawOp::Cue));
    }

    #[tokio::test]
    async fn test_run_answers_sync_after_queued_events() {
        let mut session = session_with(&Config::default(), &[]);
        let (event_tx, event_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);
        let mut phases = session.subscribe_phase();

        event_tx.send(detected("888")).await.unwrap();
        let (done_tx, done_rx) = oneshot::channel();
        command_tx.send(Command::Sync(done_tx)).await.unwrap();

        let runner = tokio::spawn(async move {
            session.run(event_rx, command_rx).await;
            session
        });
        done_rx.await.unwrap();
        assert_eq!(
            phases.borrow_and_update().prompt().map(|p| p.barcode.clone()),
            Some("888".to_string())
        );

        drop(event_tx);
        runner.await.unwrap();
    }

    #[tokio::test]
    async fn test_start_failure_shows_blocking_notice() {
        let mut session = session_with(&Config::default(), &[]);
        session.decoder.deny_permission = true;
        let (tx, _rx) = mpsc::channel(1);

        let err = session.start(tx).await.unwrap_err();
        assert!(err.is_decoder_error());
        assert!(!session.is_active());
        let notice = &session.notifier().notices[0];
        assert_eq!(notice.level, NoticeLevel::Error);
        assert!(notice.duration.is_none());

        // Manual retry.
        session.decoder.deny_permission = false;
        let (tx, _rx) = mpsc::channel(1);
        session.start(tx).await.unwrap();
        assert!(session.is_active());
    }

    #[tokio::test]
    async fn test_run_routes_events_and_commands() {
        let mut session = session_with(&Config::default(), &[]);
        let (event_tx, event_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::channel(8);

        event_tx.send(detected("777")).await.unwrap();
        command_tx
            .send(Command::Submit(PromptForm::new("Gear", "Aisle 7", "P7")))
            .await
            .unwrap();
        drop(command_tx);

        // Give the loop a moment to drain both channels, then end the feed.
        let feed = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(event_tx);
        });
        session.run(event_rx, command_rx).await;
        feed.await.unwrap();

        assert_eq!(session.store().len(), 1);
        assert_eq!(session.store().find_by_barcode("777").unwrap().name, "Gear");
    }

    #[tokio::test]
    async fn test_run_fires_deferred_resume() {
        let mut config = Config::default();
        config.scanner.resume_delay_ms = 20;
        let mut session = session_with(&config, &[Record::new("111", "Bolt", "A1", "P1")]);
        let (event_tx, event_rx) = mpsc::channel(8);
        let (_command_tx, command_rx) = mpsc::channel(8);
        event_tx.send(detected("111")).await.unwrap();

        let outcome = tokio::time::timeout(
            Duration::from_millis(300),
            session.run(event_rx, command_rx),
        )
        .await;

        assert!(outcome.is_err(), "run keeps going while the feed is open");
        assert_eq!(session.decoder().resumes, 1);
        assert!(session.current_barcode().is_none());
        drop(event_tx);
    }
}
