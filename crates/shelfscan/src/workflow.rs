//! Reconciliation workflow.
//!
//! Takes each barcode accepted by the detection bridge, looks it up in the
//! record store, and either shows the stored metadata or opens a prompt for
//! the missing fields. The workflow never touches the decoder directly: every
//! operation returns a [`Reaction`] telling the caller which notice to show
//! and whether detection may resume.

use std::fmt;
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::record::Record;
use crate::store::{RecordStore, UpsertOutcome};

/// Message shown when a prompt is submitted with blank fields.
pub const INCOMPLETE_MESSAGE: &str = "Please fill in all fields.";

/// Message shown after a prompt is saved.
pub const SAVED_MESSAGE: &str = "Information saved.";

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Neutral information, such as a matched record.
    Info,
    /// An operation completed.
    Success,
    /// Something failed or was rejected.
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Success => write!(f, "ok"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Text to show.
    pub message: String,
    /// How long to show it. `None` keeps it up until the user acts.
    pub duration: Option<Duration>,
}

impl Notice {
    /// A transient informational notice.
    #[must_use]
    pub fn info(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
            duration: Some(duration),
        }
    }

    /// A transient success notice.
    #[must_use]
    pub fn success(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
            duration: Some(duration),
        }
    }

    /// A transient error notice.
    #[must_use]
    pub fn error(message: impl Into<String>, duration: Duration) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            duration: Some(duration),
        }
    }

    /// An error notice that stays up until the user acts.
    #[must_use]
    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            duration: None,
        }
    }
}

/// Receives notices for display.
pub trait Notifier: Send {
    /// Show `notice`.
    fn notify(&mut self, notice: Notice);
}

/// An open prompt for a barcode's metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Barcode being reconciled.
    pub barcode: String,
    /// Existing item name, possibly empty.
    pub name: String,
    /// Existing aisle location, possibly empty.
    pub location: String,
    /// Existing downstack pallet, possibly empty.
    pub downstack_pallet: String,
    /// Number of submissions rejected so far.
    pub rejections: u32,
}

impl Prompt {
    fn for_barcode(barcode: &str, existing: Option<&Record>) -> Self {
        let existing = existing.cloned().unwrap_or_else(|| Record::bare(barcode));
        Self {
            barcode: barcode.to_string(),
            name: existing.name,
            location: existing.location,
            downstack_pallet: existing.downstack_pallet,
            rejections: 0,
        }
    }
}

/// Values the user entered into a prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptForm {
    /// Item name.
    pub name: String,
    /// Aisle location.
    pub location: String,
    /// Downstack pallet.
    pub downstack_pallet: String,
}

impl PromptForm {
    /// Create a form from the three answers.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        location: impl Into<String>,
        downstack_pallet: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            downstack_pallet: downstack_pallet.into(),
        }
    }
}

/// Workflow state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    /// Ready to accept a barcode.
    #[default]
    Idle,
    /// A prompt is open and detection is blocked.
    AwaitingInput(Prompt),
}

impl Phase {
    /// The open prompt, if any.
    #[must_use]
    pub fn prompt(&self) -> Option<&Prompt> {
        match self {
            Self::Idle => None,
            Self::AwaitingInput(prompt) => Some(prompt),
        }
    }
}

/// A resume scheduled for a later instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeferredResume {
    due: Instant,
    cancelled: bool,
}

impl DeferredResume {
    /// Schedule a resume at `due`.
    #[must_use]
    pub fn new(due: Instant) -> Self {
        Self {
            due,
            cancelled: false,
        }
    }

    /// When the resume fires.
    #[must_use]
    pub fn due(&self) -> Instant {
        self.due
    }

    /// Check if the resume should fire at `now`.
    #[must_use]
    pub fn is_due(&self, now: Instant) -> bool {
        !self.cancelled && now >= self.due
    }

    /// Check if the resume was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Prevent the resume from firing.
    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// What the caller should do with the decoder after a workflow step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Keep the decoder paused.
    Hold,
    /// Resume detection, keeping the current barcode marker.
    Now,
    /// Clear the current barcode marker, then resume detection.
    ClearAndResume,
}

/// Outcome of one workflow step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    /// Notice to show, if any.
    pub notice: Option<Notice>,
    /// Decoder instruction.
    pub resume: Resume,
}

impl Reaction {
    fn hold() -> Self {
        Self {
            notice: None,
            resume: Resume::Hold,
        }
    }
}

/// The reconciliation state machine.
#[derive(Debug)]
pub struct Workflow {
    phase: watch::Sender<Phase>,
    pending: Option<DeferredResume>,
    resume_delay: Duration,
    notice_duration: Duration,
}

impl Workflow {
    /// Create an idle workflow.
    #[must_use]
    pub fn new(resume_delay: Duration, notice_duration: Duration) -> Self {
        let (phase, _) = watch::channel(Phase::Idle);
        Self {
            phase,
            pending: None,
            resume_delay,
            notice_duration,
        }
    }

    /// Create an idle workflow using the configured delays.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.resume_delay(), config.notice_duration())
    }

    /// The current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase.borrow().clone()
    }

    /// Subscribe to phase changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Check if the workflow is idle with no resume pending.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.pending.is_none() && matches!(*self.phase.borrow(), Phase::Idle)
    }

    /// The scheduled resume, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&DeferredResume> {
        self.pending.as_ref()
    }

    /// When the next timed step is due.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .as_ref()
            .filter(|p| !p.is_cancelled())
            .map(DeferredResume::due)
    }

    /// Reconcile a barcode accepted by the detection bridge.
    pub fn handle_barcode(&mut self, code: &str, store: &RecordStore, now: Instant) -> Reaction {
        if !self.is_ready() {
            warn!(code, "Barcode arrived while busy, ignoring");
            return Reaction::hold();
        }

        match store.find_by_barcode(code) {
            Some(record) if record.is_complete() => {
                info!(code, "Matched complete record");
                self.pending = Some(DeferredResume::new(now + self.resume_delay));
                Reaction {
                    notice: Some(Notice::info(record.summary(), self.notice_duration)),
                    resume: Resume::Hold,
                }
            }
            existing => {
                debug!(code, known = existing.is_some(), "Prompting for metadata");
                self.phase
                    .send_replace(Phase::AwaitingInput(Prompt::for_barcode(code, existing)));
                Reaction::hold()
            }
        }
    }

    /// Submit the open prompt.
    ///
    /// Blank fields reject the submission and keep the prompt open. Otherwise
    /// the record is upserted and detection resumes.
    pub fn submit(&mut self, form: &PromptForm, store: &mut RecordStore) -> Reaction {
        let Phase::AwaitingInput(mut prompt) = self.phase() else {
            warn!("Submit without an open prompt, ignoring");
            return Reaction::hold();
        };

        let record = Record::new(
            prompt.barcode.clone(),
            &form.name,
            &form.location,
            &form.downstack_pallet,
        );
        if !record.is_complete() {
            debug!(
                barcode = %prompt.barcode,
                missing = ?record.missing_fields(),
                "Rejected submission"
            );
            prompt.rejections += 1;
            self.phase.send_replace(Phase::AwaitingInput(prompt));
            return Reaction {
                notice: Some(Notice::error(INCOMPLETE_MESSAGE, self.notice_duration)),
                resume: Resume::Hold,
            };
        }

        let notice = match store.upsert(record) {
            Ok(outcome) => {
                info!(
                    barcode = %prompt.barcode,
                    created = outcome == UpsertOutcome::Inserted,
                    "Saved record"
                );
                Notice::success(SAVED_MESSAGE, self.notice_duration)
            }
            Err(e) => {
                warn!(barcode = %prompt.barcode, "Failed to save record: {}", e);
                Notice::error(format!("Could not save: {e}"), self.notice_duration)
            }
        };

        // The marker stays, so an immediate rescan of the saved item is ignored.
        self.phase.send_replace(Phase::Idle);
        Reaction {
            notice: Some(notice),
            resume: Resume::Now,
        }
    }

    /// Close the open prompt without writing anything.
    pub fn dismiss(&mut self) -> Reaction {
        if self.phase.borrow().prompt().is_none() {
            return Reaction::hold();
        }
        debug!("Prompt dismissed");
        self.phase.send_replace(Phase::Idle);
        Reaction {
            notice: None,
            resume: Resume::Now,
        }
    }

    /// Fire the scheduled resume if it is due at `now`.
    pub fn tick(&mut self, now: Instant) -> Reaction {
        match self.pending {
            Some(pending) if pending.is_cancelled() => {
                self.pending = None;
                Reaction::hold()
            }
            Some(pending) if pending.is_due(now) => {
                self.pending = None;
                debug!("Resuming after matched record");
                Reaction {
                    notice: None,
                    resume: Resume::ClearAndResume,
                }
            }
            _ => Reaction::hold(),
        }
    }

    /// Cancel the scheduled resume. Returns `true` if one was pending.
    pub fn cancel_pending(&mut self) -> bool {
        match self.pending.as_mut() {
            Some(pending) if !pending.is_cancelled() => {
                pending.cancel();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Notice, Notifier};

    #[derive(Debug, Default)]
    pub struct NoticeLog {
        pub notices: Vec<Notice>,
    }

    impl NoticeLog {
        pub fn messages(&self) -> Vec<&str> {
            self.notices.iter().map(|n| n.message.as_str()).collect()
        }
    }

    impl Notifier for NoticeLog {
        fn notify(&mut self, notice: Notice) {
            self.notices.push(notice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemorySnapshot;

    const DELAY: Duration = Duration::from_secs(3);

    fn workflow() -> Workflow {
        Workflow::new(DELAY, DELAY)
    }

    fn empty_store() -> RecordStore {
        RecordStore::empty(Box::new(MemorySnapshot::default()))
    }

    fn store_with(records: &[Record]) -> RecordStore {
        let mut store = empty_store();
        for record in records {
            store.upsert(record.clone()).unwrap();
        }
        store
    }

    #[test]
    fn test_unknown_barcode_create_flow() {
        let mut workflow = workflow();
        let mut store = empty_store();
        let now = Instant::now();

        let reaction = workflow.handle_barcode("012345678905", &store, now);
        assert_eq!(reaction.resume, Resume::Hold);
        let prompt = workflow.phase().prompt().cloned().unwrap();
        assert_eq!(prompt.barcode, "012345678905");
        assert!(prompt.name.is_empty());

        let reaction = workflow.submit(&PromptForm::new("Widget", "Aisle 3", "P12"), &mut store);
        assert_eq!(reaction.resume, Resume::Now);
        assert_eq!(reaction.notice.unwrap().message, SAVED_MESSAGE);
        assert_eq!(workflow.phase(), Phase::Idle);
        assert_eq!(
            store.records(),
            &[Record::new("012345678905", "Widget", "Aisle 3", "P12")]
        );
    }

    #[test]
    fn test_complete_record_shows_then_resumes_after_delay() {
        let mut workflow = workflow();
        let store = store_with(&[Record::new("111", "Bolt", "Aisle 1", "P1")]);
        let start = Instant::now();

        let reaction = workflow.handle_barcode("111", &store, start);
        let notice = reaction.notice.unwrap();
        assert_eq!(notice.level, NoticeLevel::Info);
        assert_eq!(notice.message, "Item: Bolt | Aisle: Aisle 1 | Pallet: P1");
        assert_eq!(reaction.resume, Resume::Hold);
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(!workflow.is_ready());
        assert_eq!(workflow.next_deadline(), Some(start + DELAY));

        let early = workflow.tick(start + Duration::from_secs(2));
        assert_eq!(early.resume, Resume::Hold);

        let fired = workflow.tick(start + DELAY);
        assert_eq!(fired.resume, Resume::ClearAndResume);
        assert!(workflow.is_ready());
        assert!(workflow.next_deadline().is_none());
    }

    #[test]
    fn test_blank_field_rejected() {
        let mut workflow = workflow();
        let mut store = empty_store();
        workflow.handle_barcode("222", &store, Instant::now());

        let reaction = workflow.submit(&PromptForm::new("Nut", "  ", "P2"), &mut store);
        assert_eq!(reaction.resume, Resume::Hold);
        let notice = reaction.notice.unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.message, INCOMPLETE_MESSAGE);

        assert!(store.is_empty());
        let prompt = workflow.phase().prompt().cloned().unwrap();
        assert_eq!(prompt.barcode, "222");
        assert_eq!(prompt.rejections, 1);
    }

    #[test]
    fn test_incomplete_record_prefills_prompt() {
        let mut workflow = workflow();
        let mut store = store_with(&[Record::new("333", "Washer", "", "P3")]);

        workflow.handle_barcode("333", &store, Instant::now());
        let prompt = workflow.phase().prompt().cloned().unwrap();
        assert_eq!(prompt.name, "Washer");
        assert_eq!(prompt.location, "");
        assert_eq!(prompt.downstack_pallet, "P3");

        workflow.submit(&PromptForm::new("Washer", "Aisle 9", "P3"), &mut store);
        assert_eq!(store.len(), 1);
        assert_eq!(store.find_by_barcode("333").unwrap().location, "Aisle 9");
    }

    #[test]
    fn test_dismiss_writes_nothing() {
        let mut workflow = workflow();
        let store = empty_store();
        workflow.handle_barcode("444", &store, Instant::now());

        let reaction = workflow.dismiss();
        assert_eq!(reaction.resume, Resume::Now);
        assert_eq!(workflow.phase(), Phase::Idle);
        assert!(store.is_empty());

        // Nothing left to dismiss.
        assert_eq!(workflow.dismiss().resume, Resume::Hold);
    }

    #[test]
    fn test_barcode_ignored_while_prompt_open() {
        let mut workflow = workflow();
        let store = empty_store();
        workflow.handle_barcode("555", &store, Instant::now());

        workflow.handle_barcode("666", &store, Instant::now());
        assert_eq!(workflow.phase().prompt().unwrap().barcode, "555");
    }

    #[test]
    fn test_submit_without_prompt_is_ignored() {
        let mut workflow = workflow();
        let mut store = empty_store();
        let reaction = workflow.submit(&PromptForm::new("a", "b", "c"), &mut store);
        assert_eq!(reaction, Reaction::hold());
        assert!(store.is_empty());
    }

    #[test]
    fn test_cancelled_resume_never_fires() {
        let mut workflow = workflow();
        let store = store_with(&[Record::new("111", "Bolt", "Aisle 1", "P1")]);
        let start = Instant::now();
        workflow.handle_barcode("111", &store, start);

        assert!(workflow.cancel_pending());
        assert!(!workflow.cancel_pending());
        assert!(workflow.next_deadline().is_none());
        assert_eq!(workflow.tick(start + DELAY).resume, Resume::Hold);
        assert!(workflow.pending().is_none());
    }

    #[test]
    fn test_phase_subscription() {
        let mut workflow = workflow();
        let store = empty_store();
        let mut phases = workflow.subscribe();

        workflow.handle_barcode("777", &store, Instant::now());
        assert!(phases.has_changed().unwrap());
        assert!(phases.borrow_and_update().prompt().is_some());
    }

    #[test]
    fn test_deferred_resume() {
        let start = Instant::now();
        let mut deferred = DeferredResume::new(start + DELAY);
        assert!(!deferred.is_due(start));
        assert!(deferred.is_due(start + DELAY));
        deferred.cancel();
        assert!(!deferred.is_due(start + DELAY));
    }
}
