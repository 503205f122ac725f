//! Terminal front end for the scanning session.
//!
//! A terminal cannot draw detection boxes, so [`TerminalSurface`] only rings
//! the bell on a detection. Notices are printed by [`ConsoleNotifier`], and
//! [`PromptInput`] collects the three metadata answers one line at a time.
//! [`ScanConsole`] decides, line by line, whether input is a scan or an answer.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, trace, warn};

use crate::config::ScannerConfig;
use crate::error::{Error, Result};
use crate::overlay::{Rect, Surface};
use crate::record::{Record, LOCATION_FIELD, NAME_FIELD, PALLET_FIELD};
use crate::scanner::Point;
use crate::session::Command;
use crate::workflow::{Notice, Notifier, Phase, Prompt, PromptForm};

/// Line that dismisses an open prompt.
pub const CANCEL_COMMAND: &str = ":cancel";

/// Prints notices to a writer.
#[derive(Debug)]
pub struct ConsoleNotifier<W> {
    out: W,
}

impl<W: Write + Send> ConsoleNotifier<W> {
    /// Print notices to `out`.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Consume the notifier, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Notifier for ConsoleNotifier<W> {
    fn notify(&mut self, notice: Notice) {
        let result = if notice.duration.is_none() {
            writeln!(self.out, "[{}] {} (fix and run again)", notice.level, notice.message)
        } else {
            writeln!(self.out, "[{}] {}", notice.level, notice.message)
        };
        if let Err(e) = result.and_then(|()| self.out.flush()) {
            warn!("Failed to print notice: {}", e);
        }
    }
}

/// A surface that only plays the detection cue, as a terminal bell.
#[derive(Debug)]
pub struct TerminalSurface<W> {
    width: f64,
    height: f64,
    out: W,
}

impl<W: Write + Send> TerminalSurface<W> {
    /// A surface sized like the configured video frame.
    pub fn new(scanner: &ScannerConfig, out: W) -> Self {
        Self {
            width: f64::from(scanner.frame_width),
            height: f64::from(scanner.frame_height),
            out,
        }
    }

    /// Consume the surface, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Surface for TerminalSurface<W> {
    fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn clear(&mut self) {}

    fn stroke_path(&mut self, points: &[Point], _closed: bool, color: &str, _width: f64) {
        trace!(points = points.len(), color, "stroke path");
    }

    fn stroke_rect(&mut self, _rect: Rect, _color: &str, _width: f64) {}

    fn fill_text(&mut self, text: &str, _at: Point, _color: &str) {
        trace!(text, "guide label");
    }

    fn cue(&mut self) {
        if let Err(e) = self.out.write_all(b"\x07").and_then(|()| self.out.flush()) {
            warn!("Failed to ring bell: {}", e);
        }
    }
}

/// What the front end should do after an answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptStep {
    /// Print this question and read another line.
    Ask(String),
    /// All answers collected.
    Submit(PromptForm),
    /// The user dismissed the prompt.
    Cancel,
}

/// Collects prompt answers line by line.
///
/// A blank answer keeps the value already stored for that field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInput {
    barcode: String,
    defaults: [String; 3],
    answers: Vec<String>,
}

impl PromptInput {
    const LABELS: [&'static str; 3] = [NAME_FIELD, LOCATION_FIELD, PALLET_FIELD];

    /// Start collecting answers for `prompt`.
    #[must_use]
    pub fn new(prompt: &Prompt) -> Self {
        Self {
            barcode: prompt.barcode.clone(),
            defaults: [
                prompt.name.clone(),
                prompt.location.clone(),
                prompt.downstack_pallet.clone(),
            ],
            answers: Vec::with_capacity(3),
        }
    }

    /// The barcode being reconciled.
    #[must_use]
    pub fn barcode(&self) -> &str {
        &self.barcode
    }

    /// The next question to ask.
    #[must_use]
    pub fn question(&self) -> String {
        let index = self.answers.len().min(2);
        let default = &self.defaults[index];
        let label = capitalize(Self::LABELS[index]);
        if default.is_empty() {
            format!("{label}: ")
        } else {
            format!("{label} [{default}]: ")
        }
    }

    /// Record one answer line.
    pub fn answer(&mut self, line: &str) -> PromptStep {
        let line = line.trim();
        if line == CANCEL_COMMAND {
            return PromptStep::Cancel;
        }

        let index = self.answers.len();
        if index >= Self::LABELS.len() {
            return self.form();
        }
        let value = if line.is_empty() {
            self.defaults[index].clone()
        } else {
            line.to_string()
        };
        self.answers.push(value);

        if self.answers.len() < Self::LABELS.len() {
            return PromptStep::Ask(self.question());
        }
        self.form()
    }

    fn form(&self) -> PromptStep {
        PromptStep::Submit(PromptForm::new(
            self.answers[0].clone(),
            self.answers[1].clone(),
            self.answers[2].clone(),
        ))
    }
}

/// Routes input lines to the scanner feed or to the open prompt.
///
/// A fed line is settled before the next line is routed: the feed has
/// counted it and the session has handled every event it produced. Buffered
/// input, such as a piped script, therefore reaches the prompt that its
/// preceding scan opened.
#[derive(Debug)]
pub struct ScanConsole<W> {
    feed: mpsc::Sender<String>,
    fed: u64,
    progress: watch::Receiver<u64>,
    commands: mpsc::Sender<Command>,
    phases: watch::Receiver<Phase>,
    input: Option<PromptInput>,
    out: W,
}

impl<W: Write + Send> ScanConsole<W> {
    /// Connect to a running session.
    ///
    /// `progress` is the feed's consumed-line counter, `phases` the session's
    /// phase subscription.
    pub fn new(
        feed: mpsc::Sender<String>,
        progress: watch::Receiver<u64>,
        commands: mpsc::Sender<Command>,
        phases: watch::Receiver<Phase>,
        out: W,
    ) -> Self {
        let fed = *progress.borrow();
        Self {
            feed,
            fed,
            progress,
            commands,
            phases,
            input: None,
            out,
        }
    }

    /// Route every line from `reader` until it ends.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails, printing fails or the session
    /// stops first.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, reader: R) -> Result<()> {
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            self.route(line).await?;
        }
        Ok(())
    }

    /// Route one line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionClosed`] if the session has stopped, or an
    /// I/O error if printing fails.
    pub async fn route(&mut self, line: String) -> Result<()> {
        if self.input.is_none() {
            return self.scan(line).await;
        }
        let step = match self.input.as_mut() {
            Some(pending) => pending.answer(&line),
            None => return Ok(()),
        };
        match step {
            PromptStep::Ask(question) => self.ask(&question),
            PromptStep::Submit(form) => self.command(Command::Submit(form)).await,
            PromptStep::Cancel => self.command(Command::Dismiss).await,
        }
    }

    /// Whether a prompt is collecting answers.
    #[must_use]
    pub fn is_prompting(&self) -> bool {
        self.input.is_some()
    }

    /// Consume the console, returning the writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    async fn scan(&mut self, line: String) -> Result<()> {
        self.feed
            .send(line)
            .await
            .map_err(|_| Error::SessionClosed)?;
        self.fed += 1;
        let fed = self.fed;
        self.progress
            .wait_for(|&count| count >= fed)
            .await
            .map_err(|_| Error::SessionClosed)?;
        self.settle().await
    }

    async fn command(&mut self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::SessionClosed)?;
        self.settle().await
    }

    /// Wait for the session to catch up, then follow its phase.
    async fn settle(&mut self) -> Result<()> {
        let (done, settled) = oneshot::channel();
        self.commands
            .send(Command::Sync(done))
            .await
            .map_err(|_| Error::SessionClosed)?;
        settled.await.map_err(|_| Error::SessionClosed)?;

        let prompt = self.phases.borrow_and_update().prompt().cloned();
        self.input = prompt.as_ref().map(PromptInput::new);
        if let Some(pending) = &self.input {
            debug!(barcode = pending.barcode(), "Prompt opened");
            writeln!(
                self.out,
                "No complete record for {}. Enter details ({CANCEL_COMMAND} to cancel).",
                pending.barcode()
            )?;
            let question = pending.question();
            self.ask(&question)?;
        }
        Ok(())
    }

    fn ask(&mut self, question: &str) -> Result<()> {
        write!(self.out, "{question}")?;
        self.out.flush()?;
        Ok(())
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Render records as an aligned text table.
#[must_use]
pub fn render_table(records: &[Record]) -> String {
    const HEADERS: [&str; 4] = ["BARCODE", "NAME", "LOCATION", "PALLET"];

    let rows: Vec<[&str; 4]> = records
        .iter()
        .map(|r| {
            [
                r.barcode.as_str(),
                r.name.as_str(),
                r.location.as_str(),
                r.downstack_pallet.as_str(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for row in std::iter::once(&HEADERS).chain(rows.iter()) {
        let line: Vec<String> = row
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}
