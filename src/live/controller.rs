//! Live session controller
//!
//! One controller owns one voice session end to end. Both audio devices and
//! the remote link live in a single `ActiveSession` that is torn down in one
//! place, which also rewinds the playback cursor. Commands, capture blocks and
//! inbound link events are consumed by [`LiveController::run`], a single-task
//! dispatch loop.
//!
//! ```text
//! mic ─► BlockFramer ─► blocks ─┐                     ┌─► Level / Status ─► caller
//!                               ├─► dispatch loop ────┤
//! remote ─► LinkEvent ──────────┘                     ├─► encode ─► Link::send ─► remote
//!                                                     └─► decode ─► cursor ─► OutputDevice
//! ```

use std::rc::Rc;

use futures::FutureExt;
use futures::future::LocalBoxFuture;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::cursor::PlaybackCursor;
use super::link::{Connector, Link, LinkEvent};
use super::protocol::{InlineData, ServerMessage, SessionSetup};
use super::status::Status;
use crate::voice::codec::{self, FRAME_SIZE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::voice::level;
use crate::voice::{AudioBackend, BlockCallback, InputDevice, OutputDevice};
use crate::{Error, Result};

/// Capacity of the command inbox
const COMMAND_CAPACITY: usize = 16;

/// Capture blocks buffered between the audio thread and the dispatch loop
const CAPTURE_CAPACITY: usize = 16;

/// Notification surfaced to the caller
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiveEvent {
    /// Lifecycle transition
    Status(Status),
    /// RMS amplitude of the latest capture block
    Level(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Connect,
    Disconnect,
    Shutdown,
}

/// Cloneable handle for driving a [`LiveController`] from other tasks
#[derive(Debug, Clone)]
pub struct LiveHandle {
    tx: mpsc::Sender<Command>,
}

impl LiveHandle {
    /// Request a new session
    ///
    /// Returns once the request is queued; progress is reported through
    /// [`LiveEvent::Status`].
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn connect(&self) -> Result<()> {
        self.send(Command::Connect).await
    }

    /// Tear down the session, cancelling any connect in flight
    ///
    /// # Errors
    ///
    /// Returns error if the controller has stopped
    pub async fn disconnect(&self) -> Result<()> {
        self.send(Command::Disconnect).await
    }

    /// Disconnect and stop the controller loop
    ///
    /// # Errors
    ///
    /// Returns error if the controller has already stopped
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.tx.send(command).await.map_err(|_| Error::ControllerGone)
    }
}

/// Devices and link acquired by a successful connect
struct Acquired {
    input: Box<dyn InputDevice>,
    output: Box<dyn OutputDevice>,
    link: Link,
}

/// A connect attempt that has not resolved yet
struct PendingConnect {
    token: CancellationToken,
    future: LocalBoxFuture<'static, Result<Acquired>>,
}

/// Everything owned by an open session
struct ActiveSession {
    input: Box<dyn InputDevice>,
    output: Box<dyn OutputDevice>,
    link: Link,
    blocks: mpsc::Receiver<Vec<f32>>,
    rate_mismatch_logged: bool,
}

impl ActiveSession {
    /// Release every resource, closing the remote side without waiting
    fn teardown(mut self) {
        self.input.stop();
        self.link.close();
        self.output.close();
        tracing::debug!("session resources released");
    }

    /// Decode one inbound chunk and queue it after everything already scheduled
    fn play(&mut self, inline: &InlineData, cursor: &mut PlaybackCursor) {
        let mismatch = codec::mime_sample_rate(&inline.mime_type)
            .filter(|&r| r != OUTPUT_SAMPLE_RATE && !self.rate_mismatch_logged);
        if let Some(declared) = mismatch {
            tracing::warn!(
                declared,
                assumed = OUTPUT_SAMPLE_RATE,
                "inbound audio declares a different sample rate, playing at fixed rate"
            );
            self.rate_mismatch_logged = true;
        }

        let buffer = match codec::decode(&inline.data, OUTPUT_SAMPLE_RATE) {
            Ok(buffer) => buffer,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed audio chunk");
                return;
            }
        };
        if buffer.is_empty() {
            return;
        }

        // The device clamps the start under its own clock, the cursor follows it
        let duration = buffer.duration();
        let start = self.output.schedule(cursor.next_start(), buffer);
        cursor.schedule(start, duration);
        tracing::trace!(
            start,
            duration,
            lead = start - self.output.current_time(),
            "scheduled audio chunk"
        );
    }
}

/// What woke the dispatch loop
enum Wake {
    Command(Option<Command>),
    Opened(Result<Acquired>),
    Captured(Vec<f32>),
    Link(LinkEvent),
}

/// Owns and drives one live voice session
pub struct LiveController<B, C> {
    backend: Rc<B>,
    connector: Rc<C>,
    setup: SessionSetup,
    events: mpsc::UnboundedSender<LiveEvent>,
    commands: mpsc::Receiver<Command>,
    status: Status,
    pending: Option<PendingConnect>,
    active: Option<ActiveSession>,
    cursor: PlaybackCursor,
}

impl<B, C> LiveController<B, C>
where
    B: AudioBackend + 'static,
    C: Connector + 'static,
{
    /// Create a controller and its handle
    ///
    /// `events` receives every status transition and capture level.
    pub fn new(
        backend: B,
        connector: C,
        setup: SessionSetup,
        events: mpsc::UnboundedSender<LiveEvent>,
    ) -> (Self, LiveHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_CAPACITY);
        let controller = Self {
            backend: Rc::new(backend),
            connector: Rc::new(connector),
            setup,
            events,
            commands,
            status: Status::Disconnected,
            pending: None,
            active: None,
            cursor: PlaybackCursor::new(),
        };
        (controller, LiveHandle { tx })
    }

    /// Current lifecycle state
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Run the dispatch loop until shutdown or until every handle is dropped
    ///
    /// The returned future is not `Send`; drive it from the task that owns
    /// the controller.
    pub async fn run(mut self) {
        loop {
            let wake = tokio::select! {
                command = self.commands.recv() => Wake::Command(command),
                result = wait_pending(&mut self.pending) => Wake::Opened(result),
                wake = next_session_input(&mut self.active) => wake,
            };

            match wake {
                Wake::Command(Some(Command::Connect)) => self.connect(),
                Wake::Command(Some(Command::Disconnect)) => self.disconnect(),
                Wake::Command(Some(Command::Shutdown) | None) => {
                    self.disconnect();
                    break;
                }
                Wake::Opened(result) => self.on_opened(result),
                Wake::Captured(block) => self.on_captured(&block),
                Wake::Link(event) => self.on_link_event(event),
            }
        }
        tracing::debug!("live controller stopped");
    }

    fn connect(&mut self) {
        if self.status.is_active() {
            tracing::warn!(status = %self.status, "connect ignored, session already active");
            return;
        }

        let token = CancellationToken::new();
        let future = acquire(
            Rc::clone(&self.backend),
            Rc::clone(&self.connector),
            self.setup.clone(),
            token.clone(),
        )
        .boxed_local();

        self.pending = Some(PendingConnect { token, future });
        self.set_status(Status::Connecting);
    }

    fn on_opened(&mut self, result: Result<Acquired>) {
        let Some(pending) = self.pending.take() else {
            return;
        };

        let acquired = match result {
            Ok(acquired) if !pending.token.is_cancelled() => acquired,
            Ok(acquired) => {
                release(acquired);
                return;
            }
            Err(Error::Cancelled) => {
                tracing::debug!("connect cancelled");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "live connect failed");
                self.set_status(Status::Error);
                return;
            }
        };

        let Acquired {
            mut input,
            output,
            link,
        } = acquired;

        self.set_status(Status::Connected);

        let (blocks_tx, blocks) = mpsc::channel(CAPTURE_CAPACITY);
        let on_block: BlockCallback = Box::new(move |block: Vec<f32>| {
            if blocks_tx.try_send(block).is_err() {
                tracing::trace!("capture block dropped, dispatch loop behind");
            }
        });

        if let Err(e) = input.start(FRAME_SIZE, on_block) {
            tracing::error!(error = %e, "failed to start capture");
            release(Acquired {
                input,
                output,
                link,
            });
            self.set_status(Status::Error);
            return;
        }

        self.active = Some(ActiveSession {
            input,
            output,
            link,
            blocks,
            rate_mismatch_logged: false,
        });
    }

    fn disconnect(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
            tracing::debug!("cancelled in-flight connect");
        }
        self.release_session();
        self.set_status(Status::Disconnected);
    }

    /// Tear down the open session, if any, and rewind the playback cursor
    fn release_session(&mut self) {
        if let Some(session) = self.active.take() {
            session.teardown();
        }
        tracing::trace!(next_start = self.cursor.next_start(), "playback cursor reset");
        self.cursor.reset();
    }

    fn on_captured(&mut self, block: &[f32]) {
        let Some(session) = self.active.as_mut() else {
            return;
        };

        self.events.send(LiveEvent::Level(level::rms(block))).ok();

        if !session.link.send(codec::encode(block)) {
            tracing::trace!("outbound frame discarded, session not draining");
        }
    }

    fn on_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Message(message) => self.on_message(&message),
            LinkEvent::Closed { reason } => {
                tracing::info!(reason = reason.as_deref().unwrap_or(""), "live session closed");
                self.release_session();
                self.set_status(Status::Disconnected);
            }
            LinkEvent::Error(e) => {
                tracing::error!(error = %e, "live session failed");
                self.release_session();
                self.set_status(Status::Error);
            }
        }
    }

    fn on_message(&mut self, message: &ServerMessage) {
        let Some(session) = self.active.as_mut() else {
            return;
        };

        for chunk in message.audio_chunks() {
            session.play(chunk, &mut self.cursor);
        }

        if let Some(content) = &message.server_content {
            if content.interrupted {
                tracing::debug!("model turn interrupted");
            }
            if content.turn_complete {
                tracing::debug!("model turn complete");
            }
        }
        if let Some(go_away) = &message.go_away {
            tracing::info!(
                time_left = go_away.time_left.as_deref().unwrap_or(""),
                "server will close the session soon"
            );
        }
    }

    fn set_status(&mut self, next: Status) {
        if !self.status.permits(next) {
            tracing::warn!(from = %self.status, to = %next, "unexpected status transition");
        }
        tracing::info!(from = %self.status, to = %next, "live status");
        self.status = next;
        self.events.send(LiveEvent::Status(next)).ok();
    }
}

/// Acquire devices and open the remote session, checking `token` before each step resolves
async fn acquire<B, C>(
    backend: Rc<B>,
    connector: Rc<C>,
    setup: SessionSetup,
    token: CancellationToken,
) -> Result<Acquired>
where
    B: AudioBackend,
    C: Connector,
{
    let mut output = backend.open_output(OUTPUT_SAMPLE_RATE)?;

    let mut input = match backend.open_input(INPUT_SAMPLE_RATE).await {
        Ok(input) => input,
        Err(e) => {
            output.close();
            return Err(e);
        }
    };
    if token.is_cancelled() {
        input.stop();
        output.close();
        return Err(Error::Cancelled);
    }

    let link = match connector.open(&setup).await {
        Ok(link) => link,
        Err(e) => {
            input.stop();
            output.close();
            return Err(e);
        }
    };
    if token.is_cancelled() {
        release(Acquired {
            input,
            output,
            link,
        });
        return Err(Error::Cancelled);
    }

    Ok(Acquired {
        input,
        output,
        link,
    })
}

/// Release resources that never became an active session
fn release(acquired: Acquired) {
    let Acquired {
        mut input,
        mut output,
        link,
    } = acquired;
    input.stop();
    link.close();
    output.close();
}

async fn wait_pending(pending: &mut Option<PendingConnect>) -> Result<Acquired> {
    match pending {
        Some(pending) => (&mut pending.future).await,
        None => std::future::pending().await,
    }
}

async fn next_session_input(active: &mut Option<ActiveSession>) -> Wake {
    let Some(session) = active else {
        return std::future::pending().await;
    };

    tokio::select! {
        Some(block) = session.blocks.recv() => Wake::Captured(block),
        event = session.link.events.recv() => {
            Wake::Link(event.unwrap_or(LinkEvent::Closed { reason: None }))
        }
    }
}
