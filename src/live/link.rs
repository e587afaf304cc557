//! Remote session boundary
//!
//! A [`Connector`] opens a session and hands back a [`Link`]: a bounded
//! drop-oldest queue for outbound frames, a channel of inbound events, and a
//! token that closes the session without waiting for the remote side.

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use super::protocol::{ServerMessage, SessionSetup};
use crate::Result;
use crate::voice::EncodedFrame;

/// Capacity of the inbound event channel
pub const INBOUND_CAPACITY: usize = 128;

/// Event delivered by an open session
#[derive(Debug, Clone)]
pub enum LinkEvent {
    /// Inbound server message
    Message(Box<ServerMessage>),
    /// Remote closed the session
    Closed {
        /// Close reason, if any
        reason: Option<String>,
    },
    /// Transport failure
    Error(String),
}

/// An open bidirectional session
#[derive(Debug)]
pub struct Link {
    /// Outbound audio frames; the oldest frame is overwritten when full
    pub frames: broadcast::Sender<EncodedFrame>,
    /// Inbound events in arrival order
    pub events: mpsc::Receiver<LinkEvent>,
    /// Cancel to close the session
    pub closer: CancellationToken,
}

impl Link {
    /// Queue one frame for transmission
    ///
    /// Never blocks. Returns false if the session is no longer draining frames.
    pub fn send(&self, frame: EncodedFrame) -> bool {
        self.frames.send(frame).is_ok()
    }

    /// Close the session without waiting for acknowledgement
    pub fn close(&self) {
        self.closer.cancel();
    }
}

/// The remote end of a [`Link`], held by a transport implementation
#[derive(Debug)]
pub struct LinkRemote {
    /// Outbound frames to transmit
    pub frames: broadcast::Receiver<EncodedFrame>,
    /// Inbound events to deliver
    pub events: mpsc::Sender<LinkEvent>,
    /// Cancelled when the client closes the session
    pub closer: CancellationToken,
}

/// Create a connected [`Link`]/[`LinkRemote`] pair
///
/// `outbound_capacity` bounds the outbound queue.
#[must_use]
pub fn link_pair(outbound_capacity: usize) -> (Link, LinkRemote) {
    let (frames_tx, frames_rx) = broadcast::channel(outbound_capacity.max(1));
    let (events_tx, events_rx) = mpsc::channel(INBOUND_CAPACITY);
    let closer = CancellationToken::new();

    (
        Link {
            frames: frames_tx,
            events: events_rx,
            closer: closer.clone(),
        },
        LinkRemote {
            frames: frames_rx,
            events: events_tx,
            closer,
        },
    )
}

/// Opens streaming sessions with the remote service
#[async_trait(?Send)]
pub trait Connector {
    /// Open a session configured by `setup`
    ///
    /// Resolves once the remote side has accepted the setup.
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be opened
    async fn open(&self, setup: &SessionSetup) -> Result<Link>;
}
