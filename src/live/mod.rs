//! Live voice sessions
//!
//! Streams microphone audio to the bidirectional API and plays the spoken
//! replies back gaplessly.

mod controller;
mod cursor;
mod link;
pub mod protocol;
mod status;
mod websocket;

pub use controller::{LiveController, LiveEvent, LiveHandle};
pub use cursor::PlaybackCursor;
pub use link::{Connector, INBOUND_CAPACITY, Link, LinkEvent, LinkRemote, link_pair};
pub use protocol::{ServerMessage, SessionSetup};
pub use status::Status;
pub use websocket::{WebSocketConnector, redact_url};
