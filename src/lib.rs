//! Mentor Live - voice and text client for an AI career mentor
//!
//! This library provides the core functionality for the mentor client:
//! - Live voice sessions over a bidirectional streaming API
//! - PCM codec, capture framing, level metering and gapless playback
//! - Text chat with conversation history
//! - Layered configuration (env > config file > defaults)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │          mentor voice  │  mentor chat  │  tests      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                 Live Controller                      │
//! │   Status  │  Cursor  │  Codec  │  Capture/Playback  │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │            Connector (WebSocket / REST)              │
//! │        setup  │  realtimeInput  │  serverContent     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod live;
pub mod prompt;
pub mod voice;

pub use chat::{ChatClient, ChatMessage, Conversation, Role};
pub use config::Config;
pub use error::{Error, Result};
pub use live::{
    Connector, LiveController, LiveEvent, LiveHandle, SessionSetup, Status, WebSocketConnector,
};
pub use voice::{AudioBackend, CpalBackend};
