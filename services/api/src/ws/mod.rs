//! WebSocket Practice Sessions
//!
//! Each connection runs its own turn controller. The browser plays prompts
//! and records replies; the server synthesizes, transcribes and scores.
//!
//! - `protocol`: Defines the JSON-based message format for client-server communication.
//! - `session`: Manages the WebSocket connection lifecycle, from handshake to termination.
//! - `bridge`: Playback and capture carried out by the client over the socket.

pub mod bridge;
pub mod protocol;
pub mod session;

pub use session::ws_handler;
