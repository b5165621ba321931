//! SkyCoach - AI assistant core for an aviation academy sales desk
//!
//! Request/response calls to Gemini (chat, grounded regulatory search, image
//! generation and editing, speech) and a live voice coaching session that streams the
//! microphone to the Gemini Live API and plays the model's audio back gaplessly.

#![forbid(unsafe_code)]

/// Gemini REST client and live session factory
pub mod assistant;
/// Base64 and PCM conversions
pub mod codec;
pub mod config;
/// Lead model and sales desk helpers
pub mod crm;
/// Audio device traits and the PulseAudio backend
pub mod devices;
pub mod error;
/// Gemini wire types
pub mod gemini;
/// Live WebSocket transport
pub mod live;
pub mod playback;
/// Live session state machine
pub mod session;

pub use assistant::AssistantClient;
pub use config::AssistantConfig;
pub use error::{Error, Result};
pub use session::{SessionCommand, SessionController, SessionState};
