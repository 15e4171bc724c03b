//! Slack integration: Web API transport, Events API decoding and request
//! signature verification.

pub mod client;
pub mod error;
pub mod events;
pub mod verify;

pub use client::SlackClient;
pub use error::SlackError;
pub use events::{decode_request, SlackRequest};
pub use verify::verify_signature;
