pub mod channel;
pub mod error;
pub mod membership;
pub mod types;

pub use channel::ChatTransport;
pub use error::ChannelError;
pub use membership::MembershipHandle;
pub use types::{ChatMessage, InboundEvent, MessageEdit};
