//! The bidirectional event channel
//!
//! The physical transport is opaque: inbound envelopes arrive as raw JSON
//! strings and outbound commands leave through an unbounded sender.

mod credentials;
mod inbound;
mod outbound;

pub use credentials::{CredentialProvider, EnvCredentials, StaticCredentials, TokenStatus};
pub use inbound::{ChannelStatus, EnvelopeError, InboundEvent, Role};
pub use outbound::{CommandSender, OutboundCommand};
