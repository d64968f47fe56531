//! Edges of the bulk sender.
//!
//! Ingest: decodes delimited recipient files into recipient lists.
//! Email: the transport boundary that delivers one personalized message.

pub mod email;
pub mod ingest;
pub mod recording;

pub use email::{DryRunTransport, EmailTransport, OutgoingEmail, SendGridTransport};
pub use ingest::RecipientDecoder;
pub use recording::RecordingTransport;
