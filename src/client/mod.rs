//! Streaming consumer of the relay, used by the terminal chat binary.
//!
//! - [`decode`] turns the reply byte stream into text lines
//! - [`transcript`] keeps the settled conversation
//! - [`http`] talks to the relay endpoints

pub mod decode;
pub mod http;
pub mod transcript;

pub use decode::{DecodedLine, LineDecoder, decode_line};
pub use http::{Attachment, ChatClient, ClientError, OutgoingTurn};
pub use transcript::{APOLOGY, PendingReply, Speaker, Transcript, Turn};
