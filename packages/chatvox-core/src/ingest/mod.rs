//! Chat event ingestion: connection management, wire decoding and routing.

mod backoff;
mod channel;
mod protocol;
mod router;

pub use backoff::Backoff;
pub use channel::{ChannelError, ChannelHandle, ConnectionState, EventSink, IngestChannel};
pub use protocol::{decode_frame, decode_record, ChannelEvent, DecodeError};
pub use router::EventRouter;
