//! Wire protocol between federates and the RTI.
//!
//! Every message starts with a single type byte; multi-byte fields are
//! big-endian. There is no outer length prefix, so decoding is incremental:
//! [`decode`] returns `Ok(None)` until a complete message is buffered.
//!
//! Type byte 12 is overloaded (query towards the RTI, reply from it), so the
//! decoder is parameterised by [`Direction`].

mod codec;
mod message;
mod reject;

pub use codec::{decode, encode, CodecError, Direction, WireCodec};
pub use message::{message_type, Message, TimedMessage, UntimedMessage};
pub use reject::RejectReason;
