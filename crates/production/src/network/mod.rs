//! Point-to-point transport between committee peers.
//!
//! # Wire format
//!
//! One length-delimited JSON frame per message (4-byte big-endian length
//! prefix, then the JSON-encoded `Envelope`). Each peer pair keeps a
//! persistent bidirectional TCP stream; the first frame after connect is an
//! `IDENT` envelope naming the dialing node, and a `DISCONNECT` envelope is
//! a cooperative close.

mod adapter;
mod codec;

pub use adapter::{ConnectionsSnapshot, TransportAdapter, TransportError};
pub use codec::{decode_frame, encode_frame, CodecError};
