//! Server-side HTTP/2 connection core.
//!
//! This crate implements the per-connection state machine of an HTTP/2
//! server endpoint: frame parsing, stream multiplexing, a weighted
//! dependency scheduler for egress, connection- and stream-level flow
//! control, request body streaming with backpressure, and graceful
//! shutdown. It performs no I/O of its own: the host event loop owns
//! the socket and timers and drives a [`Connection`] through
//! `on_read`, `on_write_complete` and `on_timer`, while the core calls
//! back into the host through the [`Transport`] and [`Service`]
//! traits.
//!
//! HPACK coding is delegated to the `hpack` crate; everything else on
//! the wire is produced and consumed here.

extern crate byteorder;
extern crate bytes;
extern crate hpack;
extern crate http;
extern crate indexmap;
#[macro_use]
extern crate log;
extern crate slab;

mod codec;
mod error;
mod frame;
mod proto;
mod server;

pub use codec::UserError;
pub use error::Reason;
pub use frame::StreamId;
pub use proto::{Connection, DebugState, Ops, StreamDebug};
pub use server::{Builder, Service, Timer, Transport};
