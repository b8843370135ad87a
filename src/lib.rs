//! Cluster-routing client core for a sharded time-series database.
//!
//! This crate is the part of a database client that decides *which*
//! cluster member to talk to and *how* to recover when that guess turns out
//! to be wrong -- not the wire protocol itself. A [`Handle`] is obtained via
//! [`Handle::connect`], holds a continuously-refreshed routing table
//! ([`Mash`]) over a cache of dialed connections, and exposes the
//! database's operations with retry-on-misroute built in.
//!
//! Streaming reads ([`Handle::raw_values`], [`Handle::windows`]) return a
//! [`QueryStream`]: a lazy, finite sequence of results plus two single-shot
//! signals -- the version the query was evaluated at, and the terminal
//! error, if any -- both of which only resolve after the data sequence has
//! been fully drained.

mod cache;
mod endpoint;
mod error;
mod handle;
mod mash;
mod model;
mod options;
mod retry;
mod router;
mod stream;
#[cfg(test)]
mod testing;
mod wire;

pub use endpoint::{Connector, Endpoint, Transport};
pub use error::{Error, Result};
pub use handle::Handle;
pub use mash::{Mash, Member, Placement};
pub use model::{validate_time_range, RawPoint, StatPoint, StreamId, Version, MAX_TIME_NS, MIN_TIME_NS};
pub use options::ConnectOptions;
pub use retry::MAX_RETRIES;
pub use stream::{DataStream, ErrorFuture, QueryStream, VersionFuture};
pub use wire::{GrpcConnector, GrpcTransport};
