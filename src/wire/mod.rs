//! The gRPC realization of `Transport`. Everything here is hand-authored in
//! the shape `tonic-build` would generate from a `.proto` file describing
//! the operations in the external interface -- there's no build.rs/protoc
//! step, since the wire encoding itself is out of scope for the
//! routing/dispatch core this crate exists to implement. Kept behind the
//! `Transport`/`Connector` traits so the rest of the crate, and its tests,
//! never depend on this module directly.

mod client;
pub mod proto;

pub use client::{connect, GrpcConnector, GrpcTransport};
