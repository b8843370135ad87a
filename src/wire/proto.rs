//! Hand-authored wire messages. These are written by hand in the shape
//! `tonic-build`/`prost-build` would generate from a `.proto` file; there is
//! no `build.rs`/`protoc` step in this crate because the on-the-wire RPC
//! encoding is explicitly out of scope for the routing/dispatch core --
//! this module exists only so `GrpcTransport` has something concrete to
//! send. Field numbers are stable within this crate only.

use std::collections::HashMap;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MemberProto {
    #[prost(uint32, tag = "1")]
    pub hash: u32,
    #[prost(string, repeated, tag = "2")]
    pub addresses: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InfoResponse {
    #[prost(uint64, tag = "1")]
    pub revision: u64,
    #[prost(message, repeated, tag = "2")]
    pub members: Vec<MemberProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub stream_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub collection: String,
    #[prost(map = "string, string", tag = "3")]
    pub tags: HashMap<String, String>,
    #[prost(bytes = "bytes", tag = "4")]
    pub annotation: ::prost::bytes::Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateResponse {
    #[prost(int32, tag = "1")]
    pub status: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawPointProto {
    #[prost(int64, tag = "1")]
    pub time: i64,
    #[prost(double, tag = "2")]
    pub value: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InsertRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub stream_id: Vec<u8>,
    #[prost(message, repeated, tag = "2")]
    pub points: Vec<RawPointProto>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InsertResponse {
    #[prost(int32, tag = "1")]
    pub status: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InsertTvRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub stream_id: Vec<u8>,
    #[prost(int64, repeated, tag = "2")]
    pub times: Vec<i64>,
    #[prost(double, repeated, tag = "3")]
    pub values: Vec<f64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InsertTvResponse {
    #[prost(int32, tag = "1")]
    pub status: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawValuesRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub stream_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub start_ns: i64,
    #[prost(int64, tag = "3")]
    pub end_ns: i64,
    #[prost(uint64, tag = "4")]
    pub version: u64,
}

/// One message in a `RawValues` response stream. A content message carries
/// `point`; the terminal message (the last one sent) carries `point: None`
/// along with the final `status` and `version`. Analogous to
/// `gazette::journal::read`'s convention of a metadata response followed by
/// content responses, collapsed into a single repeated-message stream.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RawValuesResponse {
    #[prost(int32, tag = "1")]
    pub status: i32,
    #[prost(message, optional, tag = "2")]
    pub point: Option<RawPointProto>,
    #[prost(uint64, tag = "3")]
    pub version: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StatPointProto {
    #[prost(int64, tag = "1")]
    pub time: i64,
    #[prost(double, tag = "2")]
    pub min: f64,
    #[prost(double, tag = "3")]
    pub mean: f64,
    #[prost(double, tag = "4")]
    pub max: f64,
    #[prost(uint64, tag = "5")]
    pub count: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WindowsRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub stream_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub start_ns: i64,
    #[prost(int64, tag = "3")]
    pub end_ns: i64,
    #[prost(int64, tag = "4")]
    pub width_ns: i64,
    #[prost(uint32, tag = "5")]
    pub depth: u32,
    #[prost(uint64, tag = "6")]
    pub version: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WindowsResponse {
    #[prost(int32, tag = "1")]
    pub status: i32,
    #[prost(message, optional, tag = "2")]
    pub stat: Option<StatPointProto>,
    #[prost(uint64, tag = "3")]
    pub version: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NearestRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub stream_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub t_ns: i64,
    #[prost(uint64, tag = "3")]
    pub version: u64,
    #[prost(bool, tag = "4")]
    pub backward: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NearestResponse {
    #[prost(int32, tag = "1")]
    pub status: i32,
    #[prost(message, optional, tag = "2")]
    pub point: Option<RawPointProto>,
    #[prost(uint64, tag = "3")]
    pub version: u64,
}

/// Wire-level status codes this layer understands. Values match the
/// numeric codes named in the external interface (405/419/421/...).
pub mod status {
    pub const OK: i32 = 0;
    pub const WRONG_ENDPOINT: i32 = 405;
    pub const CLUSTER_DEGRADED: i32 = 419;
    pub const INVALID_ARGUMENTS: i32 = 421;
    pub const DISCONNECTED: i32 = 422;
    pub const NO_SUCH_POINT: i32 = 404;
    pub const INVALID_TIME_RANGE: i32 = 416;
}

/// Translates a wire-level status code into this crate's `Error` taxonomy.
/// Returns `None` for `OK`.
pub fn status_to_error(code: i32) -> Option<crate::Error> {
    use crate::model::{MAX_TIME_NS, MIN_TIME_NS};
    use crate::Error;

    match code {
        status::OK => None,
        status::WRONG_ENDPOINT => Some(Error::WrongEndpoint),
        status::CLUSTER_DEGRADED => Some(Error::ClusterDegraded),
        status::INVALID_ARGUMENTS => Some(Error::InvalidArguments(
            "server rejected the request's arguments".to_string(),
        )),
        status::DISCONNECTED => Some(Error::Disconnected),
        status::NO_SUCH_POINT => Some(Error::NoSuchPoint),
        status::INVALID_TIME_RANGE => Some(Error::InvalidTimeRange {
            time: 0,
            min: MIN_TIME_NS,
            max: MAX_TIME_NS,
        }),
        other => Some(Error::Protocol(format!(
            "unrecognized wire status code {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_maps_to_no_error() {
        assert!(status_to_error(status::OK).is_none());
    }

    #[test]
    fn known_codes_map_to_their_variant() {
        assert!(matches!(
            status_to_error(status::WRONG_ENDPOINT),
            Some(crate::Error::WrongEndpoint)
        ));
        assert!(matches!(
            status_to_error(status::CLUSTER_DEGRADED),
            Some(crate::Error::ClusterDegraded)
        ));
        assert!(matches!(
            status_to_error(status::NO_SUCH_POINT),
            Some(crate::Error::NoSuchPoint)
        ));
    }

    #[test]
    fn unknown_code_becomes_a_protocol_error() {
        assert!(matches!(
            status_to_error(9999),
            Some(crate::Error::Protocol(_))
        ));
    }

    /// `RawPointProto`'s `value` field is a protobuf `double`, which prost
    /// represents as a plain `f64` -- encoding round-trips through
    /// `f64::to_bits`, so NaN payload and sign survive exactly. This checks
    /// the invariant the type carries rather than the wire bytes themselves.
    #[test]
    fn raw_point_preserves_exact_nan_bit_pattern() {
        let nan = f64::from_bits(0x7ff8_0000_0000_0001);
        let point = RawPointProto { time: 0, value: nan };
        assert_eq!(point.value.to_bits(), nan.to_bits());

        let neg_zero = RawPointProto {
            time: 0,
            value: -0.0,
        };
        assert!(neg_zero.value.is_sign_negative());
    }
}
