use crate::Error;

/// Lower bound (inclusive) of the valid insertion/query time domain, in
/// nanoseconds: `-(16 << 56)`.
pub const MIN_TIME_NS: i64 = -(16i64 << 56);

/// Upper bound (exclusive) of the valid insertion/query time domain, in
/// nanoseconds: `48 << 56`.
pub const MAX_TIME_NS: i64 = 48i64 << 56;

/// Validates that `time` falls within `[MIN_TIME_NS, MAX_TIME_NS)`.
pub fn validate_time_range(time: i64) -> Result<(), Error> {
    if time < MIN_TIME_NS || time >= MAX_TIME_NS {
        Err(Error::InvalidTimeRange {
            time,
            min: MIN_TIME_NS,
            max: MAX_TIME_NS,
        })
    } else {
        Ok(())
    }
}

/// Opaque 16-byte stream identifier. Equality is bytewise; no other
/// structure is inspected client-side.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StreamId(pub [u8; 16]);

impl StreamId {
    /// Generates a stream id with no particular meaning, used to bootstrap
    /// administrative calls that aren't bound to a real stream (see
    /// `Router::any_endpoint`). Backed by a v4 UUID: 16 random bytes is
    /// exactly what's needed here and the dependency is already present for
    /// `Endpoint` dial bookkeeping.
    pub fn random() -> Self {
        StreamId(*uuid::Uuid::new_v4().as_bytes())
    }
}

impl From<[u8; 16]> for StreamId {
    fn from(bytes: [u8; 16]) -> Self {
        StreamId(bytes)
    }
}

impl AsRef<[u8]> for StreamId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// `(time_ns, value)`. Bit-exact preservation of `value` -- including NaN
/// payload and sign -- is required; this holds transparently because the
/// wire encoding uses protobuf `double`, which round-trips through
/// `f64::to_bits`/`from_bits`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RawPoint {
    pub time: i64,
    pub value: f64,
}

/// Aggregate over a window: min/mean/max/count, `time` marking the window
/// start.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StatPoint {
    pub time: i64,
    pub min: f64,
    pub mean: f64,
    pub max: f64,
    pub count: u64,
}

/// Server-issued monotonic per-stream counter. `0` means "use the latest".
pub type Version = u64;
