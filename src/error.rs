/// Error taxonomy for the routing/dispatch core. Variants correspond to the
/// kinds in the error-handling design, not to wire-level status codes
/// one-for-one -- `status_to_error` in `wire::proto` is what does that
/// translation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The `Handle` has been disconnected; no further operation may succeed.
    #[error("handle is disconnected")]
    Disconnected,

    /// The active MASH has no owner for this stream id.
    #[error("cluster is degraded: no owner for this stream")]
    ClusterDegraded,

    /// The contacted endpoint does not own this stream. Internal to the
    /// retry loop; should not usually escape `RetryDispatcher`, but can once
    /// the retry budget is exhausted or data has already been yielded.
    #[error("contacted endpoint does not own this stream")]
    WrongEndpoint,

    /// No candidate address for an endpoint yielded a live channel.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    /// `Connect` exhausted every candidate address without finding a live,
    /// responsive seed node.
    #[error("no reachable endpoint among the given candidates")]
    NoReachable,

    /// `Router::resync_mash` exhausted every candidate (cached endpoints and
    /// MASH members) without completing an `Info()` call. Fatal for the
    /// operation that triggered it.
    #[error("no endpoints reachable while resyncing the routing table")]
    NoEndpointsReachable,

    /// Caller-supplied arguments failed validation.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The requested time lies outside the valid domain range.
    #[error("time {time} outside valid range [{min}, {max})")]
    InvalidTimeRange { time: i64, min: i64, max: i64 },

    /// No point satisfies the query (e.g. `Nearest` on an empty stream).
    #[error("no such point")]
    NoSuchPoint,

    /// The caller's cancellation token fired.
    #[error("operation cancelled")]
    Cancelled,

    /// The server returned a wire-level status this layer doesn't
    /// understand, or behaved in a way the protocol doesn't allow (e.g. a
    /// streaming RPC that never sent a terminal message).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Low-level gRPC failure, not an application-level wire status.
    #[error(transparent)]
    Grpc(#[from] tonic::Status),

    /// Channel construction/dial failure.
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
}

impl Error {
    /// True for errors that the retry loop is permitted to cure by
    /// resyncing the MASH and redispatching.
    pub(crate) fn is_wrong_endpoint(&self) -> bool {
        matches!(self, Error::WrongEndpoint)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
