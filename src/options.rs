use std::time::Duration;

/// Tunables for a `Handle`, covering the knobs the teacher crates expose as
/// builder methods on their own retry/connection types (e.g.
/// `journal-client`'s `ExponentialBackoff::with_min`/`with_max`) rather than
/// hard-coded constants. Supplied once at `Handle::connect_with_options` and
/// shared by every operation the handle dispatches.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOptions {
    /// Per-dial timeout passed to `tonic::transport::Endpoint::connect_timeout`.
    pub dial_timeout: Duration,
    /// Deadline applied to each `Info()` probe `resync_mash` issues while
    /// hunting for a reachable member. The specification fixes this at two
    /// seconds; it's exposed here, as a tunable rather than a hard-coded
    /// constant, in the same spirit as `journal-client`'s `Retry` policy
    /// being pluggable -- the default matches the specified value.
    pub resync_deadline: Duration,
    /// Number of retries `RetryDispatcher` allows for a single logical
    /// operation before surfacing a persistent `WrongEndpoint`.
    pub retry_budget: u32,
    /// Bounded channel capacity backing each `QueryStream`'s data channel.
    pub stream_buffer: usize,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        ConnectOptions {
            dial_timeout: Duration::from_secs(20),
            resync_deadline: Duration::from_secs(2),
            retry_budget: crate::retry::MAX_RETRIES,
            stream_buffer: 16,
        }
    }
}
