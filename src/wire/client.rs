use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint as TonicEndpoint};
use tonic::Request;

use crate::endpoint::{Connector, Transport};
use crate::mash::{Mash, Member};
use crate::model::{RawPoint, StatPoint, StreamId, Version};
use crate::stream::{QuerySink, QueryStream};
use crate::Error;

use super::proto::{
    status_to_error, CreateRequest, CreateResponse, InfoRequest, InfoResponse, InsertRequest,
    InsertResponse, InsertTvRequest, InsertTvResponse, NearestRequest, NearestResponse,
    RawValuesRequest, RawValuesResponse, WindowsRequest, WindowsResponse,
};

const SERVICE: &str = "/mash.Cluster";

/// Thin wrapper over `tonic::client::Grpc<Channel>`, authored by hand the
/// way `tonic-build` would generate it for a service named `Cluster`. One
/// method per RPC named in the external interface.
#[derive(Clone)]
struct WireClient {
    inner: Grpc<Channel>,
}

impl WireClient {
    fn path(method: &str) -> PathAndQuery {
        PathAndQuery::from_str(&format!("{SERVICE}/{method}")).expect("static path is valid")
    }

    async fn unary<Req, Resp>(&self, method: &str, req: Req) -> Result<Resp, Error>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        let mut client = self.inner.clone();
        client.ready().await?;
        let response = client
            .unary(Request::new(req), Self::path(method), ProstCodec::default())
            .await?;
        Ok(response.into_inner())
    }

    async fn server_streaming<Req, Resp>(
        &self,
        method: &str,
        req: Req,
    ) -> Result<tonic::Streaming<Resp>, Error>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        let mut client = self.inner.clone();
        client.ready().await?;
        let response = client
            .server_streaming(Request::new(req), Self::path(method), ProstCodec::default())
            .await?;
        Ok(response.into_inner())
    }
}

/// `Transport` backed by a live gRPC channel.
#[derive(Clone)]
pub struct GrpcTransport {
    client: WireClient,
}

#[async_trait::async_trait]
impl Transport for GrpcTransport {
    async fn info(&self) -> Result<Mash, Error> {
        let resp: InfoResponse = self.client.unary("Info", InfoRequest {}).await?;
        let members = resp
            .members
            .into_iter()
            .map(|m| Member {
                hash: m.hash,
                addresses: m.addresses,
            })
            .collect();
        Ok(Mash::new(resp.revision, members))
    }

    async fn create(
        &self,
        stream_id: StreamId,
        collection: String,
        tags: HashMap<String, String>,
        annotation: bytes::Bytes,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        let resp: CreateResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resp = self.client.unary(
                "Create",
                CreateRequest {
                    stream_id: stream_id.as_ref().to_vec(),
                    collection,
                    tags,
                    annotation,
                },
            ) => resp?,
        };
        match status_to_error(resp.status) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn insert(
        &self,
        stream_id: StreamId,
        points: &[RawPoint],
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        let resp: InsertResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resp = self.client.unary(
                "Insert",
                InsertRequest {
                    stream_id: stream_id.as_ref().to_vec(),
                    points: points
                        .iter()
                        .map(|p| super::proto::RawPointProto {
                            time: p.time,
                            value: p.value,
                        })
                        .collect(),
                },
            ) => resp?,
        };
        match status_to_error(resp.status) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn insert_tv(
        &self,
        stream_id: StreamId,
        times: &[i64],
        values: &[f64],
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        let resp: InsertTvResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resp = self.client.unary(
                "InsertTv",
                InsertTvRequest {
                    stream_id: stream_id.as_ref().to_vec(),
                    times: times.to_vec(),
                    values: values.to_vec(),
                },
            ) => resp?,
        };
        match status_to_error(resp.status) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn nearest(
        &self,
        stream_id: StreamId,
        time: i64,
        version: Version,
        backward: bool,
        cancel: CancellationToken,
    ) -> Result<(RawPoint, Version), Error> {
        let resp: NearestResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            resp = self.client.unary(
                "Nearest",
                NearestRequest {
                    stream_id: stream_id.as_ref().to_vec(),
                    t_ns: time,
                    version,
                    backward,
                },
            ) => resp?,
        };
        if let Some(e) = status_to_error(resp.status) {
            return Err(e);
        }
        let point = resp
            .point
            .ok_or_else(|| Error::Protocol("Nearest response carried OK status but no point".into()))?;
        Ok((
            RawPoint {
                time: point.time,
                value: point.value,
            },
            resp.version,
        ))
    }

    fn raw_values(
        &self,
        stream_id: StreamId,
        start: i64,
        end: i64,
        version: Version,
        cancel: CancellationToken,
    ) -> QueryStream<RawPoint> {
        let (sink, stream) = QuerySink::channel(16);
        let client = self.client.clone();
        tokio::spawn(async move {
            let req = RawValuesRequest {
                stream_id: stream_id.as_ref().to_vec(),
                start_ns: start,
                end_ns: end,
                version,
            };
            let mut messages = match client
                .server_streaming::<_, RawValuesResponse>("RawValues", req)
                .await
            {
                Ok(s) => s,
                Err(e) => return sink.finish(version, Some(e)),
            };
            let mut last_version = version;
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        return sink.finish(last_version, Some(Error::Cancelled));
                    }
                    next = messages.message() => next,
                };
                match next {
                    Ok(Some(msg)) => {
                        last_version = msg.version;
                        if let Some(e) = status_to_error(msg.status) {
                            return sink.finish(last_version, Some(e));
                        }
                        match msg.point {
                            Some(p) => {
                                if !sink
                                    .send(RawPoint {
                                        time: p.time,
                                        value: p.value,
                                    })
                                    .await
                                {
                                    return;
                                }
                            }
                            None => return sink.finish(last_version, None),
                        }
                    }
                    Ok(None) => return sink.finish(last_version, None),
                    Err(status) => return sink.finish(last_version, Some(Error::Grpc(status))),
                }
            }
        });
        stream
    }

    fn windows(
        &self,
        stream_id: StreamId,
        start: i64,
        end: i64,
        width: i64,
        depth: u32,
        version: Version,
        cancel: CancellationToken,
    ) -> QueryStream<StatPoint> {
        let (sink, stream) = QuerySink::channel(16);
        let client = self.client.clone();
        tokio::spawn(async move {
            let req = WindowsRequest {
                stream_id: stream_id.as_ref().to_vec(),
                start_ns: start,
                end_ns: end,
                width_ns: width,
                depth,
                version,
            };
            let mut messages = match client
                .server_streaming::<_, WindowsResponse>("Windows", req)
                .await
            {
                Ok(s) => s,
                Err(e) => return sink.finish(version, Some(e)),
            };
            let mut last_version = version;
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => {
                        return sink.finish(last_version, Some(Error::Cancelled));
                    }
                    next = messages.message() => next,
                };
                match next {
                    Ok(Some(msg)) => {
                        last_version = msg.version;
                        if let Some(e) = status_to_error(msg.status) {
                            return sink.finish(last_version, Some(e));
                        }
                        match msg.stat {
                            Some(s) => {
                                if !sink
                                    .send(StatPoint {
                                        time: s.time,
                                        min: s.min,
                                        mean: s.mean,
                                        max: s.max,
                                        count: s.count,
                                    })
                                    .await
                                {
                                    return;
                                }
                            }
                            None => return sink.finish(last_version, None),
                        }
                    }
                    Ok(None) => return sink.finish(last_version, None),
                    Err(status) => return sink.finish(last_version, Some(Error::Grpc(status))),
                }
            }
        });
        stream
    }
}

/// Dials an address down to a `GrpcTransport`. The channel itself connects
/// lazily (so this succeeds even against a member that is momentarily
/// unreachable, matching the cache's expectation that dialing is cheap and
/// failures surface on the first real call); `dial_timeout` only bounds the
/// initial TCP/TLS handshake that first real call triggers.
pub async fn connect(address: &str, dial_timeout: Duration) -> Result<GrpcTransport, Error> {
    tracing::trace!(address, ?dial_timeout, "constructing lazy channel");
    let endpoint = TonicEndpoint::from_shared(address.to_string())?.connect_timeout(dial_timeout);
    let channel = endpoint.connect_lazy();
    Ok(GrpcTransport {
        client: WireClient {
            inner: Grpc::new(channel),
        },
    })
}

/// Tries a member's candidate addresses in order, returning the first one
/// that dials successfully. `dial_timeout` comes from `ConnectOptions` and
/// is applied to every candidate address's handshake.
pub struct GrpcConnector {
    dial_timeout: Duration,
}

impl GrpcConnector {
    pub fn new(dial_timeout: Duration) -> Self {
        GrpcConnector { dial_timeout }
    }
}

impl Default for GrpcConnector {
    fn default() -> Self {
        GrpcConnector::new(crate::ConnectOptions::default().dial_timeout)
    }
}

#[async_trait::async_trait]
impl Connector for GrpcConnector {
    async fn connect(&self, addresses: &[String]) -> Result<Arc<dyn Transport>, Error> {
        let mut last_err: Option<Error> = None;
        for address in addresses {
            match connect(address, self.dial_timeout).await {
                Ok(transport) => return Ok(Arc::new(transport)),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(|| {
            Error::Unreachable("no candidate addresses were given".to_string())
        }))
    }
}
