use crate::{
    error::{Error, NetworkErrorKind},
    metrics::ClientMetrics,
    nonce::NonceSource,
    Result,
};
use alloy::{
    primitives::{Address, U64},
    rpc::{
        client::{ClientBuilder, RpcClient},
        json_rpc::{RequestPacket, ResponsePacket, RpcRecv, RpcSend},
        types::BlockNumberOrTag,
    },
    transports::{http::reqwest::Url, RpcError, TransportError, TransportErrorKind, TransportFut},
};
use async_trait::async_trait;
use std::{
    borrow::Cow,
    task::{Context, Poll},
    time::Duration,
};
use tower::{Layer, Service};
use tracing::{debug, trace};

/// A layer to be used with `ClientBuilder::layer` that records per-method request latency
/// and logs tx hashes returned by `eth_sendRawTransaction`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RpcMetricsLayer;

impl<S> Layer<S> for RpcMetricsLayer {
    type Service = RpcMetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RpcMetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct RpcMetricsService<S> {
    inner: S,
}

impl<S> Service<RequestPacket> for RpcMetricsService<S>
where
    S: Service<RequestPacket, Response = ResponsePacket, Error = TransportError>,
    S::Future: Send + 'static,
{
    type Response = ResponsePacket;
    type Error = TransportError;
    type Future = TransportFut<'static>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: RequestPacket) -> Self::Future {
        let method = match &req {
            RequestPacket::Single(inner_req) => inner_req.method().to_owned(),
            RequestPacket::Batch(_) => "batch".to_owned(),
        };

        let start_time = tokio::time::Instant::now();
        let fut = self.inner.call(req);

        Box::pin(async move {
            let res = fut.await;
            let elapsed = start_time.elapsed();
            ClientMetrics::global().observe_request(&method, elapsed);
            trace!("{method} took {}ms", elapsed.as_millis());
            if method == "eth_sendRawTransaction" {
                if let Ok(ResponsePacket::Single(inner_res)) = &res {
                    if let Some(payload) = inner_res.payload.as_success() {
                        debug!("tx delivered. hash: {}", payload.get());
                    }
                }
            }
            res
        })
    }
}

/// JSON-RPC transport shared by every client talking to one endpoint.
///
/// Cloning is cheap; clones reuse the same HTTP connection pool.
#[derive(Clone, Debug)]
pub struct RpcTransport {
    client: RpcClient,
    timeout: Duration,
}

impl RpcTransport {
    /// Connects over HTTP(S). Every call is bounded by `timeout`.
    pub fn http(url: Url, timeout: Duration) -> Self {
        let client = ClientBuilder::default().layer(RpcMetricsLayer).http(url);
        Self::from_client(client, timeout)
    }

    /// Wraps an already-built RPC client (e.g. a mocked one in tests).
    pub fn from_client(client: RpcClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends a single request and decodes its result.
    pub async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R>
    where
        P: RpcSend,
        R: RpcRecv,
    {
        self.execute(Cow::Borrowed(method), params).await
    }

    /// Untyped passthrough for methods the client does not wrap.
    pub async fn call_json(
        &self,
        method: impl Into<String>,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        self.execute(Cow::Owned(method.into()), params).await
    }

    async fn execute<P, R>(&self, method: Cow<'static, str>, params: P) -> Result<R>
    where
        P: RpcSend,
        R: RpcRecv,
    {
        let ctx = serde_json::to_string(&params).unwrap_or_default();
        let request = self.client.request(method.clone(), params);
        match tokio::time::timeout(self.timeout, request).await {
            Ok(Ok(res)) => Ok(res),
            Ok(Err(e)) => Err(map_rpc_error(&method, ctx, e)),
            Err(_) => Err(Error::network(
                method,
                ctx,
                NetworkErrorKind::RequestTimeout(self.timeout),
            )),
        }
    }
}

/// `params` is the JSON-encoded request params, kept for error context.
fn map_rpc_error(method: &str, params: String, err: RpcError<TransportErrorKind>) -> Error {
    match err {
        RpcError::ErrorResp(payload) => Error::Rpc {
            method: method.to_owned(),
            params,
            code: payload.code,
            message: payload.message.to_string(),
        },
        RpcError::DeserError { err, text } => Error::network(
            method,
            params,
            NetworkErrorKind::MalformedResponse(format!("{err}; response: {text}")),
        ),
        RpcError::NullResp => Error::network(
            method,
            params,
            NetworkErrorKind::MalformedResponse("null response".to_owned()),
        ),
        other => Error::network(method, params, NetworkErrorKind::Transport(other)),
    }
}

#[async_trait]
impl NonceSource for RpcTransport {
    async fn transaction_count(&self, address: Address) -> Result<u64> {
        let count: U64 = self
            .call(
                "eth_getTransactionCount",
                (address, BlockNumberOrTag::Pending),
            )
            .await?;
        Ok(count.to())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloy::{rpc::json_rpc::ErrorPayload, transports::mock::Asserter};

    pub fn mocked(asserter: &Asserter) -> RpcTransport {
        RpcTransport::from_client(
            RpcClient::mocked(asserter.clone()),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn decodes_success() {
        let asserter = Asserter::new();
        asserter.push_success(&"0x4d2");
        let transport = mocked(&asserter);
        let n: U64 = transport.call("eth_blockNumber", ()).await.unwrap();
        assert_eq!(n.to::<u64>(), 1234);
    }

    #[tokio::test]
    async fn error_response_is_rpc_error() {
        let asserter = Asserter::new();
        asserter.push_failure(ErrorPayload {
            code: -32000,
            message: "nonce too low".into(),
            data: None,
        });
        let transport = mocked(&asserter);
        let err = transport
            .call::<_, U64>("eth_sendRawTransaction", ("0x00",))
            .await
            .unwrap_err();
        match err {
            Error::Rpc {
                method,
                params,
                code,
                message,
            } => {
                assert_eq!(method, "eth_sendRawTransaction");
                assert_eq!(params, r#"["0x00"]"#);
                assert_eq!(code, -32000);
                assert_eq!(message, "nonce too low");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unparseable_result_is_network_error() {
        let asserter = Asserter::new();
        asserter.push_success(&"not a number");
        let transport = mocked(&asserter);
        let err = transport
            .call::<_, U64>("eth_blockNumber", ())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Network {
                source: NetworkErrorKind::MalformedResponse(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn nonce_source_uses_pending_count() {
        let asserter = Asserter::new();
        asserter.push_success(&"0x2a");
        let transport = mocked(&asserter);
        let n = transport
            .transaction_count(Address::with_last_byte(1))
            .await
            .unwrap();
        assert_eq!(n, 42);
    }

    #[tokio::test]
    async fn refused_connection_is_network_error() {
        // nothing listens on port 1
        let transport = RpcTransport::http(
            "http://127.0.0.1:1".parse().unwrap(),
            Duration::from_secs(5),
        );
        let err = transport
            .call::<_, U64>("eth_getBalance", (Address::with_last_byte(1), "latest"))
            .await
            .unwrap_err();
        match err {
            Error::Network {
                method,
                params,
                source: NetworkErrorKind::Transport(_),
            } => {
                assert_eq!(method, "eth_getBalance");
                assert_eq!(
                    params,
                    r#"["0x0000000000000000000000000000000000000001","latest"]"#
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
