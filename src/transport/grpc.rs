use std::{fs::read_to_string, sync::Mutex, time::Duration};

use tokio::{
    sync::{mpsc, watch, Mutex as AsyncMutex},
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{
    client::Grpc,
    codec::{CompressionEncoding, ProstCodec},
    codegen::http::uri::PathAndQuery,
    transport::{Certificate, Channel, ClientTlsConfig, Endpoint},
    Request,
};

use crate::{
    call::{CallDescriptor, Deadline},
    config::Config,
    error::{ClientError, StatusError, StatusKind},
    transport::{Connector, Transport},
};

const TEN_SECS: Duration = Duration::from_secs(10);
const OUTBOUND_CAPACITY: usize = 16;
const INBOUND_CAPACITY: usize = 16;

/// How the remote ended a call: `None` while it is still running.
type RemoteOutcome = Option<Result<(), StatusError>>;

/// Opens one HTTP/2 stream per call on a shared tonic [`Channel`].
#[derive(Clone)]
pub struct GrpcConnector {
    channel: Channel,
    gzip: bool,
}

impl GrpcConnector {
    #[must_use]
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            gzip: false,
        }
    }

    /// Compress requests and accept compressed responses.
    #[must_use]
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Builds a lazily connecting channel from `config`.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        debug!("Preparing gRPC client configuration");
        let mut endpoint = Endpoint::from_shared(config.grpc_url.clone())
            .map_err(|err| ClientError::InvalidUri(format!("{}: {err}", config.grpc_url)))?
            .connect_timeout(config.connect_timeout())
            .http2_keep_alive_interval(TEN_SECS)
            .tcp_keepalive(Some(TEN_SECS))
            .keep_alive_while_idle(true);

        if endpoint.uri().scheme_str() == Some("https") {
            // Use CA if provided, otherwise load certificates from system.
            let tls = if let Some(ca) = &config.grpc_ca {
                let ca = read_to_string(ca).map_err(|err| {
                    error!("Failed to read CA file: {err}");
                    ClientError::InvalidCaFile(err)
                })?;
                ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca))
            } else {
                ClientTlsConfig::new().with_native_roots()
            };
            endpoint = endpoint.tls_config(tls)?;
        }

        let connector = Self::new(endpoint.connect_lazy()).with_gzip(config.gzip);
        debug!("gRPC client configuration done");
        Ok(connector)
    }
}

#[tonic::async_trait]
impl<Req, Res> Connector<Req, Res> for GrpcConnector
where
    Req: prost::Message + Send + Sync + 'static,
    Res: prost::Message + Default + Send + Sync + 'static,
{
    type Transport = GrpcTransport<Req, Res>;

    async fn open(
        &self,
        call: &CallDescriptor,
        deadline: Option<Deadline>,
    ) -> Result<GrpcTransport<Req, Res>, StatusError> {
        let path = PathAndQuery::try_from(call.path()).map_err(|err| {
            StatusError::invalid_state(format!("invalid method path {}: {err}", call.path()))
        })?;
        let mut grpc = Grpc::new(self.channel.clone());
        if self.gzip {
            grpc = grpc
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        grpc.ready()
            .await
            .map_err(|err| StatusError::unavailable(format!("Service was not ready: {err}")))?;

        let (outbound_tx, outbound_rx) = mpsc::channel::<Req>(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) =
            mpsc::channel::<Result<Res, StatusError>>(INBOUND_CAPACITY);
        let mut request = Request::new(ReceiverStream::new(outbound_rx));
        if let Some(deadline) = deadline {
            // propagated to the server as `grpc-timeout`
            request.set_timeout(deadline.remaining());
        }

        // Response headers may only arrive once the server has seen every
        // request, so the call itself runs detached from the caller.
        let target = call.path();
        let (outcome_tx, outcome_rx) = watch::channel::<RemoteOutcome>(None);
        let reader = tokio::spawn(async move {
            let mut stream = match grpc
                .streaming(request, path, ProstCodec::<Req, Res>::default())
                .await
            {
                Ok(response) => response.into_inner(),
                Err(status) => {
                    debug!("gRPC call {target} failed before any response: {status}");
                    let err = StatusError::from(status);
                    outcome_tx.send_replace(Some(Err(err.clone())));
                    let _ = inbound_tx.send(Err(err)).await;
                    return;
                }
            };
            loop {
                match stream.message().await {
                    Ok(Some(message)) => {
                        if inbound_tx.send(Ok(message)).await.is_err() {
                            debug!("Response receiver for {target} disappeared");
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("gRPC stream for {target} has been closed");
                        outcome_tx.send_replace(Some(Ok(())));
                        break;
                    }
                    Err(status) => {
                        let err = StatusError::from(status);
                        outcome_tx.send_replace(Some(Err(err.clone())));
                        let _ = inbound_tx.send(Err(err)).await;
                        break;
                    }
                }
            }
        });

        Ok(GrpcTransport {
            outbound: Mutex::new(Some(outbound_tx)),
            inbound: AsyncMutex::new(inbound_rx),
            outcome: outcome_rx,
            reader,
        })
    }
}

/// One gRPC call: requests go out through a bounded channel, responses come
/// back from the detached reader task.
pub struct GrpcTransport<Req, Res> {
    outbound: Mutex<Option<mpsc::Sender<Req>>>,
    inbound: AsyncMutex<mpsc::Receiver<Result<Res, StatusError>>>,
    outcome: watch::Receiver<RemoteOutcome>,
    reader: JoinHandle<()>,
}

impl<Req, Res> GrpcTransport<Req, Res> {
    fn drop_outbound(&self) {
        if let Ok(mut outbound) = self.outbound.lock() {
            outbound.take();
        }
    }
}

#[tonic::async_trait]
impl<Req, Res> Transport for GrpcTransport<Req, Res>
where
    Req: Send + 'static,
    Res: Send + 'static,
{
    type Request = Req;
    type Response = Res;

    async fn send(&self, message: Req) -> Result<(), StatusError> {
        let tx = self
            .outbound
            .lock()
            .map_err(|_| StatusError::unknown("outbound lock poisoned"))?
            .clone();
        let Some(tx) = tx else {
            return Err(StatusError::invalid_state("send after half-close"));
        };
        if tx.send(message).await.is_ok() {
            return Ok(());
        }
        // tonic drops the request body once the call has ended; the status
        // that ended it follows through the reader
        rejected_send_status(self.outcome.clone()).await
    }

    fn close_send(&self) {
        self.drop_outbound();
    }

    async fn receive(&self) -> Result<Option<Res>, StatusError> {
        match self.inbound.lock().await.recv().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(err)) => Err(err),
            None => Ok(None),
        }
    }

    fn abort(&self, kind: StatusKind) {
        debug!("Aborting gRPC call ({kind})");
        // dropping the in-flight request resets the HTTP/2 stream
        self.reader.abort();
        self.drop_outbound();
    }

    fn close(&self) {
        self.reader.abort();
        self.drop_outbound();
    }
}

/// Outcome of a send the transport refused because the remote already ended
/// the call. A remote failure is reported as such. After a normal end the
/// message is dropped and the response side decides the outcome.
async fn rejected_send_status(
    mut outcome: watch::Receiver<RemoteOutcome>,
) -> Result<(), StatusError> {
    let ended = outcome
        .wait_for(Option::is_some)
        .await
        .ok()
        .and_then(|outcome| outcome.clone());
    match ended {
        Some(Err(status)) => Err(status),
        Some(Ok(())) => {
            debug!("Dropping request sent after the remote completed the call");
            Ok(())
        }
        None => Err(StatusError::unavailable("request stream closed by the transport")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejected_send_waits_for_remote_status() {
        let (tx, rx) = watch::channel::<RemoteOutcome>(None);
        let status = tokio::spawn(rejected_send_status(rx));
        tokio::task::yield_now().await;
        tx.send_replace(Some(Err(StatusError::invalid_argument(
            "Received a negative number: -2",
        ))));

        let err = status.await.unwrap().unwrap_err();
        assert_eq!(err.kind(), StatusKind::InvalidArgument);
        assert_eq!(err.message(), "Received a negative number: -2");
    }

    #[tokio::test]
    async fn test_rejected_send_after_normal_end() {
        let (_tx, rx) = watch::channel::<RemoteOutcome>(Some(Ok(())));
        assert_eq!(rejected_send_status(rx).await, Ok(()));
    }

    #[tokio::test]
    async fn test_rejected_send_without_status_is_unavailable() {
        let (tx, rx) = watch::channel::<RemoteOutcome>(None);
        drop(tx);
        let err = rejected_send_status(rx).await.unwrap_err();
        assert_eq!(err.kind(), StatusKind::Unavailable);
    }
}
