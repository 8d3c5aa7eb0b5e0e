//! Producer / observer side of a connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, trace, warn};

use crate::codec::PxsCodec;
use crate::error::PxsError;
use crate::message::MessageType;
use crate::protocol::{ImageWrapper, SizeHints};
use crate::send::{FramedTransport, SendFuture, SendWorkerConfig, StreamSendWorker};

/// One stream opened on a server, backed by a send worker.
#[derive(Debug)]
pub struct Stream {
    worker: StreamSendWorker,
    reader: JoinHandle<()>,
    events_bound: Arc<AtomicBool>,
    observer: bool,
}

impl Stream {
    /// Connect as a producer of `stream_id`.
    pub async fn connect(addr: impl ToSocketAddrs, stream_id: &str) -> Result<Self, PxsError> {
        Self::connect_with_config(addr, stream_id, SendWorkerConfig::default(), false).await
    }

    /// Connect as an observer of `stream_id`; no images may be sent.
    pub async fn connect_observer(
        addr: impl ToSocketAddrs,
        stream_id: &str,
    ) -> Result<Self, PxsError> {
        Self::connect_with_config(addr, stream_id, SendWorkerConfig::default(), true).await
    }

    pub async fn connect_with_config(
        addr: impl ToSocketAddrs,
        stream_id: &str,
        config: SendWorkerConfig,
        observer: bool,
    ) -> Result<Self, PxsError> {
        let socket = TcpStream::connect(addr).await?;
        socket.set_nodelay(true)?;
        let peer = socket.peer_addr()?;
        let (read, write) = socket.into_split();

        let transport = Arc::new(FramedTransport::new(write));
        let worker = StreamSendWorker::spawn(transport, stream_id, config)?;

        let events_bound = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_replies(
            FramedRead::new(read, PxsCodec),
            stream_id.to_string(),
            Arc::clone(&events_bound),
        ));

        let stream = Self {
            worker,
            reader,
            events_bound,
            observer,
        };
        let opened = if observer {
            stream.worker.enqueue_observer_open().await
        } else {
            stream.worker.enqueue_open().await
        };
        opened?;

        info!(stream = %stream_id, observer, "connected to {peer}");
        Ok(stream)
    }

    pub fn id(&self) -> &str {
        self.worker.stream_id()
    }

    pub fn is_observer(&self) -> bool {
        self.observer
    }

    /// The server accepted a bind request.
    pub fn is_events_bound(&self) -> bool {
        self.events_bound.load(Ordering::SeqCst)
    }

    pub fn send(&self, image: ImageWrapper) -> SendFuture {
        if self.observer {
            return SendFuture::ready(Err(PxsError::ProtocolViolation(
                "observers cannot send images",
            )));
        }
        self.worker.enqueue_image(image, false)
    }

    pub fn finish_frame(&self) -> SendFuture {
        self.worker.enqueue_finish()
    }

    pub fn send_and_finish(&self, image: ImageWrapper) -> SendFuture {
        if self.observer {
            return SendFuture::ready(Err(PxsError::ProtocolViolation(
                "observers cannot send images",
            )));
        }
        self.worker.enqueue_image(image, true)
    }

    pub fn send_size_hints(&self, hints: &SizeHints) -> SendFuture {
        self.worker.enqueue_size_hints(hints)
    }

    pub fn send_data(&self, data: impl Into<Bytes>) -> SendFuture {
        self.worker.enqueue_data(data.into())
    }

    pub fn register_for_events(&self, exclusive: bool) -> SendFuture {
        self.worker.enqueue_bind_request(exclusive)
    }

    /// Send Quit and stop the worker.
    pub async fn close(self) -> Result<(), PxsError> {
        let result = self.worker.enqueue_close().await;
        self.worker.stop().await;
        self.reader.abort();
        debug!(stream = %self.id(), "stream closed");
        result
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn read_replies(
    mut reader: FramedRead<tokio::net::tcp::OwnedReadHalf, PxsCodec>,
    stream_id: String,
    events_bound: Arc<AtomicBool>,
) {
    while let Some(next) = reader.next().await {
        let message = match next {
            Ok(message) => message,
            Err(e) => {
                warn!(stream = %stream_id, "reply stream error: {e}");
                break;
            }
        };

        match message.message_type() {
            MessageType::BindEventsReply => {
                let accepted = message.payload().first().is_some_and(|&b| b != 0);
                events_bound.store(accepted, Ordering::SeqCst);
                debug!(stream = %stream_id, accepted, "bind reply");
            }
            kind => trace!(stream = %stream_id, "{kind} from server ignored"),
        }
    }
    trace!(stream = %stream_id, "server closed the connection");
}
