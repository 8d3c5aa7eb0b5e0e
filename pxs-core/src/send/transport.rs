//! The worker's view of the connection.

use async_trait::async_trait;
use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::Mutex;
use tokio_util::codec::FramedWrite;

use crate::codec::PxsCodec;
use crate::error::PxsError;
use crate::packet::Message;

/// Sends one message on a connection.
///
/// With `wait_for_bytes_written` false the message may still sit in an
/// outgoing buffer when the call returns.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: Message, wait_for_bytes_written: bool) -> Result<(), PxsError>;
}

/// [`Transport`] over any async writer, framed with [`PxsCodec`].
pub struct FramedTransport<W> {
    sink: Mutex<FramedWrite<W, PxsCodec>>,
}

impl<W: AsyncWrite + Unpin> FramedTransport<W> {
    pub fn new(writer: W) -> Self {
        Self {
            sink: Mutex::new(FramedWrite::new(writer, PxsCodec)),
        }
    }
}

#[async_trait]
impl<W> Transport for FramedTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, message: Message, wait_for_bytes_written: bool) -> Result<(), PxsError> {
        let mut sink = self.sink.lock().await;
        sink.feed(message).await?;
        if wait_for_bytes_written {
            sink.flush().await?;
        }
        Ok(())
    }
}
