//! Framed TCP transport to the bridge.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use futures::future::BoxFuture;
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

use comfoconnect_protocol::{
    decode_envelope, decode_length, encode_envelope, DeviceId, Envelope, FRAME_LENGTH_SIZE,
};

use crate::error::{ClientError, Result};

/// Opens byte streams to a bridge.
pub trait Connector: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn connect(&self) -> BoxFuture<'_, io::Result<Self::Stream>>;
}

/// Plain TCP connector.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: SocketAddr,
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr, connect_timeout: Duration) -> Self {
        Self {
            addr,
            connect_timeout,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Connector for TcpConnector {
    type Stream = TcpStream;

    fn connect(&self) -> BoxFuture<'_, io::Result<TcpStream>> {
        Box::pin(async move {
            debug!("Connecting to {} (timeout {:?})", self.addr, self.connect_timeout);
            let stream = match tokio::time::timeout(
                self.connect_timeout,
                TcpStream::connect(self.addr),
            )
            .await
            {
                Ok(Ok(s)) => s,
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", self.addr),
                    ))
                }
            };
            stream.set_nodelay(true)?;
            Ok(stream)
        })
    }
}

/// Accumulates stream bytes until a whole frame is available.
///
/// Partial frames stay buffered across calls, so a read that is cancelled
/// or times out never loses data.
struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(4096),
        }
    }

    async fn read_frame(&mut self, timeout: Duration) -> Result<Option<Bytes>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let length = decode_length(&self.buf)
                .map_err(|e| ClientError::ConnectionLost(format!("framing error: {}", e)))?;
            if let Some(total_len) = length {
                let frame_len = FRAME_LENGTH_SIZE + total_len as usize;
                if self.buf.len() >= frame_len {
                    return Ok(Some(self.buf.split_to(frame_len).freeze()));
                }
                self.buf.reserve(frame_len - self.buf.len());
            }

            match tokio::time::timeout_at(deadline, self.inner.read_buf(&mut self.buf)).await {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    let reason = if self.buf.is_empty() {
                        "closed by bridge".to_string()
                    } else {
                        format!("closed by bridge mid-frame ({} bytes buffered)", self.buf.len())
                    };
                    return Err(ClientError::ConnectionLost(reason));
                }
                Ok(Ok(n)) => trace!("Read {} bytes, {} buffered", n, self.buf.len()),
                Ok(Err(e)) => return Err(ClientError::ConnectionLost(e.to_string())),
            }
        }
    }
}

/// A connection to one bridge.
///
/// Writes are serialized behind one lock so frames never interleave. Reads
/// are expected from one task at a time.
pub struct Transport<C: Connector> {
    connector: C,
    local_id: DeviceId,
    reader: AsyncMutex<Option<FrameReader<ReadHalf<C::Stream>>>>,
    writer: AsyncMutex<Option<WriteHalf<C::Stream>>>,
    connected: AtomicBool,
    last_write: Mutex<Instant>,
}

impl<C: Connector> Transport<C> {
    pub fn new(connector: C, local_id: DeviceId) -> Self {
        Self {
            connector,
            local_id,
            reader: AsyncMutex::new(None),
            writer: AsyncMutex::new(None),
            connected: AtomicBool::new(false),
            last_write: Mutex::new(Instant::now()),
        }
    }

    pub fn local_id(&self) -> DeviceId {
        self.local_id
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Open the stream. Does nothing when already connected.
    pub async fn connect(&self) -> Result<()> {
        if self.is_connected() {
            return Ok(());
        }

        let stream = self.connector.connect().await?;
        let (read_half, write_half) = tokio::io::split(stream);
        *self.reader.lock().await = Some(FrameReader::new(read_half));
        *self.writer.lock().await = Some(write_half);
        *self.last_write.lock() = Instant::now();
        self.connected.store(true, Ordering::Release);

        info!("Transport connected");
        Ok(())
    }

    /// Close the stream. Safe to call repeatedly.
    pub async fn disconnect(&self) {
        let was_connected = self.connected.swap(false, Ordering::AcqRel);

        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown failed: {}", e);
            }
        }
        self.reader.lock().await.take();

        if was_connected {
            info!("Transport disconnected");
        }
    }

    /// Send one envelope as a single frame.
    pub async fn write_message(&self, envelope: &Envelope) -> Result<()> {
        let frame = encode_envelope(envelope)?;

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ClientError::NotConnected)?;

        trace!(
            "Sending {:?} (ref {:?}, {} bytes)",
            envelope.operation(),
            envelope.header.reference,
            frame.len()
        );
        let sent = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };

        match sent {
            Ok(()) => {
                *self.last_write.lock() = Instant::now();
                Ok(())
            }
            Err(e) => {
                warn!("Write failed: {}", e);
                guard.take();
                self.connected.store(false, Ordering::Release);
                Err(ClientError::ConnectionLost(e.to_string()))
            }
        }
    }

    /// Read the next envelope addressed to this client.
    ///
    /// Returns `Ok(None)` when nothing arrived within `timeout`. A frame
    /// that cannot be decoded, or that is addressed elsewhere, is consumed
    /// and reported as a protocol error; the stream stays usable.
    pub async fn read_message(&self, timeout: Duration) -> Result<Option<Envelope>> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(ClientError::NotConnected)?;

        let frame = match reader.read_frame(timeout).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) => {
                guard.take();
                self.connected.store(false, Ordering::Release);
                return Err(e);
            }
        };
        drop(guard);

        let envelope = decode_envelope(&frame)?;
        envelope.ensure_destination(&self.local_id)?;
        trace!(
            "Received {:?} (ref {:?}, result {:?})",
            envelope.operation(),
            envelope.header.reference,
            envelope.header.result
        );
        Ok(Some(envelope))
    }

    /// Time since the last frame was written.
    pub fn idle_for(&self) -> Duration {
        self.last_write.lock().elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comfoconnect_protocol::schema::{KeepAlive, VersionRequest};
    use comfoconnect_protocol::{OperationType, ProtocolError};
    use tokio::io::DuplexStream;

    struct DuplexConnector(Mutex<Option<DuplexStream>>);

    impl Connector for DuplexConnector {
        type Stream = DuplexStream;

        fn connect(&self) -> BoxFuture<'_, io::Result<DuplexStream>> {
            let stream = self.0.lock().take();
            Box::pin(async move {
                stream.ok_or_else(|| io::Error::new(io::ErrorKind::ConnectionRefused, "used"))
            })
        }
    }

    fn local() -> DeviceId {
        DeviceId::new([0x11; 16])
    }

    fn bridge() -> DeviceId {
        DeviceId::new([0x22; 16])
    }

    async fn pair() -> (Transport<DuplexConnector>, DuplexStream) {
        let (client, server) = tokio::io::duplex(4096);
        let transport = Transport::new(DuplexConnector(Mutex::new(Some(client))), local());
        transport.connect().await.unwrap();
        (transport, server)
    }

    #[tokio::test]
    async fn test_read_split_frame() {
        let (transport, mut server) = pair().await;
        let frame = encode_envelope(&Envelope::request(bridge(), local(), 3, KeepAlive {})).unwrap();

        server.write_all(&frame[..5]).await.unwrap();
        assert!(transport
            .read_message(Duration::from_millis(50))
            .await
            .unwrap()
            .is_none());

        server.write_all(&frame[5..]).await.unwrap();
        let msg = transport
            .read_message(Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.operation(), OperationType::KeepAlive);
        assert_eq!(msg.header.reference, Some(3));
    }

    #[tokio::test]
    async fn test_two_frames_in_one_write() {
        let (transport, mut server) = pair().await;
        let mut bytes = encode_envelope(&Envelope::request(bridge(), local(), 1, KeepAlive {}))
            .unwrap()
            .to_vec();
        bytes.extend_from_slice(
            &encode_envelope(&Envelope::request(bridge(), local(), 2, VersionRequest {})).unwrap(),
        );
        server.write_all(&bytes).await.unwrap();

        let first = transport.read_message(Duration::from_secs(1)).await.unwrap().unwrap();
        let second = transport.read_message(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.header.reference, Some(1));
        assert_eq!(second.operation(), OperationType::VersionRequest);
    }

    #[tokio::test]
    async fn test_foreign_destination_is_skipped() {
        let (transport, mut server) = pair().await;
        let stray = Envelope::request(bridge(), DeviceId::new([0x33; 16]), 1, KeepAlive {});
        server.write_all(&encode_envelope(&stray).unwrap()).await.unwrap();
        server
            .write_all(&encode_envelope(&Envelope::request(bridge(), local(), 2, KeepAlive {})).unwrap())
            .await
            .unwrap();

        let result = transport.read_message(Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(ClientError::Protocol(ProtocolError::ForeignDestination { .. }))
        ));
        let next = transport.read_message(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(next.header.reference, Some(2));
    }

    #[tokio::test]
    async fn test_eof_mid_frame() {
        let (transport, mut server) = pair().await;
        let frame = encode_envelope(&Envelope::request(bridge(), local(), 1, KeepAlive {})).unwrap();
        server.write_all(&frame[..10]).await.unwrap();
        drop(server);

        let result = transport.read_message(Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ClientError::ConnectionLost(_))));
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_twice() {
        let (transport, _server) = pair().await;
        transport.disconnect().await;
        transport.disconnect().await;

        let msg = Envelope::request(local(), bridge(), 1, KeepAlive {});
        assert!(matches!(
            transport.write_message(&msg).await,
            Err(ClientError::NotConnected)
        ));
        assert!(matches!(
            transport.read_message(Duration::from_millis(10)).await,
            Err(ClientError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_write_frame() {
        let (transport, mut server) = pair().await;
        let msg = Envelope::request(local(), bridge(), 9, VersionRequest {});
        transport.write_message(&msg).await.unwrap();

        let expected = encode_envelope(&msg).unwrap();
        let mut buf = vec![0u8; expected.len()];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..], &expected[..]);
    }
}
