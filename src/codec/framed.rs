use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, FrameHeader, MaskGenerator};

const READ_CHUNK: usize = 4096;

/// Client-role frame codec over an async byte stream.
///
/// Outgoing frames are always masked. Incoming frames must be unmasked with
/// clear RSV bits and are checked against [`Limits`] as soon as their header
/// is available.
pub struct FrameCodec<T> {
    io: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    limits: Limits,
    masks: MaskGenerator,
}

impl<T> FrameCodec<T> {
    #[must_use]
    pub fn new(io: T, limits: Limits, read_buffer_size: usize) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(read_buffer_size),
            write_buf: BytesMut::with_capacity(READ_CHUNK),
            limits,
            masks: MaskGenerator::new(),
        }
    }

    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Bytes received but not yet consumed as frames.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.read_buf.len()
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }
}

impl<T> FrameCodec<T> {
    /// Mask one frame and append it to the write buffer without writing.
    pub fn queue_frame(&mut self, frame: &Frame) {
        let mask = self.masks.next_mask();
        frame.write(&mut self.write_buf, Some(mask));
    }

    /// Frame bytes queued but not yet written.
    #[must_use]
    pub fn pending_write(&self) -> usize {
        self.write_buf.len()
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> FrameCodec<T> {
    /// Read the server's HTTP response head, up to and including the blank
    /// line. Anything after it stays buffered as frame data.
    pub async fn read_handshake(&mut self) -> Result<Vec<u8>> {
        loop {
            if let Some(pos) = self
                .read_buf
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
            {
                let head = self.read_buf.split_to(pos + 4);
                return Ok(head.to_vec());
            }

            self.limits.check_handshake_size(self.read_buf.len())?;

            self.read_buf.reserve(READ_CHUNK);
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::InvalidHandshake(
                    "Connection closed during handshake".into(),
                ));
            }
        }
    }

    /// Write raw bytes (the upgrade request) and flush.
    pub async fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.io.write_all(data).await?;
        self.io.flush().await?;
        Ok(())
    }

    /// Read the next frame.
    ///
    /// Cancel safe: partially received data stays in the read buffer.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if !self.read_buf.is_empty() {
                match FrameHeader::parse(&self.read_buf) {
                    Ok(header) => {
                        if header.mask.is_some() {
                            return Err(Error::MaskedServerFrame);
                        }
                        if header.rsv {
                            return Err(Error::ReservedBitsSet);
                        }
                        self.limits.check_frame_size(header.payload_len)?;

                        let total = header.frame_len()?;
                        if self.read_buf.len() >= total {
                            let (frame, consumed) = Frame::parse(&self.read_buf[..total])?;
                            self.read_buf.advance(consumed);
                            return Ok(frame);
                        }
                    }
                    Err(Error::IncompleteFrame { .. }) => {}
                    Err(e) => return Err(e),
                }
            }

            self.read_buf.reserve(READ_CHUNK);
            let n = self.io.read_buf(&mut self.read_buf).await?;
            if n == 0 {
                return Err(Error::ConnectionClosed(None));
            }
        }
    }

    /// Mask one frame into the write buffer and flush it.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.queue_frame(frame);
        self.flush().await
    }

    /// Write out everything queued, then flush the stream.
    ///
    /// Cancel safe: bytes leave the write buffer only once written, so an
    /// interrupted flush resumes mid-frame on the next call.
    pub async fn flush(&mut self) -> Result<()> {
        while self.write_buf.has_remaining() {
            let n = self.io.write_buf(&mut self.write_buf).await?;
            if n == 0 {
                return Err(Error::Io("stream refused queued frame bytes".into()));
            }
        }
        self.io.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.io.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OpCode;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, duplex};

    fn server_frame(frame: &Frame) -> Vec<u8> {
        let mut buf = BytesMut::new();
        frame.write(&mut buf, None);
        buf.to_vec()
    }

    #[tokio::test]
    async fn test_write_frame_is_masked() {
        let (client, mut server) = duplex(1024);
        let mut codec = FrameCodec::new(client, Limits::default(), 1024);

        codec.write_frame(&Frame::text("Hi")).await.unwrap();
        codec.flush().await.unwrap();

        let mut written = [0u8; 8];
        server.read_exact(&mut written).await.unwrap();
        assert_eq!(written[0], 0x81);
        assert_eq!(written[1], 0x82);

        let (frame, consumed) = Frame::parse(&written).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(frame.payload(), b"Hi");
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupted_flush_resumes_mid_frame() {
        let (client, mut server) = duplex(16);
        let mut codec = FrameCodec::new(client, Limits::default(), 64);

        let first = Frame::text(vec![b'a'; 100]);
        let interrupted =
            tokio::time::timeout(Duration::from_millis(50), codec.write_frame(&first)).await;
        assert!(interrupted.is_err());
        assert!(codec.pending_write() > 0);
        assert!(codec.pending_write() < first.wire_size(true));

        let reader = tokio::spawn(async move {
            let mut wire = vec![0u8; first.wire_size(true) + 8];
            server.read_exact(&mut wire).await.unwrap();
            wire
        });
        codec.write_frame(&Frame::text("Hi")).await.unwrap();
        let wire = reader.await.unwrap();

        let (frame, consumed) = Frame::parse(&wire).unwrap();
        assert_eq!(frame.payload(), &[b'a'; 100][..]);
        let (frame, _) = Frame::parse(&wire[consumed..]).unwrap();
        assert_eq!(frame.payload(), b"Hi");
        assert_eq!(codec.pending_write(), 0);
    }

    #[tokio::test]
    async fn test_read_frames_split_across_reads() {
        let (client, mut server) = duplex(1024);
        let mut codec = FrameCodec::new(client, Limits::default(), 16);

        let mut data = server_frame(&Frame::text("Hello"));
        data.extend(server_frame(&Frame::new(true, OpCode::Binary, vec![1, 2, 3])));

        let writer = tokio::spawn(async move {
            for chunk in data.chunks(3) {
                server.write_all(chunk).await.unwrap();
                tokio::task::yield_now().await;
            }
            server
        });

        let first = codec.read_frame().await.unwrap();
        assert_eq!(first.payload(), b"Hello");
        let second = codec.read_frame().await.unwrap();
        assert_eq!(second.opcode, OpCode::Binary);
        assert_eq!(second.payload(), &[1, 2, 3]);

        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_read_rejects_masked_server_frame() {
        let (client, mut server) = duplex(1024);
        let mut codec = FrameCodec::new(client, Limits::default(), 1024);

        server
            .write_all(&[0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58])
            .await
            .unwrap();

        let result = codec.read_frame().await;
        assert!(matches!(result, Err(Error::MaskedServerFrame)));
    }

    #[tokio::test]
    async fn test_read_rejects_rsv_bits() {
        let (client, mut server) = duplex(1024);
        let mut codec = FrameCodec::new(client, Limits::default(), 1024);

        server.write_all(&[0xC1, 0x01, b'x']).await.unwrap();

        let result = codec.read_frame().await;
        assert!(matches!(result, Err(Error::ReservedBitsSet)));
    }

    #[tokio::test]
    async fn test_frame_limit_checked_before_payload_arrives() {
        let (client, mut server) = duplex(1024);
        let limits = Limits {
            max_frame_size: 100,
            ..Limits::default()
        };
        let mut codec = FrameCodec::new(client, limits, 1024);

        // Header announces 300 bytes; no payload follows.
        server.write_all(&[0x81, 0x7E, 0x01, 0x2C]).await.unwrap();

        let result = codec.read_frame().await;
        assert!(matches!(
            result,
            Err(Error::FrameTooLarge { size: 300, max: 100 })
        ));
    }

    #[tokio::test]
    async fn test_read_connection_closed() {
        let (client, server) = duplex(64);
        let mut codec = FrameCodec::new(client, Limits::default(), 64);
        drop(server);

        let result = codec.read_frame().await;
        assert!(matches!(result, Err(Error::ConnectionClosed(None))));
    }

    #[tokio::test]
    async fn test_read_handshake_keeps_trailing_frame_bytes() {
        let (client, mut server) = duplex(1024);
        let mut codec = FrameCodec::new(client, Limits::default(), 1024);

        let mut data = b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n".to_vec();
        data.extend(server_frame(&Frame::text("{}")));
        server.write_all(&data).await.unwrap();

        let head = codec.read_handshake().await.unwrap();
        assert!(head.ends_with(b"\r\n\r\n"));
        assert_eq!(codec.buffered(), 4);

        let frame = codec.read_frame().await.unwrap();
        assert_eq!(frame.payload(), b"{}");
    }

    #[tokio::test]
    async fn test_read_handshake_size_limit() {
        let (client, mut server) = duplex(64 * 1024);
        let limits = Limits {
            max_handshake_size: 64,
            ..Limits::default()
        };
        let mut codec = FrameCodec::new(client, limits, 1024);

        server.write_all(&[b'a'; 200]).await.unwrap();

        let result = codec.read_handshake().await;
        assert!(matches!(result, Err(Error::HandshakeTooLarge { .. })));
    }
}
