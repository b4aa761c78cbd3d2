//! In-memory server peer for unit tests.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

use crate::config::Config;
use crate::envelope::{Envelope, decode, encode};
use crate::error::Error;
use crate::protocol::{Endpoint, Frame, compute_accept_key};
use crate::session::Session;

/// Server half of a duplex pipe that speaks just enough WebSocket to drive a
/// [`Session`] from tests.
pub(crate) struct MockServer {
    io: DuplexStream,
    buf: BytesMut,
}

impl MockServer {
    /// A connected session and its server peer, handshake done.
    pub(crate) async fn pair(config: &Config) -> (Session<DuplexStream>, MockServer) {
        Self::pair_with_buffer(config, 64 * 1024).await
    }

    /// [`MockServer::pair`] over a pipe that holds at most `capacity` bytes
    /// in each direction.
    pub(crate) async fn pair_with_buffer(
        config: &Config,
        capacity: usize,
    ) -> (Session<DuplexStream>, MockServer) {
        let (client, server) = duplex(capacity);
        let mut server = MockServer {
            io: server,
            buf: BytesMut::new(),
        };
        let endpoint = Endpoint::parse("ws://sim.test/ws").unwrap();

        let (session, ()) = tokio::join!(
            Session::handshake(client, endpoint, config),
            server.accept()
        );
        (session.unwrap(), server)
    }

    async fn accept(&mut self) {
        let head = loop {
            if let Some(pos) = self.buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break self.buf.split_to(pos + 4);
            }
            let n = self.io.read_buf(&mut self.buf).await.unwrap();
            assert!(n > 0, "client hung up during handshake");
        };

        let head = String::from_utf8(head.to_vec()).unwrap();
        let key = head
            .lines()
            .filter_map(|line| line.split_once(':'))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("sec-websocket-key"))
            .map(|(_, value)| value.trim().to_string())
            .expect("request without Sec-WebSocket-Key");

        let response = format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            compute_accept_key(&key)
        );
        self.io.write_all(response.as_bytes()).await.unwrap();
    }

    pub(crate) async fn send_frame(&mut self, frame: &Frame) {
        let mut out = BytesMut::new();
        frame.write(&mut out, None);
        self.io.write_all(&out).await.unwrap();
    }

    pub(crate) async fn send_text(&mut self, text: &str) {
        self.send_frame(&Frame::text(text)).await;
    }

    pub(crate) async fn send_envelope(&mut self, envelope: &Envelope) {
        self.send_text(&encode(envelope).unwrap()).await;
    }

    /// Next frame from the client, or `None` once it has hung up.
    pub(crate) async fn recv_frame(&mut self) -> Option<Frame> {
        loop {
            if !self.buf.is_empty() {
                match Frame::parse(&self.buf) {
                    Ok((frame, consumed)) => {
                        self.buf.advance(consumed);
                        return Some(frame);
                    }
                    Err(Error::IncompleteFrame { .. }) => {}
                    Err(e) => panic!("client sent a bad frame: {}", e),
                }
            }
            if self.io.read_buf(&mut self.buf).await.unwrap() == 0 {
                return None;
            }
        }
    }

    /// Next data frame from the client decoded as an envelope.
    pub(crate) async fn recv_envelope(&mut self) -> Envelope {
        loop {
            let frame = self.recv_frame().await.expect("client hung up");
            if frame.opcode.is_control() {
                continue;
            }
            return decode(frame.payload()).unwrap();
        }
    }
}
