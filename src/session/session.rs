use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::codec::FrameCodec;
use crate::config::Config;
use crate::envelope::{Envelope, encode};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{
    AssembledMessage, ClientHandshake, Endpoint, Frame, HandshakeResponse, MessageAssembler,
    OpCode,
};
use crate::session::SessionState;

/// An open client connection to the server under test.
///
/// Pings are answered before the next read or write, pongs are swallowed and
/// a close frame from the server is echoed. Dropping a session closes the
/// underlying socket without a close handshake; call [`Session::close`] for
/// an orderly shutdown.
pub struct Session<T = TcpStream> {
    codec: FrameCodec<T>,
    state: SessionState,
    assembler: MessageAssembler,
    pending_pong: Option<Vec<u8>>,
    endpoint: Endpoint,
    close_timeout: Duration,
    shut_down: bool,
}

impl Session<TcpStream> {
    /// Connect to `uri` and complete the opening handshake.
    ///
    /// TCP connect and handshake share one `config.timeouts.connect` budget.
    ///
    /// # Errors
    ///
    /// Every failure, including an unparsable URI, is returned as
    /// [`Error::Connection`].
    pub async fn open(uri: &str, config: &Config) -> Result<Self> {
        let endpoint = Endpoint::parse(uri).map_err(into_connection)?;
        debug!(endpoint = %endpoint, "connecting");

        let connect = async {
            let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
            stream.set_nodelay(true)?;
            Session::upgrade(stream, endpoint.clone(), config).await
        };

        match timeout(config.timeouts.connect, connect).await {
            Ok(result) => result.map_err(into_connection),
            Err(_) => Err(Error::Connection(format!(
                "timed out after {:?} connecting to {}",
                config.timeouts.connect, endpoint
            ))),
        }
    }
}

impl<T> Session<T> {
    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` while envelopes can be sent.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// The endpoint this session is connected to.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> Session<T> {
    /// Complete the opening handshake over an already connected stream.
    ///
    /// # Errors
    ///
    /// Every failure is returned as [`Error::Connection`], including running
    /// past `config.timeouts.connect`.
    pub async fn handshake(io: T, endpoint: Endpoint, config: &Config) -> Result<Self> {
        let display = endpoint.to_string();
        match timeout(config.timeouts.connect, Self::upgrade(io, endpoint, config)).await {
            Ok(result) => result.map_err(into_connection),
            Err(_) => Err(Error::Connection(format!(
                "timed out after {:?} upgrading {}",
                config.timeouts.connect, display
            ))),
        }
    }

    async fn upgrade(io: T, endpoint: Endpoint, config: &Config) -> Result<Self> {
        let mut codec = FrameCodec::new(io, config.limits.clone(), config.read_buffer_size);
        let client = ClientHandshake::new()?;

        let mut request = Vec::with_capacity(256);
        client.write_request(&endpoint, &mut request);
        codec.write_raw(&request).await?;

        let head = codec.read_handshake().await?;
        let response = HandshakeResponse::parse(&head)?;
        client.verify(&response)?;
        debug!(endpoint = %endpoint, "handshake complete");

        Ok(Self {
            codec,
            state: SessionState::Open,
            assembler: MessageAssembler::new(config.limits.clone()),
            pending_pong: None,
            endpoint,
            close_timeout: config.timeouts.close,
            shut_down: false,
        })
    }

    /// Encode `envelope` and send it as one text frame.
    ///
    /// # Errors
    ///
    /// - `Error::Encode` if the envelope cannot be serialized
    /// - `Error::Send` if the session is not open or the write fails; a
    ///   failed write also marks the session closed
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let text = encode(envelope)?;
        self.send_text(text).await?;
        debug!(envelope = %envelope, "sent");
        Ok(())
    }

    /// Send raw text as one frame, bypassing the envelope codec.
    ///
    /// # Errors
    ///
    /// `Error::Send` if the session is not open or the write fails.
    pub async fn send_text(&mut self, text: impl Into<String>) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::Send(format!("session is {}", self.state)));
        }

        let frame = Frame::text(text.into());
        if let Err(e) = self.write_frame(&frame).await {
            self.state = SessionState::Closed;
            return Err(Error::Send(e.to_string()));
        }
        Ok(())
    }

    /// Receive the next complete message.
    ///
    /// Returns `Ok(None)` once the stream has ended or the session is
    /// already closed. A close frame from the server is returned once as
    /// [`Message::Close`].
    ///
    /// Cancel safe: frames are only consumed once complete, and a pong or
    /// close echo cut off mid-write is finished by the next call that writes.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUtf8` for a text message that is not UTF-8; the
    ///   session stays usable
    /// - protocol and I/O errors, after which the session is closed
    pub async fn recv(&mut self) -> Result<Option<Message>> {
        if !self.state.can_receive() {
            return Ok(None);
        }

        loop {
            if let Err(e) = self.flush_pong().await {
                self.state = SessionState::Closed;
                return Err(e);
            }

            let frame = match self.codec.read_frame().await {
                Ok(frame) => frame,
                Err(Error::ConnectionClosed(_)) => {
                    debug!(endpoint = %self.endpoint, "stream ended");
                    self.state = SessionState::Closed;
                    return Ok(None);
                }
                Err(e) => {
                    self.state = SessionState::Closed;
                    return Err(e);
                }
            };

            match self.handle_frame(frame).await {
                Ok(Some(message)) => return Ok(Some(message)),
                Ok(None) => {}
                Err(Error::InvalidUtf8) => return Err(Error::InvalidUtf8),
                Err(e) => {
                    self.state = SessionState::Closed;
                    return Err(e);
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<Option<Message>> {
        frame.validate()?;
        match frame.opcode {
            OpCode::Ping => {
                debug!(len = frame.payload().len(), "ping");
                self.pending_pong = Some(frame.into_payload());
                Ok(None)
            }
            OpCode::Pong => Ok(None),
            OpCode::Close => {
                let close_frame = CloseFrame::from_payload(frame.payload());
                debug!(
                    close = %close_frame.as_ref().map(ToString::to_string).unwrap_or_default(),
                    "server closed"
                );
                if self.state == SessionState::Open {
                    let echo = match &close_frame {
                        Some(cf) => Frame::close(Some(cf.code.as_u16()), ""),
                        None => Frame::close(None, ""),
                    };
                    if let Err(e) = self.write_frame(&echo).await {
                        debug!(error = %e, "failed to echo close");
                    }
                }
                self.state = SessionState::Closed;
                Ok(Some(Message::Close(close_frame)))
            }
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                match self.assembler.push(frame)? {
                    Some(assembled) => into_message(assembled).map(Some),
                    None => Ok(None),
                }
            }
        }
    }

    /// Close the session.
    ///
    /// Sends a normal close frame if still open, waits up to the configured
    /// close timeout for the server's answer, then shuts the stream down.
    /// Never fails and may be called any number of times.
    pub async fn close(&mut self) {
        if self.state == SessionState::Open {
            self.state = SessionState::Closing;
            let frame = Frame::close(Some(CloseCode::Normal.as_u16()), "");
            match self.write_frame(&frame).await {
                Ok(()) => self.await_peer_close().await,
                Err(e) => warn!(endpoint = %self.endpoint, error = %e, "failed to send close frame"),
            }
        }
        self.state = SessionState::Closed;

        if !self.shut_down {
            self.shut_down = true;
            if let Err(e) = self.codec.shutdown().await {
                debug!(error = %e, "shutdown failed");
            }
            debug!(endpoint = %self.endpoint, "session closed");
        }
    }

    async fn await_peer_close(&mut self) {
        let wait = self.close_timeout;
        let drain = async {
            loop {
                match self.recv().await {
                    Ok(Some(Message::Close(_))) | Ok(None) | Err(_) => break,
                    Ok(Some(_)) => {}
                }
            }
        };
        if timeout(wait, drain).await.is_err() {
            debug!(?wait, "no close reply from server");
        }
    }

    /// Queue the pending pong, then push out anything an interrupted call
    /// left behind.
    async fn flush_pong(&mut self) -> Result<()> {
        if let Some(payload) = self.pending_pong.take() {
            self.codec.queue_frame(&Frame::pong(payload));
        }
        if self.codec.pending_write() == 0 {
            return Ok(());
        }
        self.codec.flush().await
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if let Some(payload) = self.pending_pong.take() {
            self.codec.queue_frame(&Frame::pong(payload));
        }
        self.codec.queue_frame(frame);
        self.codec.flush().await
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        if !self.shut_down {
            debug!(endpoint = %self.endpoint, state = %self.state, "session dropped without close");
        }
    }
}

fn into_message(assembled: AssembledMessage) -> Result<Message> {
    match assembled.opcode {
        OpCode::Text => String::from_utf8(assembled.payload)
            .map(Message::Text)
            .map_err(|_| Error::InvalidUtf8),
        OpCode::Binary => Ok(Message::Binary(assembled.payload)),
        other => Err(Error::ProtocolViolation(format!(
            "{:?} is not a data opcode",
            other
        ))),
    }
}

fn into_connection(err: Error) -> Error {
    match err {
        Error::Connection(_) => err,
        other => Error::Connection(other.to_string()),
    }
}
