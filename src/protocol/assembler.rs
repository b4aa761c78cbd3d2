//! Reassembly of fragmented data messages.

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// A complete data message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Text or Binary.
    pub opcode: OpCode,
    /// Concatenated payload of all fragments.
    pub payload: Vec<u8>,
}

/// Reassembles fragmented WebSocket messages.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    /// Returns Some(complete_message) when FIN=1, None otherwise.
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        match (frame.opcode, self.opcode) {
            (OpCode::Continuation, None) => {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
            (OpCode::Continuation, Some(_)) => {}
            (OpCode::Text | OpCode::Binary, None) => self.opcode = Some(frame.opcode),
            (OpCode::Text | OpCode::Binary, Some(_)) => {
                return Err(Error::ProtocolViolation(
                    "Expected continuation frame".into(),
                ));
            }
            (other, _) => {
                return Err(Error::ProtocolViolation(format!(
                    "{:?} frame is not a data frame",
                    other
                )));
            }
        }

        let new_size = self.buffer.len() + frame.payload().len();
        self.limits.check_message_size(new_size)?;
        self.buffer.extend_from_slice(frame.payload());

        if !frame.fin {
            return Ok(None);
        }

        match self.opcode.take() {
            Some(opcode) => Ok(Some(AssembledMessage {
                opcode,
                payload: self.buffer.split().to_vec(),
            })),
            None => Err(Error::ProtocolViolation(
                "Message finished without a start frame".into(),
            )),
        }
    }

    /// Returns `true` while a fragmented message is incomplete.
    #[must_use]
    pub fn in_progress(&self) -> bool {
        self.opcode.is_some()
    }
}
