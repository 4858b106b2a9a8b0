// Copyright 2023 Divy Srivastava <dj.srivastava23@gmail.com>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::args::Arg;
use crate::buffer::Buffer;
use crate::error::{record, NodeError};
use crate::frame::{self, FrameError, FrameFlags};
use crate::handshake;
use crate::mask;
use crate::node::{ChainIo, IoStatus, Node};
use crate::uri::Uri;

const NAME: &str = "websocket";

/// Largest frame prefix: 10 header bytes plus a 4-byte masking key.
const MAX_HEADER: usize = 14;

#[derive(Clone, Copy)]
enum WriteState {
  /// Next `on_write` round emits the frame header.
  Header,
  /// Header is out; payload chunks follow. `mask_offset` keeps the XOR
  /// key phase across chunk boundaries.
  Payload { mask_offset: usize },
}

/// The WebSocket framing layer.
///
/// `on_init` runs the HTTP Upgrade handshake through the layers below
/// (skipped when the node is standalone). Afterwards each `write` emits
/// one frame and each `read` delivers exactly one whole frame's payload,
/// with its opcode and FIN bit reported through [`Arg::FrameInfo`].
/// Fragmented messages are handed to the caller frame by frame; this
/// layer does not reassemble them.
pub struct WsNode {
  masking_key: [u8; 4],
  frame_header: [u8; MAX_HEADER],
  write_state: WriteState,
}

impl WsNode {
  pub const HANDSHAKE_FAILED: i32 = -10000;
  pub const INVALID_OPCODE: i32 = -10001;
  pub const INVALID_CONTROL_FRAME_FORMAT: i32 = -10002;
  pub const INSUFF_READ_BUFFER: i32 = -10003;
  pub const INSUFF_WRITE_BUFFER: i32 = -10004;

  pub fn new() -> Self {
    Self {
      masking_key: [0; 4],
      frame_header: [0; MAX_HEADER],
      write_state: WriteState::Header,
    }
  }

  /// Installs the 4-byte masking key for outbound frames. An all-zero key
  /// disables masking (server-style frames); anything else masks every
  /// outgoing payload, as RFC 6455 requires from clients.
  pub fn set_masking_key(&mut self, key: [u8; 4]) {
    self.masking_key = key;
  }

  fn node_error(code: i32) -> NodeError {
    let message = match code {
      Self::HANDSHAKE_FAILED => "websocket handshake failed",
      Self::INVALID_OPCODE => "received invalid opcode",
      Self::INVALID_CONTROL_FRAME_FORMAT => {
        "control frame with payload data size larger than 125"
      }
      Self::INSUFF_READ_BUFFER => "insufficient websocket frame read buffer",
      Self::INSUFF_WRITE_BUFFER => "insufficient websocket frame write buffer",
      _ => "websocket error",
    };
    record(NodeError::new(NAME, code, message))
  }

  fn frame_error(err: FrameError) -> NodeError {
    match err {
      FrameError::InvalidOpcode => Self::node_error(Self::INVALID_OPCODE),
      FrameError::InvalidControlFrame => {
        Self::node_error(Self::INVALID_CONTROL_FRAME_FORMAT)
      }
      FrameError::BufferTooSmall { .. } => {
        Self::node_error(Self::INSUFF_WRITE_BUFFER)
      }
    }
  }

}

impl Default for WsNode {
  fn default() -> Self {
    Self::new()
  }
}

impl Node for WsNode {
  fn name(&self) -> &'static str {
    NAME
  }

  fn on_init(
    &mut self,
    uri: &Uri,
    io: &mut ChainIo<'_, '_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<(), NodeError> {
    if !io.has_lower() {
      // Standalone node: nothing to upgrade.
      return Ok(());
    }
    let key = handshake::generate_key();
    let expected_accept = handshake::derive_accept_key(&key);
    let request = handshake::build_request(uri, &key);
    {
      let staged = io.write_buf();
      staged.shift();
      if !staged.append(request.as_bytes()) {
        tracing::debug!(
          need = request.len(),
          "upgrade request does not fit the write buffer"
        );
        return Err(Self::node_error(Self::HANDSHAKE_FAILED));
      }
    }
    io.flush_write_buf()?;
    loop {
      let status = handshake::check_response(
        io.read_buf().readable(),
        &expected_accept,
      );
      match status {
        Ok(Some(n)) => {
          // Bytes past the response header stay buffered; they are the
          // first frames.
          io.read_buf().consume(n);
          tracing::debug!("websocket handshake complete");
          return Ok(());
        }
        Ok(None) => {
          if io.read_buf().remaining_space() == 0 {
            tracing::debug!("upgrade response exceeds the read buffer");
            return Err(Self::node_error(Self::HANDSHAKE_FAILED));
          }
          io.fill_read_buf()?;
        }
        Err(err) => {
          tracing::debug!(error = %err, "upgrade rejected");
          return Err(Self::node_error(Self::HANDSHAKE_FAILED));
        }
      }
    }
  }

  fn on_write(
    &mut self,
    input: &mut Buffer<'_>,
    output: &mut Buffer<'_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    let flags = match arg.as_deref() {
      Some(Arg::Flags(flags)) => *flags,
      _ => FrameFlags::default(),
    };
    output.shift();
    match self.write_state {
      WriteState::Header => {
        let mask_key =
          (self.masking_key != [0; 4]).then_some(self.masking_key);
        let header_len = frame::create(
          flags.opcode,
          flags.fin,
          mask_key.as_ref(),
          input.len() as u64,
          &mut self.frame_header,
        )
        .map_err(Self::frame_error)?;
        if output.remaining_space() < header_len {
          return Err(Self::node_error(Self::INSUFF_WRITE_BUFFER));
        }
        output.append(&self.frame_header[..header_len]);
        tracing::trace!(bytes = header_len, "frame header staged");
        self.write_state = WriteState::Payload { mask_offset: 0 };
        Ok(IoStatus::Again)
      }
      WriteState::Payload { mask_offset } => {
        if flags.opcode.is_control() && input.len() > 125 {
          return Err(Self::node_error(Self::INVALID_CONTROL_FRAME_FORMAT));
        }
        let take = usize::min(input.len(), output.remaining_space());
        if take == 0 && !input.is_empty() {
          return Err(Self::node_error(Self::INSUFF_WRITE_BUFFER));
        }
        if self.masking_key != [0; 4] {
          mask::mask_into(
            self.masking_key,
            mask_offset,
            &input.readable()[..take],
            output.writable(),
          );
          output.obtain(take);
        } else {
          output.append(&input.readable()[..take]);
        }
        input.consume(take);
        tracing::trace!(bytes = take, "frame payload staged");
        if !input.is_empty() {
          self.write_state = WriteState::Payload {
            mask_offset: mask_offset + take,
          };
          return Ok(IoStatus::Again);
        }
        self.write_state = WriteState::Header;
        Ok(IoStatus::Done)
      }
    }
  }

  fn on_read(
    &mut self,
    out: &mut Buffer<'_>,
    input: &mut Buffer<'_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    let header = match frame::parse_header(input.readable()) {
      Ok(Some(header)) => header,
      Ok(None) => return Ok(IoStatus::Again),
      Err(err) => return Err(Self::frame_error(err)),
    };
    if header.frame_size() > input.len() as u64 {
      return Ok(IoStatus::Again);
    }
    out.shift();
    if (out.remaining_space() as u64) < header.payload_len {
      return Err(Self::node_error(Self::INSUFF_READ_BUFFER));
    }
    let header_size = header.header_size();
    let payload_len = header.payload_len as usize;
    if header.masked {
      let data = input.readable();
      let key: [u8; 4] = data[header_size..header_size + 4].try_into().unwrap();
      let payload = &data[header_size + 4..header_size + 4 + payload_len];
      mask::mask_into(key, 0, payload, out.writable());
      out.obtain(payload_len);
      input.consume(header_size + 4 + payload_len);
    } else {
      let data = input.readable();
      out.append(&data[header_size..header_size + payload_len]);
      input.consume(header_size + payload_len);
    }
    if let Some(Arg::FrameInfo(slot)) = arg {
      **slot = FrameFlags {
        opcode: header.opcode,
        fin: header.fin,
      };
    }
    tracing::trace!(
      opcode = ?header.opcode,
      fin = header.fin,
      bytes = payload_len,
      "frame delivered"
    );
    Ok(IoStatus::Done)
  }

  fn on_close(&mut self) {
    self.write_state = WriteState::Header;
  }
}
