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

//! Chain recursion torture tests with a scripted bottom layer: the top
//! level `read` must deliver exactly one message per call no matter how
//! the wire bytes are chunked on their way up.

use assert2::assert;
use wirestack::frame::{self, OpCode};
use wirestack::mask;
use wirestack::{
  Arg, Buffer, Chain, ChainIo, FrameFlags, IoStatus, Node, NodeArgs,
  NodeError, Uri, WsNode,
};

/// Bottom layer replaying a prerecorded byte stream, at most `chunk`
/// bytes per read. Writes are swallowed.
struct Replay {
  script: Vec<u8>,
  at: usize,
  chunk: usize,
}

impl Replay {
  fn new(script: Vec<u8>, chunk: usize) -> Self {
    Self {
      script,
      at: 0,
      chunk,
    }
  }
}

impl Node for Replay {
  fn name(&self) -> &'static str {
    "replay"
  }

  fn on_init(
    &mut self,
    _uri: &Uri,
    _io: &mut ChainIo<'_, '_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<(), NodeError> {
    Ok(())
  }

  fn on_write(
    &mut self,
    input: &mut Buffer<'_>,
    _output: &mut Buffer<'_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    input.clear();
    Ok(IoStatus::Done)
  }

  fn on_read(
    &mut self,
    out: &mut Buffer<'_>,
    _input: &mut Buffer<'_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    if self.at >= self.script.len() {
      return Err(NodeError::new("replay", -10001, "remote socket closed"));
    }
    let n = self
      .chunk
      .min(self.script.len() - self.at)
      .min(out.remaining_space());
    assert!(n > 0, "replay read with a full buffer");
    out.append(&self.script[self.at..self.at + n]);
    self.at += n;
    Ok(IoStatus::Done)
  }

  fn on_close(&mut self) {}
}

fn frame_bytes(
  opcode: OpCode,
  fin: bool,
  mask_key: Option<[u8; 4]>,
  payload: &[u8],
) -> Vec<u8> {
  let mut header = [0u8; 14];
  let n = frame::create(
    opcode,
    fin,
    mask_key.as_ref(),
    payload.len() as u64,
    &mut header,
  )
  .unwrap();
  let mut wire = header[..n].to_vec();
  match mask_key {
    Some(key) if !payload.is_empty() => {
      let mut masked = payload.to_vec();
      mask::apply_mask(key, &mut masked);
      wire.extend_from_slice(&masked);
    }
    _ => wire.extend_from_slice(payload),
  }
  wire
}

fn ws_chain<'b>(replay: Replay, rd: &'b mut [u8]) -> Chain<'b> {
  let mut chain = Chain::new(WsNode::new());
  chain.chain(replay);
  chain.set_read_buffers(vec![Buffer::new(rd)]);
  chain
}

#[test]
fn single_byte_chunks_still_yield_one_message_per_read() {
  let payload: Vec<u8> = (0..300u16).map(|v| (v % 251) as u8).collect();
  let wire = frame_bytes(OpCode::Binary, true, None, &payload);
  let mut rd = [0u8; 4096];
  let mut chain = ws_chain(Replay::new(wire, 1), &mut rd);

  let mut flags = FrameFlags::new(OpCode::Continuation, false);
  let mut out_storage = [0u8; 1024];
  let mut out = Buffer::new(&mut out_storage);
  let mut args = NodeArgs::from(vec![Arg::FrameInfo(&mut flags)]);
  chain.read(&mut out, &mut args).unwrap();

  assert!(out.readable() == &payload[..]);
  assert!(flags == FrameFlags::new(OpCode::Binary, true));

  // The stream is exhausted: the next read must fail, not fabricate a
  // second message.
  let mut out2_storage = [0u8; 1024];
  let mut out2 = Buffer::new(&mut out2_storage);
  let err = chain.read(&mut out2, &mut NodeArgs::new()).unwrap_err();
  assert!(err.node == "replay");
}

#[test]
fn irregular_chunks_deliver_consecutive_frames_intact() {
  let first: Vec<u8> = (0..200u8).collect();
  let mut wire = frame_bytes(OpCode::Text, true, None, &first);
  wire.extend(frame_bytes(OpCode::Pong, true, None, b""));
  wire.extend(frame_bytes(OpCode::Binary, false, None, b"tail"));
  let mut rd = [0u8; 4096];
  let mut chain = ws_chain(Replay::new(wire, 7), &mut rd);

  let expected = vec![
    (FrameFlags::new(OpCode::Text, true), first),
    (FrameFlags::new(OpCode::Pong, true), Vec::new()),
    (FrameFlags::new(OpCode::Binary, false), b"tail".to_vec()),
  ];
  for (want_flags, want_payload) in expected {
    let mut flags = FrameFlags::default();
    let mut out_storage = [0u8; 1024];
    let mut out = Buffer::new(&mut out_storage);
    let mut args = NodeArgs::from(vec![Arg::FrameInfo(&mut flags)]);
    chain.read(&mut out, &mut args).unwrap();
    assert!(out.readable() == &want_payload[..]);
    assert!(flags == want_flags);
  }
}

#[test]
fn masked_inbound_frames_are_unmasked_on_delivery() {
  let payload = b"masked from the far side".to_vec();
  let wire = frame_bytes(OpCode::Binary, true, Some(*b"wxyz"), &payload);
  let mut rd = [0u8; 4096];
  let mut chain = ws_chain(Replay::new(wire, 3), &mut rd);

  let mut out_storage = [0u8; 256];
  let mut out = Buffer::new(&mut out_storage);
  chain.read(&mut out, &mut NodeArgs::new()).unwrap();
  assert!(out.readable() == &payload[..]);
}

#[test]
fn malformed_frame_fails_with_invalid_opcode() {
  // Opcode 15 with FIN: 0x8f 0x00.
  let mut rd = [0u8; 64];
  let mut chain = ws_chain(Replay::new(vec![0x8f, 0x00], 2), &mut rd);

  let mut out_storage = [0u8; 64];
  let mut out = Buffer::new(&mut out_storage);
  let err = chain.read(&mut out, &mut NodeArgs::new()).unwrap_err();
  assert!(err.code == WsNode::INVALID_OPCODE);
  assert!(err.node == "websocket");
  assert!(wirestack::last_error() == Some(err));
}

#[test]
fn oversized_frame_reports_insufficient_read_buffer() {
  let wire = frame_bytes(OpCode::Binary, true, None, &[0x42; 100]);
  let mut rd = [0u8; 4096];
  let mut chain = ws_chain(Replay::new(wire, 102), &mut rd);

  let mut out_storage = [0u8; 32];
  let mut out = Buffer::new(&mut out_storage);
  let err = chain.read(&mut out, &mut NodeArgs::new()).unwrap_err();
  assert!(err.code == WsNode::INSUFF_READ_BUFFER);
}

/// Bottom layer capturing everything written to it.
struct Capture {
  bytes: std::rc::Rc<std::cell::RefCell<Vec<u8>>>,
}

impl Node for Capture {
  fn name(&self) -> &'static str {
    "capture"
  }

  fn on_init(
    &mut self,
    _uri: &Uri,
    _io: &mut ChainIo<'_, '_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<(), NodeError> {
    Ok(())
  }

  fn on_write(
    &mut self,
    input: &mut Buffer<'_>,
    _output: &mut Buffer<'_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    self.bytes.borrow_mut().extend_from_slice(input.readable());
    input.clear();
    Ok(IoStatus::Done)
  }

  fn on_read(
    &mut self,
    _out: &mut Buffer<'_>,
    _input: &mut Buffer<'_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    Err(NodeError::new("capture", -10001, "nothing to read"))
  }

  fn on_close(&mut self) {}
}

#[test]
fn write_path_frames_and_masks_through_the_chain() {
  let captured = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
  let mut ws = WsNode::new();
  ws.set_masking_key(*b"abcd");
  let mut chain = Chain::new(ws);
  chain.chain(Capture {
    bytes: std::rc::Rc::clone(&captured),
  });
  // 7-byte staging buffer: the header barely fits and the payload goes
  // out in chunks whose sizes are not multiples of the key length.
  let mut ws_wr = [0u8; 7];
  chain.set_write_buffers(vec![Buffer::new(&mut ws_wr)]);

  let payload: Vec<u8> = (0..50u8).collect();
  chain
    .send_frame(&payload, FrameFlags::new(OpCode::Binary, true))
    .unwrap();
  drop(chain);

  let expected = frame_bytes(OpCode::Binary, true, Some(*b"abcd"), &payload);
  assert!(*captured.borrow() == expected);
}

#[test]
fn ping_and_pong_helpers_emit_control_frames() {
  let captured = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
  let mut chain = Chain::new(WsNode::new());
  chain.chain(Capture {
    bytes: std::rc::Rc::clone(&captured),
  });
  let mut ws_wr = [0u8; 64];
  chain.set_write_buffers(vec![Buffer::new(&mut ws_wr)]);

  chain.ping(b"").unwrap();
  chain.pong(b"keepalive").unwrap();
  drop(chain);

  let mut expected = frame_bytes(OpCode::Ping, true, None, b"");
  expected.extend(frame_bytes(OpCode::Pong, true, None, b"keepalive"));
  assert!(*captured.borrow() == expected);
}
