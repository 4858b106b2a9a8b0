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

use crate::args::{Arg, NodeArgs};
use crate::buffer::Buffer;
use crate::error::{self, NodeError};
use crate::frame::{FrameFlags, OpCode};
use crate::uri::Uri;

/// Outcome of one `on_read`/`on_write` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoStatus {
  /// The layer finished its unit of work: one complete message assembled
  /// (read) or the input fully framed and staged (write).
  Done,
  /// The layer needs another round: more input from below (read), or the
  /// staged bytes shipped downstream so it can emit more (write).
  Again,
}

/// One protocol layer in a chain.
///
/// A layer never talks to the network directly (except the bottom one);
/// it transforms bytes between the buffer the caller or the layer above
/// hands it and the inter-layer buffer the chain assigned to it. The
/// chain drives the `on_*` hooks:
///
/// - `on_write(input, output, arg)`: consume from `input`, stage into
///   `output`. `Again` asks the chain to ship `output` downstream and
///   re-enter; `Done` means `input` is fully handled.
/// - `on_read(out, input, arg)`: `input` holds bytes the lower layer
///   produced; deposit exactly one complete unit into `out` (`Done`) or
///   report `Again` to have `input` refilled.
/// - `on_init(uri, io, arg)`: establish layer state. The lower layers are
///   already initialized; `io` exchanges handshake bytes with them.
/// - `on_close()`: release layer resources. Must be idempotent.
///
/// Failures return a [`NodeError`] which the failing layer has already
/// recorded in thread-local storage; the chain propagates it untouched.
pub trait Node {
  fn name(&self) -> &'static str;

  fn on_init(
    &mut self,
    uri: &Uri,
    io: &mut ChainIo<'_, '_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<(), NodeError>;

  fn on_write(
    &mut self,
    input: &mut Buffer<'_>,
    output: &mut Buffer<'_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError>;

  fn on_read(
    &mut self,
    out: &mut Buffer<'_>,
    input: &mut Buffer<'_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError>;

  fn on_close(&mut self);
}

struct Slot<'buf> {
  node: Box<dyn Node>,
  read_buf: Buffer<'buf>,
  write_buf: Buffer<'buf>,
}

/// A stack of layers plus the buffers wired between them.
///
/// Layers are pushed top-down: the first is the one the application talks
/// to, the last touches the network. Buffers stay caller-owned; the chain
/// holds views for as long as `'buf`.
///
/// # Example
///
/// ```no_run
/// use wirestack::{Buffer, Chain, NodeArgs, SocketNode, Uri, WsNode};
///
/// # fn main() -> Result<(), wirestack::NodeError> {
/// // Buffers outlive the chain that borrows them.
/// let mut rd = [0u8; 4096];
/// let mut wr = [0u8; 4096];
///
/// let mut ws = WsNode::new();
/// ws.set_masking_key(*b"abcd");
/// let mut chain = Chain::new(ws);
/// chain.chain(SocketNode::new());
/// chain.set_read_buffers(vec![Buffer::new(&mut rd)]);
/// chain.set_write_buffers(vec![Buffer::new(&mut wr)]);
///
/// let uri = Uri::parse("ws://localhost:3000/").unwrap();
/// chain.init(&uri, &mut NodeArgs::new())?;
/// chain.send_frame(b"hello", Default::default())?;
///
/// let mut out_storage = [0u8; 4096];
/// let mut out = Buffer::new(&mut out_storage);
/// chain.read(&mut out, &mut NodeArgs::new())?;
/// assert_eq!(out.readable(), b"hello");
/// # Ok(())
/// # }
/// ```
pub struct Chain<'buf> {
  slots: Vec<Slot<'buf>>,
}

impl<'buf> Chain<'buf> {
  /// Starts a chain with its top layer.
  pub fn new(top: impl Node + 'static) -> Self {
    Self {
      slots: vec![Slot {
        node: Box::new(top),
        read_buf: Buffer::default(),
        write_buf: Buffer::default(),
      }],
    }
  }

  /// Attaches the next lower layer beneath the current bottom.
  pub fn chain(&mut self, lower: impl Node + 'static) -> &mut Self {
    self.slots.push(Slot {
      node: Box::new(lower),
      read_buf: Buffer::default(),
      write_buf: Buffer::default(),
    });
    self
  }

  /// Assigns one read buffer per layer, top-down. A layer's read buffer
  /// is the inter-layer buffer the layer below fills for it; the bottom
  /// layer needs none. Missing entries become empty views.
  pub fn set_read_buffers(&mut self, bufs: Vec<Buffer<'buf>>) {
    let mut bufs = bufs.into_iter();
    for slot in &mut self.slots {
      slot.read_buf = bufs.next().unwrap_or_default();
    }
  }

  /// Assigns one write buffer per layer, top-down; the mirror of
  /// [`Chain::set_read_buffers`].
  pub fn set_write_buffers(&mut self, bufs: Vec<Buffer<'buf>>) {
    let mut bufs = bufs.into_iter();
    for slot in &mut self.slots {
      slot.write_buf = bufs.next().unwrap_or_default();
    }
  }

  /// Initializes the chain bottom-up: transports connect before the
  /// layers above them handshake. Clears the thread-local error record on
  /// success.
  pub fn init(
    &mut self,
    uri: &Uri,
    args: &mut NodeArgs<'_>,
  ) -> Result<(), NodeError> {
    chain_init(&mut self.slots, uri, args.slots_mut())?;
    error::clear();
    Ok(())
  }

  /// Pushes one application unit down the chain until every layer has
  /// fully emitted it.
  pub fn write(
    &mut self,
    input: &mut Buffer<'_>,
    args: &mut NodeArgs<'_>,
  ) -> Result<(), NodeError> {
    chain_write(&mut self.slots, input, args.slots_mut())
  }

  /// Pulls from the chain until the top layer deposits exactly one
  /// complete application unit into `out`, refilling inter-layer buffers
  /// from below as many times as that takes.
  pub fn read(
    &mut self,
    out: &mut Buffer<'_>,
    args: &mut NodeArgs<'_>,
  ) -> Result<(), NodeError> {
    chain_read(&mut self.slots, out, args.slots_mut())
  }

  /// Tears the chain down top-down. Idempotent; also runs on drop.
  pub fn close(&mut self) {
    for slot in &mut self.slots {
      slot.node.on_close();
    }
  }

  /// Sends one frame through the chain; the top layer is expected to
  /// understand [`Arg::Flags`] (i.e. be a [`crate::WsNode`]).
  pub fn send_frame(
    &mut self,
    payload: &[u8],
    flags: FrameFlags,
  ) -> Result<(), NodeError> {
    let mut staged = payload.to_vec();
    let mut input = Buffer::filled(&mut staged);
    let mut args = NodeArgs::new();
    args.push(Arg::Flags(flags));
    self.write(&mut input, &mut args)
  }

  /// Sends a Ping control frame (payload may be empty).
  pub fn ping(&mut self, payload: &[u8]) -> Result<(), NodeError> {
    self.send_frame(payload, FrameFlags::new(OpCode::Ping, true))
  }

  /// Sends a Pong control frame (payload may be empty).
  pub fn pong(&mut self, payload: &[u8]) -> Result<(), NodeError> {
    self.send_frame(payload, FrameFlags::new(OpCode::Pong, true))
  }
}

impl Drop for Chain<'_> {
  fn drop(&mut self) {
    self.close();
  }
}

/// Lower-chain access handed to `on_init`, so a layer can run its
/// handshake through the already-initialized layers below. The handle
/// also lends out the layer's own inter-layer buffers as scratch space.
pub struct ChainIo<'s, 'buf> {
  lower: &'s mut [Slot<'buf>],
  read_buf: &'s mut Buffer<'buf>,
  write_buf: &'s mut Buffer<'buf>,
}

impl<'buf> ChainIo<'_, 'buf> {
  /// Whether any layer is chained below. A standalone layer skips its
  /// handshake.
  pub fn has_lower(&self) -> bool {
    !self.lower.is_empty()
  }

  /// This layer's read buffer; the lower chain refills it via
  /// [`ChainIo::fill_read_buf`].
  pub fn read_buf(&mut self) -> &mut Buffer<'buf> {
    self.read_buf
  }

  /// This layer's write buffer; stage handshake bytes here, then ship
  /// them with [`ChainIo::flush_write_buf`].
  pub fn write_buf(&mut self) -> &mut Buffer<'buf> {
    self.write_buf
  }

  /// Writes the staged write buffer through the lower chain.
  pub fn flush_write_buf(&mut self) -> Result<(), NodeError> {
    chain_write(self.lower, self.write_buf, &mut [])
  }

  /// Performs one lower-chain read, appending to the read buffer.
  pub fn fill_read_buf(&mut self) -> Result<(), NodeError> {
    chain_read(self.lower, self.read_buf, &mut [])
  }
}

fn split_args<'s, 'a>(
  args: &'s mut [Arg<'a>],
) -> (Option<&'s mut Arg<'a>>, &'s mut [Arg<'a>]) {
  match args.split_first_mut() {
    Some((arg, rest)) => (Some(arg), rest),
    None => (None, Default::default()),
  }
}

fn chain_init(
  slots: &mut [Slot<'_>],
  uri: &Uri,
  args: &mut [Arg<'_>],
) -> Result<(), NodeError> {
  let Some((head, lower)) = slots.split_first_mut() else {
    return Ok(());
  };
  let (arg, rest) = split_args(args);
  if !lower.is_empty() {
    chain_init(lower, uri, rest)?;
  }
  tracing::debug!(node = head.node.name(), "init");
  let mut io = ChainIo {
    lower,
    read_buf: &mut head.read_buf,
    write_buf: &mut head.write_buf,
  };
  head.node.on_init(uri, &mut io, arg)
}

fn chain_write(
  slots: &mut [Slot<'_>],
  input: &mut Buffer<'_>,
  args: &mut [Arg<'_>],
) -> Result<(), NodeError> {
  let Some((head, lower)) = slots.split_first_mut() else {
    return Ok(());
  };
  let (mut arg, rest) = split_args(args);
  loop {
    let status =
      head
        .node
        .on_write(input, &mut head.write_buf, arg.as_deref_mut())?;
    // Ship whatever the layer staged after every round, so a layer may
    // emit a unit in several pieces (header, then payload chunks).
    if !lower.is_empty() {
      chain_write(lower, &mut head.write_buf, rest)?;
    }
    if status == IoStatus::Done {
      return Ok(());
    }
  }
}

fn chain_read(
  slots: &mut [Slot<'_>],
  out: &mut Buffer<'_>,
  args: &mut [Arg<'_>],
) -> Result<(), NodeError> {
  let Some((head, lower)) = slots.split_first_mut() else {
    return Ok(());
  };
  let (mut arg, rest) = split_args(args);
  loop {
    match head
      .node
      .on_read(out, &mut head.read_buf, arg.as_deref_mut())?
    {
      IoStatus::Done => return Ok(()),
      IoStatus::Again => {
        if lower.is_empty() {
          return Err(error::record(NodeError::new(
            head.node.name(),
            0,
            "need more input but no lower layer is chained",
          )));
        }
        chain_read(lower, &mut head.read_buf, rest)?;
      }
    }
  }
}
