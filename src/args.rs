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

use crate::frame::FrameFlags;
use crate::sock::SocketConfig;
#[cfg(feature = "tls")]
use crate::tls::TlsConfig;

/// One layer's side-channel argument for a single `init`/`read`/`write`
/// call.
///
/// A layer ignores variants it has no use for, so a mismatched slot is
/// harmless (the call just runs without the optional behavior).
pub enum Arg<'a> {
  None,
  /// Receive/send timeout in milliseconds; 0 means block forever.
  /// Interpreted by the socket layer.
  Timeout(u32),
  /// Opcode and FIN bit for the outbound frame. Interpreted by the
  /// websocket layer on the write path.
  Flags(FrameFlags),
  /// Out-slot receiving the opcode and FIN bit of the delivered frame.
  /// Interpreted by the websocket layer on the read path.
  FrameInfo(&'a mut FrameFlags),
  /// Socket layer `init` configuration.
  Socket(&'a SocketConfig),
  /// TLS layer `init` configuration.
  #[cfg(feature = "tls")]
  Tls(&'a TlsConfig),
}

/// Positional per-layer arguments for one call down the chain.
///
/// Index 0 belongs to the top layer, index 1 to the layer below it, and so
/// on. Layers without a slot see [`Arg::None`] semantics.
///
/// # Example
///
/// ```
/// use wirestack::{Arg, FrameFlags, NodeArgs};
///
/// let mut flags = FrameFlags::default();
/// let mut args = NodeArgs::new();
/// args.push(Arg::FrameInfo(&mut flags)); // websocket (top)
/// args.push(Arg::Timeout(500)); // socket
/// ```
#[derive(Default)]
pub struct NodeArgs<'a> {
  items: Vec<Arg<'a>>,
}

impl<'a> NodeArgs<'a> {
  pub fn new() -> Self {
    Self { items: Vec::new() }
  }

  /// Appends the next layer's argument.
  pub fn push(&mut self, arg: Arg<'a>) {
    self.items.push(arg);
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub(crate) fn slots_mut(&mut self) -> &mut [Arg<'a>] {
    &mut self.items
  }
}

impl<'a> From<Vec<Arg<'a>>> for NodeArgs<'a> {
  fn from(items: Vec<Arg<'a>>) -> Self {
    Self { items }
  }
}
