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

//! _wirestack_ is a composable, blocking client network stack.
//!
//! Protocol layers ([`WsNode`], [`TlsNode`], [`SocketNode`]) stack on top
//! of one another in a [`Chain`]; a single `read` or `write` at the top
//! drives as many lower-layer I/O rounds as the wire demands (TLS records
//! split across TCP reads, WebSocket frames trickling in byte by byte)
//! while every buffer stays caller-owned and fixed-size.
//!
//! # Example
//!
//! ```no_run
//! use wirestack::{Arg, Buffer, Chain, FrameFlags, NodeArgs, SocketNode, Uri, WsNode};
//!
//! fn main() -> Result<(), wirestack::NodeError> {
//!   // Buffers outlive the chain that borrows them.
//!   let mut rd = [0u8; 4096];
//!   let mut wr = [0u8; 4096];
//!
//!   let mut ws = WsNode::new();
//!   ws.set_masking_key(*b"abcd");
//!   let mut chain = Chain::new(ws);
//!   chain.chain(SocketNode::new());
//!   chain.set_read_buffers(vec![Buffer::new(&mut rd)]);
//!   chain.set_write_buffers(vec![Buffer::new(&mut wr)]);
//!
//!   let uri = Uri::parse("ws://localhost:3000/").unwrap();
//!   chain.init(&uri, &mut NodeArgs::new())?;
//!
//!   chain.send_frame(b"hello", FrameFlags::default())?;
//!
//!   let mut flags = FrameFlags::default();
//!   let mut out_storage = [0u8; 4096];
//!   let mut out = Buffer::new(&mut out_storage);
//!   let mut args = NodeArgs::new();
//!   args.push(Arg::FrameInfo(&mut flags));
//!   chain.read(&mut out, &mut args)?;
//!   println!("got {} bytes, {:?}", out.len(), flags);
//!
//!   chain.close();
//!   Ok(())
//! }
//! ```
//!
//! For `wss://` endpoints insert a [`TlsNode`] between the two:
//!
//! ```no_run
//! # use wirestack::{Chain, SocketNode, TlsNode, WsNode};
//! let mut chain = Chain::new(WsNode::new());
//! chain.chain(TlsNode::new());
//! chain.chain(SocketNode::new());
//! ```
//!
//! A chain is driven by one thread at a time; independent chains are
//! fully parallel. Timeouts are cooperative: pass [`Arg::Timeout`] in the
//! socket layer's slot and a timed-out `read` fails with a recoverable
//! error, leaving the chain usable.

mod args;
mod buffer;
mod error;
/// RFC 6455 frame header codec.
pub mod frame;
/// Client handshake.
pub mod handshake;
/// Payload masking.
pub mod mask;
mod node;
mod sock;
#[cfg(feature = "tls")]
mod tls;
mod uri;
mod ws;

pub use crate::args::Arg;
pub use crate::args::NodeArgs;
pub use crate::buffer::Buffer;
pub use crate::error::last_error;
pub use crate::error::NodeError;
pub use crate::frame::FrameFlags;
pub use crate::frame::OpCode;
pub use crate::node::Chain;
pub use crate::node::ChainIo;
pub use crate::node::IoStatus;
pub use crate::node::Node;
pub use crate::sock::SocketConfig;
pub use crate::sock::SocketNode;
#[cfg(feature = "tls")]
pub use crate::tls::TlsConfig;
#[cfg(feature = "tls")]
pub use crate::tls::TlsNode;
pub use crate::uri::Uri;
pub use crate::uri::UriError;
pub use crate::ws::WsNode;
