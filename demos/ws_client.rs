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

//! WebSocket echo round-trip: connect, send `hello`, read the echo, then
//! trade a ping for a pong.

use anyhow::Result;
use wirestack::{
  Arg, Buffer, Chain, FrameFlags, NodeArgs, OpCode, SocketNode, Uri, WsNode,
};

const SERVER_URI: &str = "ws://localhost:3000/";

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let uri = Uri::parse(SERVER_URI)?;
  let mut rd = [0u8; 4096];
  let mut wr = [0u8; 4096];

  let mut ws = WsNode::new();
  ws.set_masking_key(*b"abcd");
  let mut chain = Chain::new(ws);
  chain.chain(SocketNode::new());
  chain.set_read_buffers(vec![Buffer::new(&mut rd)]);
  chain.set_write_buffers(vec![Buffer::new(&mut wr)]);

  chain.init(&uri, &mut NodeArgs::new())?;
  chain.send_frame(b"hello", FrameFlags::new(OpCode::Binary, true))?;

  let mut flags = FrameFlags::default();
  let mut storage = [0u8; 4096];
  let mut out = Buffer::new(&mut storage);
  let mut args = NodeArgs::from(vec![Arg::FrameInfo(&mut flags)]);
  chain.read(&mut out, &mut args)?;
  println!(
    "echo: {:?} ({:?})",
    String::from_utf8_lossy(out.readable()),
    flags
  );

  chain.ping(b"")?;
  let mut flags = FrameFlags::default();
  out.clear();
  let mut args = NodeArgs::from(vec![Arg::FrameInfo(&mut flags)]);
  chain.read(&mut out, &mut args)?;
  println!("pong: {} bytes ({:?})", out.len(), flags);

  chain.close();
  Ok(())
}
