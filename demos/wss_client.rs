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

//! WebSocket over TLS: a three-layer chain talking to a `wss://`
//! endpoint. Pass the endpoint URI (and optionally a CA bundle path) on
//! the command line.

use anyhow::{Context, Result};
use wirestack::{
  Arg, Buffer, Chain, FrameFlags, NodeArgs, OpCode, SocketNode, TlsConfig,
  TlsNode, Uri, WsNode,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let mut argv = std::env::args().skip(1);
  let endpoint = argv
    .next()
    .unwrap_or_else(|| "wss://echo.websocket.org/".to_string());
  let tls_config = TlsConfig {
    ca_pem: match argv.next() {
      Some(path) => Some(
        std::fs::read_to_string(&path)
          .with_context(|| format!("reading CA bundle {path}"))?,
      ),
      None => None,
    },
    ..Default::default()
  };

  let uri = Uri::parse(&endpoint)?;
  let mut ws_rd = [0u8; 4096];
  let mut tls_rd = [0u8; 18 * 1024]; // A TLS record is up to 16 KiB + overhead.
  let mut ws_wr = [0u8; 4096];
  let mut tls_wr = [0u8; 18 * 1024];

  let mut ws = WsNode::new();
  ws.set_masking_key(*b"abcd");
  let mut chain = Chain::new(ws);
  chain.chain(TlsNode::new());
  chain.chain(SocketNode::new());
  chain
    .set_read_buffers(vec![Buffer::new(&mut ws_rd), Buffer::new(&mut tls_rd)]);
  chain
    .set_write_buffers(vec![Buffer::new(&mut ws_wr), Buffer::new(&mut tls_wr)]);

  let mut init_args = NodeArgs::new();
  init_args.push(Arg::None); // websocket
  init_args.push(Arg::Tls(&tls_config)); // tls
  chain.init(&uri, &mut init_args)?;

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

  chain.close();
  Ok(())
}
