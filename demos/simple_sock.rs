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

//! Single-layer chain: raw TCP echo against `tcp://localhost:30001/`.

use anyhow::Result;
use wirestack::{Buffer, Chain, NodeArgs, SocketNode, Uri};

const SERVER_URI: &str = "tcp://localhost:30001/";

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let uri = Uri::parse(SERVER_URI)?;
  let mut chain = Chain::new(SocketNode::new());
  chain.init(&uri, &mut NodeArgs::new())?;

  let mut payload = *b"hello";
  let mut input = Buffer::filled(&mut payload);
  chain.write(&mut input, &mut NodeArgs::new())?;

  let mut storage = [0u8; 32];
  let mut out = Buffer::new(&mut storage);
  chain.read(&mut out, &mut NodeArgs::new())?;
  println!("read {} bytes: {:?}", out.len(), out.readable());

  chain.close();
  Ok(())
}
