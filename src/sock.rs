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

use std::io::{ErrorKind, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::args::Arg;
use crate::buffer::Buffer;
use crate::error::{record, NodeError};
use crate::node::{ChainIo, IoStatus, Node};
use crate::uri::Uri;

const NAME: &str = "socket";

/// `init` configuration for [`SocketNode`], passed via [`Arg::Socket`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketConfig {
  /// Bound on the blocking connect; `None` lets the OS decide.
  pub connect_timeout: Option<Duration>,
}

/// The bottom transport layer: a blocking IPv4 TCP connection.
///
/// Per-call [`Arg::Timeout`] values (milliseconds, 0 = block forever) are
/// installed as the socket receive/send timeout before the corresponding
/// system call. SIGPIPE needs no handling here: the Rust runtime ignores
/// it process-wide.
pub struct SocketNode {
  stream: Option<TcpStream>,
}

impl SocketNode {
  pub const NOT_READY: i32 = -10000;
  pub const REMOTE_CLOSED: i32 = -10001;
  pub const INSUFF_BUFFER: i32 = -10002;
  pub const READ_TIMEOUT: i32 = -10003;

  pub fn new() -> Self {
    Self { stream: None }
  }

  fn node_error(code: i32) -> NodeError {
    let message = match code {
      Self::NOT_READY => "socket not ready",
      Self::REMOTE_CLOSED => "remote socket closed",
      Self::INSUFF_BUFFER => "insufficient buffer capacity",
      Self::READ_TIMEOUT => "socket read timeout",
      _ => "socket error",
    };
    record(NodeError::new(NAME, code, message))
  }

  fn io_error(err: &std::io::Error) -> NodeError {
    record(NodeError::from_io(NAME, err))
  }

  fn timeout(ms: u32) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(u64::from(ms)))
  }
}

impl Default for SocketNode {
  fn default() -> Self {
    Self::new()
  }
}

impl Node for SocketNode {
  fn name(&self) -> &'static str {
    NAME
  }

  fn on_init(
    &mut self,
    uri: &Uri,
    _io: &mut ChainIo<'_, '_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<(), NodeError> {
    let config = match arg.as_deref() {
      Some(Arg::Socket(config)) => **config,
      _ => SocketConfig::default(),
    };
    let addr = (uri.host.as_str(), uri.port)
      .to_socket_addrs()
      .map_err(|e| Self::io_error(&e))?
      .find(|addr| addr.is_ipv4())
      .ok_or_else(|| {
        Self::io_error(&std::io::Error::new(
          ErrorKind::NotFound,
          format!("no IPv4 address for {}", uri.host),
        ))
      })?;
    let stream = match config.connect_timeout {
      Some(bound) => TcpStream::connect_timeout(&addr, bound),
      None => TcpStream::connect(addr),
    }
    .map_err(|e| Self::io_error(&e))?;
    tracing::debug!(%addr, "socket connected");
    self.stream = Some(stream);
    Ok(())
  }

  fn on_write(
    &mut self,
    input: &mut Buffer<'_>,
    _output: &mut Buffer<'_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    let Some(stream) = self.stream.as_mut() else {
      return Err(Self::node_error(Self::NOT_READY));
    };
    if input.is_empty() {
      return Ok(IoStatus::Done);
    }
    if let Some(Arg::Timeout(ms)) = arg.as_deref() {
      stream
        .set_write_timeout(Self::timeout(*ms))
        .map_err(|e| Self::io_error(&e))?;
    }
    // Drain the whole readable region; short writes stay inside this
    // layer.
    stream.write_all(input.readable()).map_err(|e| {
      if e.kind() == ErrorKind::WriteZero {
        Self::node_error(Self::REMOTE_CLOSED)
      } else {
        Self::io_error(&e)
      }
    })?;
    tracing::trace!(bytes = input.len(), "socket write");
    input.clear();
    Ok(IoStatus::Done)
  }

  fn on_read(
    &mut self,
    out: &mut Buffer<'_>,
    _input: &mut Buffer<'_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    let Some(stream) = self.stream.as_mut() else {
      return Err(Self::node_error(Self::NOT_READY));
    };
    if out.remaining_space() == 0 {
      return Err(Self::node_error(Self::INSUFF_BUFFER));
    }
    if let Some(Arg::Timeout(ms)) = arg.as_deref() {
      stream
        .set_read_timeout(Self::timeout(*ms))
        .map_err(|e| Self::io_error(&e))?;
    }
    match stream.read(out.writable()) {
      Ok(0) => Err(Self::node_error(Self::REMOTE_CLOSED)),
      Ok(n) => {
        out.obtain(n);
        tracing::trace!(bytes = n, "socket read");
        Ok(IoStatus::Done)
      }
      Err(e)
        if e.kind() == ErrorKind::WouldBlock
          || e.kind() == ErrorKind::TimedOut =>
      {
        Err(Self::node_error(Self::READ_TIMEOUT))
      }
      Err(e) => Err(Self::io_error(&e)),
    }
  }

  fn on_close(&mut self) {
    if self.stream.take().is_some() {
      tracing::debug!("socket closed");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::args::NodeArgs;
  use crate::node::Chain;

  #[test]
  fn read_before_init_is_not_ready() {
    let mut chain = Chain::new(SocketNode::new());
    let mut storage = [0u8; 16];
    let mut out = Buffer::new(&mut storage);
    let err = chain.read(&mut out, &mut NodeArgs::new()).unwrap_err();
    assert_eq!(err.code, SocketNode::NOT_READY);
    assert_eq!(err.node, "socket");
  }

  #[test]
  fn read_into_full_buffer_is_rejected() {
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept = std::thread::spawn(move || listener.accept().unwrap());

    let mut chain = Chain::new(SocketNode::new());
    let uri = Uri::parse(&format!("tcp://127.0.0.1:{port}/")).unwrap();
    chain.init(&uri, &mut NodeArgs::new()).unwrap();
    let _peer = accept.join().unwrap();

    let mut out = Buffer::default();
    let err = chain.read(&mut out, &mut NodeArgs::new()).unwrap_err();
    assert_eq!(err.code, SocketNode::INSUFF_BUFFER);
  }
}
