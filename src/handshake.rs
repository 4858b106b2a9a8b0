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

//! Client side of the HTTP/1.1 WebSocket Upgrade.

use base64::prelude::{Engine as _, BASE64_STANDARD};
use sha1::{Digest, Sha1};

use crate::uri::Uri;

const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const MAX_HEADERS: usize = 32;

/// A fresh `Sec-WebSocket-Key`: 16 random bytes, base64-encoded.
pub fn generate_key() -> String {
  let nonce: [u8; 16] = rand::random();
  BASE64_STANDARD.encode(nonce)
}

/// The `Sec-WebSocket-Accept` value a conforming server must answer for
/// `key`.
pub fn derive_accept_key(key: &str) -> String {
  let mut sha1 = Sha1::new();
  sha1.update(key.as_bytes());
  sha1.update(WS_GUID.as_bytes());
  BASE64_STANDARD.encode(sha1.finalize())
}

/// The literal Upgrade request for `uri`.
pub(crate) fn build_request(uri: &Uri, key: &str) -> String {
  format!(
    "GET {} HTTP/1.1\r\n\
     Host: {}:{}\r\n\
     Upgrade: websocket\r\n\
     Connection: Upgrade\r\n\
     Sec-WebSocket-Key: {}\r\n\
     Sec-WebSocket-Version: 13\r\n\
     \r\n",
    uri.path, uri.host, uri.port, key
  )
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HandshakeError {
  #[error("malformed http response: {0}")]
  Parse(#[from] httparse::Error),
  #[error("unexpected http status {0:?}")]
  BadStatus(Option<u16>),
  #[error("missing {0} header")]
  MissingHeader(&'static str),
  #[error("unexpected {0} header value")]
  HeaderMismatch(&'static str),
  #[error("Sec-WebSocket-Accept does not match the request key")]
  BadAccept,
}

/// Validates the server's Upgrade response.
///
/// `Ok(None)` means the response is still incomplete; read more bytes and
/// call again with the grown prefix. `Ok(Some(n))` means the response
/// header occupied the first `n` bytes and passed every check: status
/// 101, case-insensitive `Upgrade: websocket` and `Connection: upgrade`,
/// and a `Sec-WebSocket-Accept` matching `expected_accept`.
pub(crate) fn check_response(
  data: &[u8],
  expected_accept: &str,
) -> Result<Option<usize>, HandshakeError> {
  let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
  let mut response = httparse::Response::new(&mut headers);
  let consumed = match response.parse(data)? {
    httparse::Status::Partial => return Ok(None),
    httparse::Status::Complete(n) => n,
  };
  if response.code != Some(101) {
    return Err(HandshakeError::BadStatus(response.code));
  }
  expect_header(response.headers, "Upgrade", b"websocket")?;
  expect_header(response.headers, "Connection", b"upgrade")?;
  let accept = find_header(response.headers, "Sec-WebSocket-Accept")
    .ok_or(HandshakeError::MissingHeader("Sec-WebSocket-Accept"))?;
  if accept != expected_accept.as_bytes() {
    return Err(HandshakeError::BadAccept);
  }
  Ok(Some(consumed))
}

fn find_header<'h>(
  headers: &[httparse::Header<'h>],
  name: &str,
) -> Option<&'h [u8]> {
  headers
    .iter()
    .find(|h| h.name.eq_ignore_ascii_case(name))
    .map(|h| h.value)
}

fn expect_header(
  headers: &[httparse::Header<'_>],
  name: &'static str,
  value: &[u8],
) -> Result<(), HandshakeError> {
  let found =
    find_header(headers, name).ok_or(HandshakeError::MissingHeader(name))?;
  if !found.eq_ignore_ascii_case(value) {
    return Err(HandshakeError::HeaderMismatch(name));
  }
  Ok(())
}
