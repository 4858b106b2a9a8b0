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

#[derive(Debug, thiserror::Error)]
pub enum UriError {
  #[error(transparent)]
  Parse(#[from] url::ParseError),
  #[error("uri has no host")]
  MissingHost,
  #[error("uri has no port and the scheme has no default")]
  MissingPort,
}

/// The endpoint description the chain consumes.
///
/// Scheme selection is informational: picking the layers (`wss` ⇒ TLS in
/// the chain, `ws` ⇒ plain) is the caller's job at construction time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
  pub scheme: String,
  pub host: String,
  pub port: u16,
  /// Request path including any query string, never empty (`"/"` at
  /// minimum).
  pub path: String,
}

impl Uri {
  /// Parses an endpoint URI such as `ws://host:port/path` or
  /// `wss://host/path?q=1`. Default ports are applied for schemes that
  /// have one (`ws` 80, `wss` 443, `http` 80, `https` 443).
  pub fn parse(input: &str) -> Result<Self, UriError> {
    let url = url::Url::parse(input)?;
    let host = url.host_str().ok_or(UriError::MissingHost)?.to_string();
    let port = url.port_or_known_default().ok_or(UriError::MissingPort)?;
    let path = match url.query() {
      Some(q) => format!("{}?{}", url.path(), q),
      None => url.path().to_string(),
    };
    Ok(Self {
      scheme: url.scheme().to_string(),
      host,
      port,
      path,
    })
  }
}

impl std::str::FromStr for Uri {
  type Err = UriError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Self::parse(s)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_ws_with_default_port() {
    let uri = Uri::parse("ws://example.com/chat").unwrap();
    assert_eq!(uri.scheme, "ws");
    assert_eq!(uri.host, "example.com");
    assert_eq!(uri.port, 80);
    assert_eq!(uri.path, "/chat");
  }

  #[test]
  fn parses_wss_with_explicit_port_and_query() {
    let uri = Uri::parse("wss://example.com:9443/chat?room=1").unwrap();
    assert_eq!(uri.port, 9443);
    assert_eq!(uri.path, "/chat?room=1");
  }

  #[test]
  fn tcp_scheme_requires_explicit_port() {
    assert!(matches!(
      Uri::parse("tcp://example.com/"),
      Err(UriError::MissingPort)
    ));
    let uri = Uri::parse("tcp://example.com:30001/").unwrap();
    assert_eq!(uri.port, 30001);
  }
}
