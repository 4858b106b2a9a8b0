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
use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::ClientConnection;

use crate::args::Arg;
use crate::buffer::Buffer;
use crate::error::{record, NodeError};
use crate::node::{ChainIo, IoStatus, Node};
use crate::uri::Uri;

const NAME: &str = "rustls";

/// `init` configuration for [`TlsNode`], passed via [`Arg::Tls`].
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
  /// PEM bundle of trust anchors. `None` trusts the bundled
  /// webpki-roots.
  pub ca_pem: Option<String>,
  /// Skip certificate verification entirely. For test rigs with
  /// self-signed certificates only.
  pub danger_accept_invalid_certs: bool,
}

/// The TLS layer: a rustls client session running its record I/O through
/// the inter-layer buffers, with the handshake pumped through the lower
/// chain during `on_init`.
///
/// The session verifies the peer against the configured trust anchors and
/// pins the URI host as the expected server name. Per-call read timeouts
/// belong to the socket layer's argument slot; a timed-out record read
/// surfaces as the socket's `READ_TIMEOUT` and leaves the session usable.
pub struct TlsNode {
  conn: Option<ClientConnection>,
}

impl TlsNode {
  pub const SSL_INIT_FAILED: i32 = -10000;
  pub const SSL_HANDSHAKE_FAILED: i32 = -10001;
  pub const SSL_WRITE_FAILED: i32 = -10002;
  pub const SSL_READ_FAILED: i32 = -10003;
  pub const NOT_READY: i32 = -10004;
  pub const INSUFF_READ_BUFFER: i32 = -10005;
  pub const REMOTE_CLOSED: i32 = -10006;
  pub const SSL_READ_TIMEOUT: i32 = -10007;

  pub fn new() -> Self {
    Self { conn: None }
  }

  fn node_error(code: i32) -> NodeError {
    let message = match code {
      Self::SSL_INIT_FAILED => "ssl initialize failed",
      Self::SSL_HANDSHAKE_FAILED => "ssl handshake failed",
      Self::SSL_WRITE_FAILED => "ssl write failed",
      Self::SSL_READ_FAILED => "ssl read failed",
      Self::NOT_READY => "socket not initialized",
      Self::INSUFF_READ_BUFFER => "read buffer size insufficient",
      Self::REMOTE_CLOSED => "remote socket closed",
      Self::SSL_READ_TIMEOUT => "ssl read timeout",
      _ => "ssl error",
    };
    record(NodeError::new(NAME, code, message))
  }

  fn build_client_config(
    config: &TlsConfig,
  ) -> Result<rustls::ClientConfig, NodeError> {
    if config.danger_accept_invalid_certs {
      tracing::debug!("certificate verification disabled");
      return Ok(
        rustls::ClientConfig::builder()
          .dangerous()
          .with_custom_certificate_verifier(Arc::new(danger::NoVerify::new()))
          .with_no_client_auth(),
      );
    }
    let roots = match &config.ca_pem {
      Some(pem) => {
        let certs = rustls_pemfile::certs(&mut pem.as_bytes())
          .collect::<Result<Vec<_>, _>>()
          .map_err(|e| {
            tracing::debug!(error = %e, "ca pem parse failed");
            Self::node_error(Self::SSL_INIT_FAILED)
          })?;
        let mut roots = rustls::RootCertStore::empty();
        let (added, _) = roots.add_parsable_certificates(certs);
        if added == 0 {
          tracing::debug!("ca pem contains no usable certificates");
          return Err(Self::node_error(Self::SSL_INIT_FAILED));
        }
        roots
      }
      None => rustls::RootCertStore::from_iter(
        webpki_roots::TLS_SERVER_ROOTS.iter().cloned(),
      ),
    };
    Ok(
      rustls::ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth(),
    )
  }

  /// Stages pending TLS records into the write buffer and ships them down
  /// the chain until the session has nothing left to send.
  fn flush_pending(
    conn: &mut ClientConnection,
    io: &mut ChainIo<'_, '_>,
  ) -> Result<(), NodeError> {
    while conn.wants_write() {
      {
        let staged = io.write_buf();
        staged.shift();
        loop {
          if !conn.wants_write() {
            break;
          }
          match conn.write_tls(&mut BufSink(staged)) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
              tracing::debug!(error = %e, "tls record write failed");
              return Err(Self::node_error(Self::SSL_HANDSHAKE_FAILED));
            }
          }
        }
        if staged.is_empty() {
          tracing::debug!("tls write buffer cannot hold a record");
          return Err(Self::node_error(Self::SSL_HANDSHAKE_FAILED));
        }
      }
      io.flush_write_buf()?;
    }
    Ok(())
  }

  /// Feeds buffered ciphertext into the session. Returns the bytes
  /// consumed from `input`.
  fn feed(
    conn: &mut ClientConnection,
    input: &mut Buffer<'_>,
  ) -> std::io::Result<usize> {
    let mut src: &[u8] = input.readable();
    let before = src.len();
    conn.read_tls(&mut src)?;
    let used = before - src.len();
    input.consume(used);
    Ok(used)
  }
}

impl Default for TlsNode {
  fn default() -> Self {
    Self::new()
  }
}

impl Node for TlsNode {
  fn name(&self) -> &'static str {
    NAME
  }

  fn on_init(
    &mut self,
    uri: &Uri,
    io: &mut ChainIo<'_, '_>,
    arg: Option<&mut Arg<'_>>,
  ) -> Result<(), NodeError> {
    if !io.has_lower() {
      return Err(Self::node_error(Self::NOT_READY));
    }
    let config = match arg.as_deref() {
      Some(Arg::Tls(config)) => (*config).clone(),
      _ => TlsConfig::default(),
    };
    let client_config = Self::build_client_config(&config)?;
    let server_name =
      ServerName::try_from(uri.host.clone()).map_err(|e| {
        tracing::debug!(error = %e, host = %uri.host, "invalid server name");
        Self::node_error(Self::SSL_INIT_FAILED)
      })?;
    let mut conn =
      ClientConnection::new(Arc::new(client_config), server_name).map_err(
        |e| {
          tracing::debug!(error = %e, "session setup failed");
          Self::node_error(Self::SSL_INIT_FAILED)
        },
      )?;

    while conn.is_handshaking() {
      if conn.wants_write() {
        Self::flush_pending(&mut conn, io)?;
        continue;
      }
      if io.read_buf().is_empty() {
        io.fill_read_buf()?;
      }
      match Self::feed(&mut conn, io.read_buf()) {
        Ok(0) => {
          tracing::debug!("peer closed during handshake");
          return Err(Self::node_error(Self::SSL_HANDSHAKE_FAILED));
        }
        Ok(_) => {}
        Err(e) => {
          tracing::debug!(error = %e, "handshake read failed");
          return Err(Self::node_error(Self::SSL_HANDSHAKE_FAILED));
        }
      }
      conn.process_new_packets().map_err(|e| {
        tracing::debug!(error = %e, "handshake failed");
        Self::node_error(Self::SSL_HANDSHAKE_FAILED)
      })?;
    }
    // Last flight of the handshake may still be queued.
    Self::flush_pending(&mut conn, io)?;
    tracing::debug!("tls handshake complete");
    self.conn = Some(conn);
    Ok(())
  }

  fn on_write(
    &mut self,
    input: &mut Buffer<'_>,
    output: &mut Buffer<'_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    let Some(conn) = self.conn.as_mut() else {
      return Err(Self::node_error(Self::NOT_READY));
    };
    output.shift();
    loop {
      if !input.is_empty() {
        let n = conn.writer().write(input.readable()).map_err(|e| {
          tracing::debug!(error = %e, "plaintext write failed");
          Self::node_error(Self::SSL_WRITE_FAILED)
        })?;
        input.consume(n);
      }
      while conn.wants_write() {
        match conn.write_tls(&mut BufSink(output)) {
          Ok(n) => tracing::trace!(bytes = n, "tls record staged"),
          Err(e) if e.kind() == ErrorKind::WouldBlock => {
            if output.is_empty() {
              tracing::debug!("tls write buffer cannot hold a record");
              return Err(Self::node_error(Self::SSL_WRITE_FAILED));
            }
            // Output full; ship it and come back for the rest.
            return Ok(IoStatus::Again);
          }
          Err(e) => {
            tracing::debug!(error = %e, "tls record write failed");
            return Err(Self::node_error(Self::SSL_WRITE_FAILED));
          }
        }
      }
      if input.is_empty() {
        return Ok(IoStatus::Done);
      }
    }
  }

  fn on_read(
    &mut self,
    out: &mut Buffer<'_>,
    input: &mut Buffer<'_>,
    _arg: Option<&mut Arg<'_>>,
  ) -> Result<IoStatus, NodeError> {
    let Some(conn) = self.conn.as_mut() else {
      return Err(Self::node_error(Self::NOT_READY));
    };
    if out.remaining_space() == 0 {
      return Err(Self::node_error(Self::INSUFF_READ_BUFFER));
    }
    loop {
      match conn.reader().read(out.writable()) {
        Ok(0) => return Err(Self::node_error(Self::REMOTE_CLOSED)),
        Ok(n) => {
          out.obtain(n);
          tracing::trace!(bytes = n, "tls read");
          return Ok(IoStatus::Done);
        }
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
          // No plaintext buffered; feed ciphertext below.
        }
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
          return Err(Self::node_error(Self::REMOTE_CLOSED));
        }
        Err(e) => {
          tracing::debug!(error = %e, "plaintext read failed");
          return Err(Self::node_error(Self::SSL_READ_FAILED));
        }
      }
      if input.is_empty() {
        return Ok(IoStatus::Again);
      }
      if let Err(e) = Self::feed(conn, input) {
        tracing::debug!(error = %e, "tls record read failed");
        return Err(Self::node_error(Self::SSL_READ_FAILED));
      }
      conn.process_new_packets().map_err(|e| {
        tracing::debug!(error = %e, "tls record processing failed");
        Self::node_error(Self::SSL_READ_FAILED)
      })?;
    }
  }

  fn on_close(&mut self) {
    if self.conn.take().is_some() {
      tracing::debug!("tls session closed");
    }
  }
}

/// `io::Write` adapter staging record bytes into a [`Buffer`]; reports
/// `WouldBlock` when the buffer is full so callers can ship and retry.
struct BufSink<'a, 'b>(&'a mut Buffer<'b>);

impl Write for BufSink<'_, '_> {
  fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
    let n = usize::min(data.len(), self.0.remaining_space());
    if n == 0 {
      return Err(ErrorKind::WouldBlock.into());
    }
    self.0.append(&data[..n]);
    Ok(n)
  }

  fn flush(&mut self) -> std::io::Result<()> {
    Ok(())
  }
}

mod danger {
  use rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
  };
  use rustls::crypto::{
    verify_tls12_signature, verify_tls13_signature, WebPkiSupportedAlgorithms,
  };
  use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
  use rustls::DigitallySignedStruct;

  /// Accepts any server certificate. Signatures are still checked so a
  /// garbled handshake fails rather than "succeeds".
  #[derive(Debug)]
  pub(super) struct NoVerify(WebPkiSupportedAlgorithms);

  impl NoVerify {
    pub(super) fn new() -> Self {
      Self(
        rustls::crypto::ring::default_provider()
          .signature_verification_algorithms,
      )
    }
  }

  impl ServerCertVerifier for NoVerify {
    fn verify_server_cert(
      &self,
      _end_entity: &CertificateDer<'_>,
      _intermediates: &[CertificateDer<'_>],
      _server_name: &ServerName<'_>,
      _ocsp_response: &[u8],
      _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
      Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
      &self,
      message: &[u8],
      cert: &CertificateDer<'_>,
      dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
      verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
      &self,
      message: &[u8],
      cert: &CertificateDer<'_>,
      dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
      verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
      self.0.supported_schemes()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::args::NodeArgs;
  use crate::node::Chain;

  #[test]
  fn io_before_init_is_not_ready() {
    let mut node = TlsNode::new();
    let mut storage = [0u8; 16];
    let mut out = Buffer::new(&mut storage);
    let mut input = Buffer::default();
    let err = node.on_read(&mut out, &mut input, None).unwrap_err();
    assert_eq!(err.code, TlsNode::NOT_READY);
    assert_eq!(err.node, "rustls");
  }

  #[test]
  fn init_without_a_transport_below_fails() {
    let mut chain = Chain::new(TlsNode::new());
    let uri = Uri::parse("wss://localhost:443/").unwrap();
    let err = chain.init(&uri, &mut NodeArgs::new()).unwrap_err();
    assert_eq!(err.code, TlsNode::NOT_READY);
  }

  #[test]
  fn garbage_ca_pem_fails_init() {
    let config = TlsConfig {
      ca_pem: Some("not a certificate".into()),
      ..Default::default()
    };
    let err = TlsNode::build_client_config(&config).unwrap_err();
    assert_eq!(err.code, TlsNode::SSL_INIT_FAILED);
  }

  #[test]
  fn default_and_danger_configs_build() {
    assert!(TlsNode::build_client_config(&TlsConfig::default()).is_ok());
    let danger = TlsConfig {
      danger_accept_invalid_certs: true,
      ..Default::default()
    };
    assert!(TlsNode::build_client_config(&danger).is_ok());
  }
}
