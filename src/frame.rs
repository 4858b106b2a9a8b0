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

//! Stateless RFC 6455 frame header codec.
//!
//! Header layout: byte 0 is `FIN | opcode`, byte 1 is `MASK | length`,
//! where length 126 switches to a 16-bit big-endian extension and 127 to a
//! 64-bit one. The optional 4-byte masking key follows the length.

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
  #[error("invalid websocket opcode")]
  InvalidOpcode,
  #[error("control frame with payload data size larger than 125")]
  InvalidControlFrame,
  #[error("frame buffer too small, {required} bytes required")]
  BufferTooSmall { required: usize },
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
  Continuation = 0,
  Text = 1,
  Binary = 2,
  Close = 8,
  Ping = 9,
  Pong = 10,
}

impl OpCode {
  /// Close, Ping and Pong are control opcodes; their frames may not carry
  /// more than 125 payload bytes and may not fragment.
  #[inline]
  pub fn is_control(self) -> bool {
    matches!(self, OpCode::Close | OpCode::Ping | OpCode::Pong)
  }
}

impl TryFrom<u8> for OpCode {
  type Error = FrameError;

  fn try_from(value: u8) -> Result<Self, Self::Error> {
    match value {
      0 => Ok(OpCode::Continuation),
      1 => Ok(OpCode::Text),
      2 => Ok(OpCode::Binary),
      8 => Ok(OpCode::Close),
      9 => Ok(OpCode::Ping),
      10 => Ok(OpCode::Pong),
      _ => Err(FrameError::InvalidOpcode),
    }
  }
}

/// Opcode plus FIN bit, as carried on the `read`/`write` side channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFlags {
  pub opcode: OpCode,
  pub fin: bool,
}

impl FrameFlags {
  pub const fn new(opcode: OpCode, fin: bool) -> Self {
    Self { opcode, fin }
  }
}

impl Default for FrameFlags {
  /// An unfragmented binary frame, the common case for `send_frame`.
  fn default() -> Self {
    Self {
      opcode: OpCode::Binary,
      fin: true,
    }
  }
}

/// How the payload length was (or will be) encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LengthCode {
  Small,
  U16,
  U64,
}

impl LengthCode {
  fn for_len(payload_len: u64) -> Self {
    if payload_len < 126 {
      LengthCode::Small
    } else if payload_len <= 0xffff {
      LengthCode::U16
    } else {
      LengthCode::U64
    }
  }

  fn header_size(self) -> usize {
    match self {
      LengthCode::Small => 2,
      LengthCode::U16 => 4,
      LengthCode::U64 => 10,
    }
  }
}

/// Parsed form of a frame prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
  pub opcode: OpCode,
  pub fin: bool,
  pub masked: bool,
  pub payload_len: u64,
  length_code: LengthCode,
}

impl FrameHeader {
  /// Size of the fixed header as seen on the wire: 2, 4 or 10 bytes. The
  /// 4-byte masking key is *not* included; callers skip it separately when
  /// `masked` is set.
  #[inline]
  pub fn header_size(&self) -> usize {
    self.length_code.header_size()
  }

  /// Total on-wire frame length: header, masking key and payload.
  #[inline]
  pub fn frame_size(&self) -> u64 {
    let mask_len = if self.masked { 4 } else { 0 };
    self.header_size() as u64 + mask_len + self.payload_len
  }
}

/// Incrementally parses a frame header from the front of `data`.
///
/// Returns `Ok(None)` while `data` is too short for the prefix seen so
/// far; call again with more bytes. On success the header has consumed
/// [`FrameHeader::header_size`] bytes.
pub fn parse_header(data: &[u8]) -> Result<Option<FrameHeader>, FrameError> {
  if data.is_empty() {
    return Ok(None);
  }
  let opcode = OpCode::try_from(data[0] & 0x0f)?;
  if data.len() < 2 {
    return Ok(None);
  }
  let len7 = u64::from(data[1] & 0x7f);
  let (payload_len, length_code) = match len7 {
    126 => {
      if opcode.is_control() {
        return Err(FrameError::InvalidControlFrame);
      }
      if data.len() < 4 {
        return Ok(None);
      }
      let n = u16::from_be_bytes(data[2..4].try_into().unwrap());
      (u64::from(n), LengthCode::U16)
    }
    127 => {
      if opcode.is_control() {
        return Err(FrameError::InvalidControlFrame);
      }
      if data.len() < 10 {
        return Ok(None);
      }
      let n = u64::from_be_bytes(data[2..10].try_into().unwrap());
      (n, LengthCode::U64)
    }
    n => (n, LengthCode::Small),
  };
  Ok(Some(FrameHeader {
    opcode,
    fin: data[0] & 0x80 != 0,
    masked: data[1] & 0x80 != 0,
    payload_len,
    length_code,
  }))
}

/// Emits a frame header (and masking key, when one applies) into `out`.
///
/// A frame is masked iff a key is supplied *and* the payload is non-empty.
/// Returns the number of bytes written; fails with
/// [`FrameError::BufferTooSmall`] carrying the required size when `out`
/// cannot hold the header.
pub fn create(
  opcode: OpCode,
  fin: bool,
  mask_key: Option<&[u8; 4]>,
  payload_len: u64,
  out: &mut [u8],
) -> Result<usize, FrameError> {
  let mask_key = if payload_len > 0 { mask_key } else { None };
  let length_code = LengthCode::for_len(payload_len);
  let header_len =
    length_code.header_size() + if mask_key.is_some() { 4 } else { 0 };
  if out.len() < header_len {
    return Err(FrameError::BufferTooSmall {
      required: header_len,
    });
  }
  let fin_bit: u8 = if fin { 0x80 } else { 0 };
  out[0] = fin_bit | opcode as u8;
  let mask_bit: u8 = if mask_key.is_some() { 0x80 } else { 0 };
  let mut at = match length_code {
    LengthCode::Small => {
      out[1] = mask_bit | payload_len as u8;
      2
    }
    LengthCode::U16 => {
      out[1] = mask_bit | 126;
      out[2..4].copy_from_slice(&(payload_len as u16).to_be_bytes());
      4
    }
    LengthCode::U64 => {
      out[1] = mask_bit | 127;
      out[2..10].copy_from_slice(&payload_len.to_be_bytes());
      10
    }
  };
  if let Some(key) = mask_key {
    out[at..at + 4].copy_from_slice(key);
    at += 4;
  }
  debug_assert_eq!(at, header_len);
  Ok(header_len)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mask::apply_mask;

  fn roundtrip(opcode: OpCode, fin: bool, mask: Option<&[u8; 4]>, len: u64) {
    let mut header = [0u8; 14];
    let n = create(opcode, fin, mask, len, &mut header).unwrap();
    let parsed = parse_header(&header[..n]).unwrap().unwrap();
    assert_eq!(parsed.opcode, opcode);
    assert_eq!(parsed.fin, fin);
    assert_eq!(parsed.masked, mask.is_some() && len > 0);
    assert_eq!(parsed.payload_len, len);
    let mask_len = if parsed.masked { 4 } else { 0 };
    assert_eq!(parsed.header_size() + mask_len, n);
    assert_eq!(parsed.frame_size(), n as u64 + len);
  }

  #[test]
  fn roundtrip_boundary_lengths() {
    let key = b"abcd";
    for len in [0u64, 1, 125, 126, 127, 65535, 65536] {
      for opcode in [OpCode::Text, OpCode::Binary, OpCode::Continuation] {
        roundtrip(opcode, true, None, len);
        roundtrip(opcode, false, Some(key), len);
      }
    }
    for opcode in [OpCode::Close, OpCode::Ping, OpCode::Pong] {
      for len in [0u64, 1, 125] {
        roundtrip(opcode, true, Some(key), len);
      }
    }
  }

  #[test]
  fn empty_payload_is_never_masked() {
    let mut header = [0u8; 14];
    let n = create(OpCode::Ping, true, Some(b"abcd"), 0, &mut header).unwrap();
    assert_eq!(n, 2);
    assert_eq!(header[..2], [0x89, 0x00]);
  }

  #[test]
  fn masked_payload_roundtrips() {
    let key = *b"abcd";
    let payload = b"hello websocket".to_vec();
    let mut masked = payload.clone();
    apply_mask(key, &mut masked);
    apply_mask(key, &mut masked);
    assert_eq!(masked, payload);
  }

  #[test]
  fn rejects_invalid_opcodes() {
    for op in [3u8, 4, 5, 6, 7, 11, 12, 13, 14, 15] {
      let data = [0x80 | op, 0x00];
      assert_eq!(parse_header(&data), Err(FrameError::InvalidOpcode));
    }
  }

  #[test]
  fn rejects_oversized_control_frames() {
    for len_code in [126u8, 127] {
      let data = [0x89, len_code, 0, 0, 0, 0, 0, 0, 0, 0];
      assert_eq!(parse_header(&data), Err(FrameError::InvalidControlFrame));
    }
  }

  #[test]
  fn truncated_prefixes_need_more_data() {
    assert_eq!(parse_header(&[]), Ok(None));
    assert_eq!(parse_header(&[0x82]), Ok(None));
    // 16-bit length, only 3 of 4 header bytes present.
    assert_eq!(parse_header(&[0x82, 126, 0x01]), Ok(None));
    // 64-bit length, only 9 of 10 header bytes present.
    let long = [0x82, 127, 0, 0, 0, 0, 0, 1, 0];
    assert_eq!(parse_header(&long), Ok(None));
  }

  #[test]
  fn create_reports_required_size() {
    let mut tiny = [0u8; 3];
    let err = create(OpCode::Binary, true, Some(b"abcd"), 200, &mut tiny);
    assert_eq!(err, Err(FrameError::BufferTooSmall { required: 8 }));
  }

  #[test]
  fn wire_bytes_match_the_rfc_layout() {
    let mut header = [0u8; 14];
    let n = create(OpCode::Binary, true, Some(b"abcd"), 5, &mut header).unwrap();
    assert_eq!(&header[..n], &[0x82, 0x85, b'a', b'b', b'c', b'd']);
  }
}
