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

//! RFC 6455 payload masking. XOR with a 4-byte key, so masking and
//! unmasking are the same operation.

/// Masks `buf` in place, four bytes at a time.
pub fn apply_mask(key: [u8; 4], buf: &mut [u8]) {
  apply_mask_offset(key, 0, buf);
}

/// Masks `buf` in place as if it started `offset` bytes into the payload.
///
/// Needed when one logical payload is masked in several chunks: the key
/// index must continue across chunk boundaries, not restart at every
/// chunk.
pub fn apply_mask_offset(key: [u8; 4], offset: usize, buf: &mut [u8]) {
  let key = rotate(key, offset);
  let key_word = u32::from_ne_bytes(key);
  let mut chunks = buf.chunks_exact_mut(4);
  for chunk in &mut chunks {
    let word = u32::from_ne_bytes(chunk.try_into().unwrap()) ^ key_word;
    chunk.copy_from_slice(&word.to_ne_bytes());
  }
  for (i, b) in chunks.into_remainder().iter_mut().enumerate() {
    *b ^= key[i & 3];
  }
}

/// Masks `src` into `dst` (`dst[i] = src[i] ^ key[(offset + i) % 4]`).
/// Panics if `dst` is shorter than `src`.
pub fn mask_into(key: [u8; 4], offset: usize, src: &[u8], dst: &mut [u8]) {
  assert!(dst.len() >= src.len());
  for (i, (s, d)) in src.iter().zip(dst.iter_mut()).enumerate() {
    *d = s ^ key[(offset + i) & 3];
  }
}

fn rotate(key: [u8; 4], offset: usize) -> [u8; 4] {
  let o = offset & 3;
  [key[o], key[(o + 1) & 3], key[(o + 2) & 3], key[(o + 3) & 3]]
}
