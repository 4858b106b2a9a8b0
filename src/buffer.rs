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

/// A fixed-capacity byte window over caller-owned storage.
///
/// Two cursors partition the backing slice: `begin..end` is the readable
/// region, `end..capacity` is the writable region. Invariant:
/// `0 <= begin <= end <= capacity`. The storage is borrowed, never owned;
/// the chain only ever holds views.
///
/// # Example
///
/// ```
/// use wirestack::Buffer;
///
/// let mut storage = [0u8; 8];
/// let mut buf = Buffer::new(&mut storage);
/// assert!(buf.append(b"abc"));
/// assert_eq!(buf.readable(), b"abc");
/// buf.consume(2);
/// assert_eq!(buf.readable(), b"c");
/// ```
#[derive(Default)]
pub struct Buffer<'a> {
  data: &'a mut [u8],
  begin: usize,
  end: usize,
}

impl<'a> Buffer<'a> {
  /// An empty view with both cursors at zero.
  pub fn new(data: &'a mut [u8]) -> Self {
    Self {
      data,
      begin: 0,
      end: 0,
    }
  }

  /// A view whose entire backing slice is already readable.
  pub fn filled(data: &'a mut [u8]) -> Self {
    let end = data.len();
    Self {
      data,
      begin: 0,
      end,
    }
  }

  /// A view with explicit cursor positions. Panics if
  /// `begin <= end <= data.len()` does not hold.
  pub fn with_cursors(data: &'a mut [u8], begin: usize, end: usize) -> Self {
    assert!(begin <= end && end <= data.len());
    Self { data, begin, end }
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.data.len()
  }

  /// Number of readable bytes (`end - begin`).
  #[inline]
  pub fn len(&self) -> usize {
    self.end - self.begin
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.end == self.begin
  }

  /// Bytes left in the writable region (`capacity - end`).
  #[inline]
  pub fn remaining_space(&self) -> usize {
    self.data.len() - self.end
  }

  /// The readable region.
  #[inline]
  pub fn readable(&self) -> &[u8] {
    &self.data[self.begin..self.end]
  }

  #[inline]
  pub fn readable_mut(&mut self) -> &mut [u8] {
    &mut self.data[self.begin..self.end]
  }

  /// The writable region. Call [`Buffer::obtain`] after filling a prefix
  /// of it to make those bytes readable.
  #[inline]
  pub fn writable(&mut self) -> &mut [u8] {
    &mut self.data[self.end..]
  }

  /// Marks `n` freshly written bytes as readable. Panics if `n` exceeds
  /// the writable region.
  pub fn obtain(&mut self, n: usize) {
    assert!(n <= self.remaining_space());
    self.end += n;
  }

  /// Discards up to `n` readable bytes from the front. Once the readable
  /// region empties, both cursors snap back to zero so the full capacity
  /// is writable again.
  pub fn consume(&mut self, n: usize) {
    self.begin = usize::min(self.begin + n, self.end);
    if self.begin == self.end {
      self.begin = 0;
      self.end = 0;
    }
  }

  /// Relocates the readable bytes to offset 0, preserving their order.
  pub fn shift(&mut self) {
    if self.begin == 0 {
      return;
    }
    self.data.copy_within(self.begin..self.end, 0);
    self.end -= self.begin;
    self.begin = 0;
  }

  /// Resets both cursors without touching the storage.
  pub fn clear(&mut self) {
    self.begin = 0;
    self.end = 0;
  }

  /// Appends `bytes` to the writable region. Returns `false` (leaving the
  /// buffer untouched) when the bytes do not fit.
  pub fn append(&mut self, bytes: &[u8]) -> bool {
    if bytes.len() > self.remaining_space() {
      return false;
    }
    self.data[self.end..self.end + bytes.len()].copy_from_slice(bytes);
    self.end += bytes.len();
    true
  }

  /// Moves this view out, leaving `self` empty over an empty slice.
  pub fn take(&mut self) -> Buffer<'a> {
    Buffer {
      data: std::mem::take(&mut self.data),
      begin: std::mem::take(&mut self.begin),
      end: std::mem::take(&mut self.end),
    }
  }
}

impl std::fmt::Debug for Buffer<'_> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Buffer")
      .field("begin", &self.begin)
      .field("end", &self.end)
      .field("capacity", &self.data.len())
      .finish()
  }
}
