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

use std::borrow::Cow;
use std::cell::RefCell;

/// The error record produced by a failing layer.
///
/// `code` is negative for layer-defined conditions (each layer's namespace
/// starts at −10000), positive for OS errno values, and 0 for chain misuse
/// (e.g. a top layer asking for input with nothing chained below it).
///
/// Every failing call also stores a copy of its record in thread-local
/// storage; [`last_error`] retrieves it after the fact, which is handy when
/// the `Result` has already been discarded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{node}: {message} ({code})")]
pub struct NodeError {
  /// Name of the layer that failed (`"socket"`, `"rustls"`, `"websocket"`).
  pub node: &'static str,
  pub code: i32,
  pub message: Cow<'static, str>,
}

impl NodeError {
  pub fn new(
    node: &'static str,
    code: i32,
    message: impl Into<Cow<'static, str>>,
  ) -> Self {
    Self {
      node,
      code,
      message: message.into(),
    }
  }

  /// Translates an OS-level failure; the errno becomes the (positive) code.
  pub fn from_io(node: &'static str, err: &std::io::Error) -> Self {
    Self {
      node,
      code: err.raw_os_error().unwrap_or(0),
      message: Cow::Owned(err.to_string()),
    }
  }
}

thread_local! {
  static LAST_ERROR: RefCell<Option<NodeError>> = const { RefCell::new(None) };
}

/// Stores `err` in the thread-local slot and hands it back, so failing
/// paths read `return Err(record(...))`.
pub(crate) fn record(err: NodeError) -> NodeError {
  LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(err.clone()));
  err
}

pub(crate) fn clear() {
  LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

/// The most recent [`NodeError`] recorded on this thread, if any.
///
/// Each thread observes only its own errors; a chain driven from thread A
/// never clobbers the record thread B is looking at.
pub fn last_error() -> Option<NodeError> {
  LAST_ERROR.with(|slot| slot.borrow().clone())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn record_then_read_back() {
    clear();
    let err = record(NodeError::new("socket", -10001, "remote socket closed"));
    assert_eq!(last_error(), Some(err));
    clear();
    assert_eq!(last_error(), None);
  }

  #[test]
  fn slots_are_per_thread() {
    clear();
    record(NodeError::new("socket", -10003, "socket read timeout"));
    let other = std::thread::spawn(|| {
      assert_eq!(last_error(), None);
      record(NodeError::new("websocket", -10001, "received invalid opcode"));
      last_error().unwrap().code
    })
    .join()
    .unwrap();
    assert_eq!(other, -10001);
    // This thread still sees its own record.
    assert_eq!(last_error().unwrap().node, "socket");
  }

  #[test]
  fn errno_becomes_positive_code() {
    let io = std::io::Error::from_raw_os_error(104);
    let err = NodeError::from_io("socket", &io);
    assert_eq!(err.code, 104);
  }
}
