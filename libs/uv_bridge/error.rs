// Copyright 2018-2026 the Deno authors. MIT license.

use crate::errno;
use crate::handle::HandleKind;
use crate::handle::HandleState;
use crate::resources::ResourceId;

/// Errors reported synchronously by bridge entry points. Failures that happen
/// after an operation was accepted by the native loop are never reported here;
/// they reach the host as a negative status argument of the matching callback.
#[derive(Debug, thiserror::Error, deno_error::JsError)]
pub enum BridgeError {
  #[class(generic)]
  #[error("{op} failed: {} ({})", errno::strerror(*.code), errno::err_name(*.code))]
  Setup { op: &'static str, code: i32 },
  #[class("BadResource")]
  #[error("handle {rid} is {state}")]
  InvalidHandleState { rid: ResourceId, state: HandleState },
  #[class("BadResource")]
  #[error("Bad resource ID")]
  NotFound(ResourceId),
  #[class(type)]
  #[error("{op} is not supported on {kind} handles")]
  Unsupported { op: &'static str, kind: HandleKind },
  #[class(type)]
  #[error("invalid argument: {0}")]
  InvalidArgument(&'static str),
  #[class(generic)]
  #[error("handle was already torn down")]
  DoubleTeardown,
  #[class(generic)]
  #[error("{0} is not locked")]
  NotLocked(&'static str),
  #[class(inherit)]
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl BridgeError {
  pub(crate) fn setup(op: &'static str, code: i32) -> Self {
    BridgeError::Setup { op, code }
  }

  /// Native status code carried by this error, when there is one.
  pub fn code(&self) -> Option<i32> {
    match self {
      BridgeError::Setup { code, .. } => Some(*code),
      BridgeError::Io(err) => Some(errno::from_io_error(err)),
      _ => None,
    }
  }
}
