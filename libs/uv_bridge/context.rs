// Copyright 2018-2026 the Deno authors. MIT license.

use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Host-side ambient state (the "current scope") that was active when a
/// handle or callback was registered. Clones share identity.
#[derive(Clone)]
pub struct ExecutionContext(Rc<ContextInner>);

struct ContextInner {
  id: u64,
  name: Cow<'static, str>,
}

impl ExecutionContext {
  pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
    Self(Rc::new(ContextInner {
      id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
      name: name.into(),
    }))
  }

  pub fn id(&self) -> u64 {
    self.0.id
  }

  pub fn name(&self) -> &str {
    &self.0.name
  }
}

impl PartialEq for ExecutionContext {
  fn eq(&self, other: &Self) -> bool {
    Rc::ptr_eq(&self.0, &other.0)
  }
}

impl Eq for ExecutionContext {}

impl fmt::Debug for ExecutionContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "ExecutionContext({}, {:?})", self.0.id, self.0.name)
  }
}

pub(crate) struct ContextStack {
  current: RefCell<ExecutionContext>,
}

impl ContextStack {
  pub fn new(root: ExecutionContext) -> Self {
    Self {
      current: RefCell::new(root),
    }
  }

  pub fn current(&self) -> ExecutionContext {
    self.current.borrow().clone()
  }

  pub fn enter(&self, context: ExecutionContext) -> ContextGuard<'_> {
    let previous = self.current.replace(context);
    ContextGuard {
      stack: self,
      previous: Some(previous),
    }
  }
}

/// Restores the previously current context when dropped, including when a
/// host closure unwinds.
pub struct ContextGuard<'a> {
  stack: &'a ContextStack,
  previous: Option<ExecutionContext>,
}

impl Drop for ContextGuard<'_> {
  fn drop(&mut self) {
    if let Some(previous) = self.previous.take() {
      self.stack.current.replace(previous);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn enter_restores_previous() {
    let root = ExecutionContext::new("root");
    let inner = ExecutionContext::new("inner");
    let stack = ContextStack::new(root.clone());
    {
      let _guard = stack.enter(inner.clone());
      assert_eq!(stack.current(), inner);
      {
        let _nested = stack.enter(root.clone());
        assert_eq!(stack.current(), root);
      }
      assert_eq!(stack.current(), inner);
    }
    assert_eq!(stack.current(), root);
  }

  #[test]
  fn identity_is_per_instance() {
    let a = ExecutionContext::new("same");
    let b = ExecutionContext::new("same");
    assert_ne!(a, b);
    assert_eq!(a, a.clone());
    assert_ne!(a.id(), b.id());
  }
}
