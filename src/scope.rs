// SPDX-License-Identifier: Apache-2.0

//! Hierarchical one-shot cancellation.
//!
//! A [`CancelScope`] is a node in a cancellation forest. Cancelling a scope
//! cancels every scope transitively created from it; the cancelled flag is
//! monotonic and never resets. Tasks observe cancellation either by polling
//! [`CancelScope::done`] or by awaiting [`CancelScope::cancelled`] inside a
//! `select!`.

use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::Notify;

#[derive(Clone, Default)]
pub struct CancelScope {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    cancelled: AtomicBool,
    children: Mutex<Vec<Weak<Inner>>>,
    notify: Notify,
}

impl CancelScope {
    /// Create a root scope with no parent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a child of this scope. A child created while the parent is
    /// mid-cancel is born cancelled: the parent flag is tested under the
    /// parent's child-list lock, which is the same lock the cancel walk
    /// drains the list under.
    pub fn child(&self) -> Self {
        let child = Arc::new(Inner::default());

        let mut children = self.inner.children.lock().unwrap();
        if self.inner.cancelled.load(Ordering::SeqCst) {
            child.cancelled.store(true, Ordering::SeqCst);
        } else {
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }

        Self { inner: child }
    }

    /// Mark this scope and all descendants cancelled. Idempotent; the whole
    /// subtree is cancelled before this returns.
    pub fn cancel(&self) {
        cancel_subtree(&self.inner);
    }

    /// Non-blocking poll of the cancelled flag.
    pub fn done(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once this scope is cancelled. Completes immediately if it
    /// already is.
    pub async fn cancelled(&self) {
        let mut notified = pin!(self.inner.notify.notified());
        loop {
            if self.done() {
                return;
            }
            // Register before the final flag check so a cancel landing in
            // between still reaches us through notify_waiters.
            notified.as_mut().enable();
            if self.done() {
                return;
            }
            notified.as_mut().await;
            notified.set(self.inner.notify.notified());
        }
    }
}

fn cancel_subtree(inner: &Arc<Inner>) {
    if inner.cancelled.swap(true, Ordering::SeqCst) {
        return;
    }
    inner.notify.notify_waiters();

    // Take the children out under the lock, walk them after releasing it.
    let children: Vec<Weak<Inner>> = {
        let mut guard = inner.children.lock().unwrap();
        std::mem::take(&mut *guard)
    };
    for child in children {
        if let Some(child) = child.upgrade() {
            cancel_subtree(&child);
        }
    }
}
