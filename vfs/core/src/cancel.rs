//! Cooperative cancellation for disk-touching read paths.
//!
//! A [`CancellationToken`] is made current for a thread with
//! [`CancellationToken::scope`]. Every provider call that may touch a backing
//! store goes through [`access_disk_with_check_canceled`], which checks the
//! current token before and after the call.

use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{VfsError, VfsResult};

thread_local! {
    static CURRENT: RefCell<Option<CancellationToken>> = const { RefCell::new(None) };
}

#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn check(&self, context: &'static str) -> VfsResult<()> {
        if self.is_cancelled() {
            Err(VfsError::cancelled(context))
        } else {
            Ok(())
        }
    }

    /// Run `f` with this token installed as the thread's current token.
    pub fn scope<R>(&self, f: impl FnOnce() -> R) -> R {
        let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
        let _restore = RestoreCurrent(previous);
        f()
    }
}

struct RestoreCurrent(Option<CancellationToken>);

impl Drop for RestoreCurrent {
    fn drop(&mut self) {
        let previous = self.0.take();
        CURRENT.with(|current| {
            *current.borrow_mut() = previous;
        });
    }
}

/// Fails with `Cancelled` if the current thread's token has fired.
pub fn check_canceled(context: &'static str) -> VfsResult<()> {
    CURRENT.with(|current| match current.borrow().as_ref() {
        Some(token) => token.check(context),
        None => Ok(()),
    })
}

/// Wrap a backing-store access with cancellation checks.
///
/// The result of an access that completed after cancellation is discarded.
pub fn access_disk_with_check_canceled<T>(
    context: &'static str,
    io: impl FnOnce() -> VfsResult<T>,
) -> VfsResult<T> {
    check_canceled(context)?;
    let result = io()?;
    check_canceled(context)?;
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_current_token_never_cancels() {
        let value = access_disk_with_check_canceled("test.read", || Ok(7)).unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn cancelled_scope_skips_the_access() {
        let token = CancellationToken::new();
        token.cancel();
        let mut touched = false;
        let err = token
            .scope(|| {
                access_disk_with_check_canceled("test.read", || {
                    touched = true;
                    Ok(())
                })
            })
            .unwrap_err();
        assert!(err.is_cancelled());
        assert!(!touched);
    }

    #[test]
    fn cancellation_during_access_discards_result() {
        let token = CancellationToken::new();
        let err = token
            .scope(|| {
                access_disk_with_check_canceled("test.read", || {
                    token.cancel();
                    Ok(1)
                })
            })
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn scope_restores_previous_token() {
        let outer = CancellationToken::new();
        let inner = CancellationToken::new();
        inner.cancel();
        outer.scope(|| {
            assert!(inner.scope(|| check_canceled("inner")).is_err());
            assert!(check_canceled("outer").is_ok());
        });
        assert!(check_canceled("none").is_ok());
    }
}
