//! Single-fire completion signal and the timeout race built on it.
//!
//! A print job can be finished by several independent parties: the work
//! itself, a load failure reported from an engine callback, the deadline
//! timer, or an external cancellation. [`Completion`] makes sure exactly one
//! of them decides the outcome; every later attempt is a silent no-op.
//!
//! # Example
//!
//! ```rust
//! use markup2pdf::Completion;
//!
//! # tokio_test::block_on(async {
//! let (signal, resolution) = Completion::<u32>::pair();
//! let late = signal.clone();
//!
//! assert!(signal.resolve(1));
//! assert!(!late.resolve(2));
//! assert_eq!(resolution.await.unwrap(), 1);
//! # });
//! ```

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{PrintError, Result};

/// Receiving half of a [`Completion`]; resolves to the first delivered value.
pub type Resolution<T> = oneshot::Receiver<T>;

/// Cloneable at-most-once signal.
///
/// Clones share state: whichever clone calls [`resolve`](Self::resolve)
/// first delivers its value, every other call returns `false`.
pub struct Completion<T> {
    inner: Arc<CompletionInner<T>>,
}

struct CompletionInner<T> {
    resolved: AtomicBool,
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

impl<T> Completion<T> {
    /// Create a signal and the receiver its first value is delivered to.
    pub fn pair() -> (Self, Resolution<T>) {
        let (tx, rx) = oneshot::channel();
        let signal = Self {
            inner: Arc::new(CompletionInner {
                resolved: AtomicBool::new(false),
                sender: Mutex::new(Some(tx)),
            }),
        };
        (signal, rx)
    }

    /// Deliver `value` unless the signal was already resolved.
    ///
    /// Returns `true` only for the call that won. A dropped receiver still
    /// counts as resolved.
    pub fn resolve(&self, value: T) -> bool {
        self.resolve_with(|| value)
    }

    /// Claim the signal, then run `produce` and deliver its value.
    ///
    /// `produce` runs only if this call wins, and no other party can
    /// resolve the signal while it runs. Used to make a side effect (such
    /// as replacing the destination file) part of the winning resolution.
    ///
    /// ```rust
    /// use markup2pdf::Completion;
    ///
    /// let (signal, _resolution) = Completion::<&str>::pair();
    /// assert!(signal.resolve("timed out"));
    ///
    /// let mut ran = false;
    /// assert!(!signal.resolve_with(|| {
    ///     ran = true;
    ///     "written"
    /// }));
    /// assert!(!ran);
    /// ```
    pub fn resolve_with<F: FnOnce() -> T>(&self, produce: F) -> bool {
        if self
            .inner
            .resolved
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        // Taken before `produce` runs: a panic there drops the sender and
        // the receiver sees a closed channel instead of waiting forever.
        let sender = match self.inner.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let value = produce();
        if let Some(tx) = sender {
            // Receiver may be gone if the job was abandoned; the guard still holds.
            let _ = tx.send(value);
        }
        true
    }

    /// Whether some party already resolved this signal.
    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.load(Ordering::Acquire)
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Completion")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

// ============================================================================
// Timeout race
// ============================================================================

/// Aborts the deadline timer when dropped.
///
/// Covers the case where the racing future itself is dropped by its caller.
struct TimerGuard(JoinHandle<()>);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Race `op` against a deadline and a cancellation token.
///
/// One timer task resolves the shared signal with
/// [`PrintError::Timeout`] when `timeout` elapses or with
/// [`PrintError::Cancelled`] when `cancel` fires. `op` receives a clone of
/// the signal so callbacks it registers can resolve the job early; its own
/// result is delivered when it returns. The first resolution wins, the
/// rest of `op` is dropped, and the timer is aborted before returning.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use markup2pdf::{race_with_timeout, PrintError};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let token = CancellationToken::new();
/// let outcome: Result<(), PrintError> =
///     race_with_timeout(Duration::from_millis(20), &token, |_signal| async {
///         tokio::time::sleep(Duration::from_secs(5)).await;
///         Ok(())
///     })
///     .await;
///
/// assert!(matches!(outcome, Err(PrintError::Timeout(_))));
/// # }
/// ```
pub async fn race_with_timeout<T, F, Fut>(
    timeout: Duration,
    cancel: &CancellationToken,
    op: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Completion<Result<T>>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let (signal, mut resolution) = Completion::pair();
    let _timer = TimerGuard(spawn_deadline(signal.clone(), timeout, cancel.clone()));

    let work = op(signal.clone());
    tokio::pin!(work);

    let delivered = tokio::select! {
        biased;
        delivered = &mut resolution => delivered,
        result = &mut work => {
            if !signal.resolve(result) {
                log::trace!("Work finished after the job was already resolved");
            }
            (&mut resolution).await
        }
    };

    delivered.unwrap_or_else(|_| {
        Err(PrintError::Internal(
            "completion signal dropped before resolving".to_string(),
        ))
    })
}

fn spawn_deadline<T: Send + 'static>(
    signal: Completion<Result<T>>,
    timeout: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                if signal.resolve(Err(PrintError::Timeout(timeout))) {
                    log::warn!("⏰ Render job timed out after {:?}", timeout);
                }
            }
            _ = cancel.cancelled() => {
                if signal.resolve(Err(PrintError::Cancelled)) {
                    log::debug!("Render job cancelled by caller");
                }
            }
        }
    })
}

// ============================================================================
// Unit Tests
// ============================================================================
