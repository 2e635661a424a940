//! Pending replies
//!
//! A `PendingReply` is the handle returned for every command sent. It moves
//! from `Sent` to exactly one of `Completed`, `Failed` or `Cancelled`, and
//! its callback fires at most once. Cancelling suppresses the callback; if
//! the reply won the race the cancel is a no-op.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::value::Value;

/// Observable state of a pending reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyStatus {
    Sent,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
enum Outcome {
    Sent,
    Completed(Value),
    Failed(Error),
    Cancelled,
}

impl Outcome {
    fn status(&self) -> ReplyStatus {
        match self {
            Outcome::Sent => ReplyStatus::Sent,
            Outcome::Completed(_) => ReplyStatus::Completed,
            Outcome::Failed(_) => ReplyStatus::Failed,
            Outcome::Cancelled => ReplyStatus::Cancelled,
        }
    }

    /// Result handed to callbacks; `None` while sent or once cancelled
    fn result(&self) -> Option<Result<Value>> {
        match self {
            Outcome::Completed(v) => Some(Ok(v.clone())),
            Outcome::Failed(e) => Some(Err(e.clone())),
            Outcome::Sent | Outcome::Cancelled => None,
        }
    }
}

type Callback = Box<dyn FnOnce(Result<Value>) + Send>;
type CancelHook = Box<dyn FnOnce(u32) + Send>;

enum CallbackSlot {
    Empty,
    Waiting(Callback),
    /// A callback was registered and has fired or been dropped
    Used,
}

struct PendingInner {
    id: u32,
    outcome: watch::Sender<Outcome>,
    /// Also serializes state transitions against callback registration
    callback: Mutex<CallbackSlot>,
    /// Run once on a successful cancel; the owner forgets the request
    on_cancel: Mutex<Option<CancelHook>>,
}

/// Handle to an asynchronous, single-fire command result
#[derive(Clone)]
pub struct PendingReply {
    inner: Arc<PendingInner>,
}

impl PendingReply {
    pub(crate) fn new(id: u32) -> Self {
        let (outcome, _) = watch::channel(Outcome::Sent);
        Self {
            inner: Arc::new(PendingInner {
                id,
                outcome,
                callback: Mutex::new(CallbackSlot::Empty),
                on_cancel: Mutex::new(None),
            }),
        }
    }

    /// Request id this reply answers
    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn status(&self) -> ReplyStatus {
        self.inner.outcome.borrow().status()
    }

    /// Register the completion callback.
    ///
    /// Only one callback may be registered. If the reply already completed
    /// the callback runs right away on the calling thread; if it was
    /// cancelled the callback is dropped unrun.
    pub fn on_complete<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let ready = {
            let mut slot = self.inner.callback.lock();
            if !matches!(*slot, CallbackSlot::Empty) {
                return Err(Error::invalid(format!(
                    "reply {} already has a callback",
                    self.inner.id
                )));
            }
            let outcome = self.inner.outcome.borrow().clone();
            match outcome {
                Outcome::Sent => {
                    *slot = CallbackSlot::Waiting(Box::new(callback));
                    return Ok(());
                }
                other => {
                    *slot = CallbackSlot::Used;
                    other.result()
                }
            }
        };

        if let Some(result) = ready {
            callback(result);
        }
        Ok(())
    }

    /// Install the hook run when this reply is cancelled
    pub(crate) fn set_cancel_hook<F>(&self, hook: F)
    where
        F: FnOnce(u32) + Send + 'static,
    {
        *self.inner.on_cancel.lock() = Some(Box::new(hook));
    }

    pub(crate) fn complete(&self, result: Result<Value>) {
        let outcome = match result {
            Ok(v) => Outcome::Completed(v),
            Err(e) => Outcome::Failed(e),
        };
        let callback = {
            let mut slot = self.inner.callback.lock();
            if !self.transition(outcome) {
                tracing::trace!(request_id = self.inner.id, "Late completion ignored");
                return;
            }
            self.inner.on_cancel.lock().take();
            match std::mem::replace(&mut *slot, CallbackSlot::Used) {
                CallbackSlot::Waiting(cb) => Some(cb),
                CallbackSlot::Empty => {
                    *slot = CallbackSlot::Empty;
                    None
                }
                CallbackSlot::Used => None,
            }
        };

        let result = self.inner.outcome.borrow().result();
        if let (Some(cb), Some(result)) = (callback, result) {
            cb(result);
        }
    }

    /// Stop caring about the reply. Idempotent, and a no-op once the reply
    /// has completed.
    pub fn cancel(&self) {
        {
            let mut slot = self.inner.callback.lock();
            if !self.transition(Outcome::Cancelled) {
                return;
            }
            if matches!(*slot, CallbackSlot::Waiting(_)) {
                *slot = CallbackSlot::Used;
            }
        }
        tracing::debug!(request_id = self.inner.id, "Reply cancelled");

        let hook = self.inner.on_cancel.lock().take();
        if let Some(hook) = hook {
            hook(self.inner.id);
        }
    }

    /// Wait for the outcome
    pub async fn wait(&self) -> Result<Value> {
        let mut rx = self.inner.outcome.subscribe();
        let outcome = rx
            .wait_for(|o| !matches!(o, Outcome::Sent))
            .await
            .map_err(|_| Error::Cancelled)?
            .clone();
        match outcome {
            Outcome::Completed(v) => Ok(v),
            Outcome::Failed(e) => Err(e),
            Outcome::Sent | Outcome::Cancelled => Err(Error::Cancelled),
        }
    }

    /// Move out of `Sent`; false if already settled
    fn transition(&self, next: Outcome) -> bool {
        self.inner.outcome.send_if_modified(|current| {
            if matches!(current, Outcome::Sent) {
                *current = next;
                true
            } else {
                false
            }
        })
    }
}

impl fmt::Debug for PendingReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingReply")
            .field("id", &self.inner.id)
            .field("status", &self.status())
            .finish()
    }
}
