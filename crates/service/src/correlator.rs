//! Reply Correlator: pairs a reply-bearing call with the handler waiting
//! on its originating call id.
//!
//! A handler is a `tokio::sync::oneshot` sender under the hood; exactly
//! one of "a reply arrived", "the wait timed out", or "the node closed"
//! can complete the corresponding receiver, which gives the "exactly one
//! terminal event" invariant for free from the channel's own semantics
//! rather than from bookkeeping in this module.

use std::sync::Arc;
use std::time::Duration;

use ahash::HashMap;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::model::CallRecord;

/// The outcome of awaiting a reply to some call. Exactly one variant is
/// ever produced for a given wait.
#[derive(Debug)]
pub enum CallOutcome {
    Response(CallRecord),
    TimedOut,
    Closed,
}

type UnhandledFn = dyn Fn(CallRecord) + Send + Sync;

#[derive(Default)]
struct Inner {
    handlers: HashMap<Uuid, oneshot::Sender<CallRecord>>,
}

/// The handler table named in the component design: a single
/// mutex-protected map from the awaited call's id to the waiter's
/// channel, plus an optional fallback sink for replies nobody is waiting
/// on.
pub struct Correlator {
    inner: Mutex<Inner>,
    unhandled: Mutex<Option<Arc<UnhandledFn>>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            unhandled: Mutex::new(None),
        }
    }
}

impl Correlator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install the `OnUnhandledResult` fallback. Replaces any previously
    /// configured fallback.
    pub fn set_unhandled<F>(&self, f: F)
    where
        F: Fn(CallRecord) + Send + Sync + 'static,
    {
        *self.unhandled.lock() = Some(Arc::new(f));
    }

    fn register(&self, call_id: Uuid) -> oneshot::Receiver<CallRecord> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().handlers.insert(call_id, tx);
        rx
    }

    /// Remove a handler without delivering to it. Used when a waiter gives
    /// up (timeout) so a reply that arrives afterward falls through to
    /// `OnUnhandledResult` instead of being silently dropped on a dead
    /// channel.
    fn forget(&self, call_id: &Uuid) {
        self.inner.lock().handlers.remove(call_id);
    }

    /// Deliver a reply-bearing call to whichever handler is waiting on its
    /// `reply_to_id`, or to the unhandled fallback if none is, logging and
    /// discarding if neither is available.
    pub fn deliver(&self, call: CallRecord) {
        let Some(reply_to) = call.reply_to_id else {
            log::warn!(
                target: "arpc_core::correlator",
                "deliver called with a non-reply call {}",
                call.call_id
            );
            return;
        };

        let handler = self.inner.lock().handlers.remove(&reply_to);
        match handler {
            Some(tx) => {
                // The waiter may have raced us and already timed out; a
                // failed send just means the receiver was dropped, which
                // is not an error here.
                let _ = tx.send(call);
            }
            None => {
                let fallback = self.unhandled.lock().clone();
                match fallback {
                    Some(f) => f(call),
                    None => log::debug!(
                        target: "arpc_core::correlator",
                        "discarding unhandled reply to {reply_to}"
                    ),
                }
            }
        }
    }

    /// Register a handler for `call_id` and wait for its terminal event,
    /// racing the reply channel against `timeout`. At most one of
    /// "response", "timed out" can happen for a given call to this
    /// function.
    ///
    /// # Test
    ///
    /// ```
    /// use arpc_core::correlator::{CallOutcome, Correlator};
    /// use arpc_core::model::{ArgList, CallRecord};
    /// use std::time::Duration;
    /// use uuid::Uuid;
    ///
    /// # fn main() {
    /// pollster::block_on(async {
    ///     let correlator = Correlator::new();
    ///     let call_id = Uuid::new_v4();
    ///
    ///     let wait = correlator.await_reply(call_id, Duration::from_secs(5));
    ///     correlator.deliver(CallRecord::reply(Uuid::new_v4(), call_id, ArgList::default()));
    ///
    ///     assert!(matches!(wait.await, CallOutcome::Response(_)));
    /// });
    /// # }
    /// ```
    pub async fn await_reply(&self, call_id: Uuid, timeout: Duration) -> CallOutcome {
        let rx = self.register(call_id);

        tokio::select! {
            result = rx => match result {
                Ok(call) => CallOutcome::Response(call),
                Err(_) => CallOutcome::Closed,
            },
            _ = tokio::time::sleep(timeout) => {
                self.forget(&call_id);
                CallOutcome::TimedOut
            }
        }
    }

    /// Node close: drain every pending handler. Dropping the sender side
    /// of each handler's channel makes its waiter observe `Closed`.
    pub fn close_all(&self) {
        self.inner.lock().handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ArgList;

    #[tokio::test]
    async fn delivers_to_the_waiting_handler() {
        let correlator = Correlator::new();
        let call_id = Uuid::new_v4();

        let wait = correlator.await_reply(call_id, Duration::from_secs(5));
        correlator.deliver(CallRecord::reply(Uuid::new_v4(), call_id, ArgList::default()));

        match wait.await {
            CallOutcome::Response(call) => assert_eq!(call.reply_to_id, Some(call_id)),
            other => panic!("expected a response, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn times_out_when_nothing_replies() {
        let correlator = Correlator::new();
        let call_id = Uuid::new_v4();

        let outcome = correlator.await_reply(call_id, Duration::from_millis(10)).await;
        assert!(matches!(outcome, CallOutcome::TimedOut));
        assert!(correlator.is_empty());
    }

    #[tokio::test]
    async fn close_drains_pending_handlers_as_closed() {
        let correlator = Correlator::new();
        let call_id = Uuid::new_v4();

        let wait = correlator.await_reply(call_id, Duration::from_secs(5));
        correlator.close_all();

        assert!(matches!(wait.await, CallOutcome::Closed));
    }

    #[tokio::test]
    async fn unhandled_reply_falls_back() {
        let correlator = Correlator::new();
        let (tx, rx) = oneshot::channel();
        let tx = Mutex::new(Some(tx));

        correlator.set_unhandled(move |call| {
            if let Some(tx) = tx.lock().take() {
                let _ = tx.send(call.call_id);
            }
        });

        let reply = CallRecord::reply(Uuid::new_v4(), Uuid::new_v4(), ArgList::default());
        let expected = reply.call_id;
        correlator.deliver(reply);

        assert_eq!(rx.await.unwrap(), expected);
    }
}
