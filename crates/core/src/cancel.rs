// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cooperative cancellation for asynchronous operations
//!
//! A `CancelController` owns a `CancelSignal` that flips to aborted exactly
//! once and never resets. Registered handlers are scheduled on the runtime
//! rather than invoked synchronously, so aborting while a caller is still
//! wiring up listeners cannot re-enter the registry.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::Notify;

/// The only event name the signal dispatches
pub const ABORT_EVENT: &str = "abort";

/// Error returned when an operation observed an aborted signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operation aborted")]
pub struct Aborted;

/// Errors from the listener registration API
#[derive(Debug, Error)]
pub enum SignalError {
    #[error("unsupported event name \"{0}\", expected \"abort\"")]
    UnsupportedEvent(String),
}

/// Token identifying a registered abort handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Box<dyn Fn() + Send + Sync + 'static>;

struct SignalInner {
    aborted: bool,
    next_id: u64,
    handlers: BTreeMap<u64, Handler>,
}

/// Shared abort flag plus its handler registry
///
/// Clones share state; the signal is only ever aborted through its
/// controller (or a merged parent).
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<Mutex<SignalInner>>,
    notify: Arc<Notify>,
}

impl CancelSignal {
    fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(SignalInner {
                aborted: false,
                next_id: 0,
                handlers: BTreeMap::new(),
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Whether the signal has been aborted
    pub fn is_aborted(&self) -> bool {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).aborted
    }

    /// Fail with `Aborted` if the signal has already fired
    pub fn ensure_active(&self) -> Result<(), Aborted> {
        if self.is_aborted() {
            Err(Aborted)
        } else {
            Ok(())
        }
    }

    /// Register a handler for the `abort` event
    ///
    /// Handlers registered after the signal aborted never fire.
    pub fn add_listener(
        &self,
        event: &str,
        handler: impl Fn() + Send + Sync + 'static,
    ) -> Result<HandlerId, SignalError> {
        if event != ABORT_EVENT {
            return Err(SignalError::UnsupportedEvent(event.to_string()));
        }
        Ok(self.subscribe(handler))
    }

    /// Deregister a previously-added handler
    pub fn remove_listener(&self, event: &str, id: HandlerId) -> Result<(), SignalError> {
        if event != ABORT_EVENT {
            return Err(SignalError::UnsupportedEvent(event.to_string()));
        }
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.handlers.remove(&id.0);
        Ok(())
    }

    /// Resolve once the signal aborts (immediately if it already has)
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register interest before checking the flag so an abort between the
        // check and the await still wakes us.
        if notified.as_mut().enable() || self.is_aborted() {
            return;
        }
        notified.await;
    }

    fn subscribe(&self, handler: impl Fn() + Send + Sync + 'static) -> HandlerId {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.insert(id, Box::new(handler));
        HandlerId(id)
    }

    fn fire(&self) {
        let handlers = {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            if inner.aborted {
                return;
            }
            inner.aborted = true;
            std::mem::take(&mut inner.handlers)
        };
        self.notify.notify_waiters();
        for (_, handler) in handlers {
            tokio::spawn(async move { handler() });
        }
    }
}

/// Owner of a `CancelSignal`; the only way to abort it
pub struct CancelController {
    signal: CancelSignal,
}

impl CancelController {
    pub fn new() -> Self {
        Self {
            signal: CancelSignal::new(),
        }
    }

    /// The signal this controller aborts
    pub fn signal(&self) -> CancelSignal {
        self.signal.clone()
    }

    /// Abort the signal; idempotent after the first call
    pub fn abort(&self) {
        self.signal.fire();
    }
}

impl Default for CancelController {
    fn default() -> Self {
        Self::new()
    }
}

/// Derive a signal that aborts as soon as any input signal aborts
///
/// Already aborted if any input is. The inputs themselves are unaffected.
pub fn merged<'a, I>(signals: I) -> CancelSignal
where
    I: IntoIterator<Item = &'a CancelSignal>,
{
    let derived = CancelSignal::new();
    for signal in signals {
        if signal.is_aborted() {
            derived.fire();
        } else {
            let downstream = derived.clone();
            signal.subscribe(move || downstream.fire());
        }
    }
    derived
}

/// Future form of the abort error: resolves to `Aborted` when the signal fires
pub async fn wait_for_abort(signal: &CancelSignal) -> Aborted {
    signal.cancelled().await;
    Aborted
}

/// Race `task` against an abort-triggered fallback
///
/// Returns the task's result if it settles first; once the signal aborts,
/// runs `on_abort` and returns its result instead.
pub async fn with_abort_handler<T, F, A>(signal: &CancelSignal, task: F, on_abort: A) -> T
where
    F: Future<Output = T>,
    A: Future<Output = T>,
{
    tokio::select! {
        result = task => result,
        result = async {
            signal.cancelled().await;
            on_abort.await
        } => result,
    }
}

/// Entry-point check for the optional tokens threaded through store operations
pub fn check(cancel: Option<&CancelSignal>) -> Result<(), Aborted> {
    match cancel {
        Some(signal) => signal.ensure_active(),
        None => Ok(()),
    }
}

#[cfg(test)]
#[path = "cancel_tests.rs"]
mod tests;
