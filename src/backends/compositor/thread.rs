// SPDX-License-Identifier: GPL-3.0-only
//! Dedicated compositor thread and bounded-wait promises
//!
//! Every channel owns one thread that creates and exclusively uses its
//! graphics context. Other threads interact with the context only by posting
//! jobs. Callers that need a result wait on a [`Promise`] with a bound, so no
//! caller ever blocks indefinitely on the compositor.

use crate::errors::CompositorError;
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Write side of a one-shot result
pub struct Completer<T>(SyncSender<T>);

/// Read side of a one-shot result with a bounded wait
pub struct Promise<T>(Receiver<T>);

/// Create a connected completer/promise pair
pub fn promise<T>() -> (Completer<T>, Promise<T>) {
    let (tx, rx) = mpsc::sync_channel(1);
    (Completer(tx), Promise(rx))
}

impl<T> Completer<T> {
    /// Deliver the result; a dropped promise is ignored
    pub fn complete(self, value: T) {
        let _ = self.0.try_send(value);
    }
}

impl<T> Promise<T> {
    /// Wait at most `timeout`; `None` on expiry or if the completer was dropped
    pub fn wait(self, timeout: Duration) -> Option<T> {
        self.0.recv_timeout(timeout).ok()
    }
}

/// State living on the compositor thread
pub trait ThreadState {
    /// Release every graphics resource; called exactly once when the thread exits
    fn teardown(&mut self);
}

type Job<S> = Box<dyn FnOnce(&mut S) + Send>;

/// Handle to a running compositor thread
pub struct CompositorThread<S> {
    name: String,
    sender: Mutex<Option<Sender<Job<S>>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    exited: Mutex<Option<Promise<()>>>,
}

impl<S: ThreadState + 'static> CompositorThread<S> {
    /// Start the thread and run `init` on it
    ///
    /// The returned promise resolves once `init` finished. If `init` fails
    /// the thread exits without entering its job loop.
    pub fn spawn<I>(
        name: &str,
        init: I,
    ) -> Result<(Self, Promise<Result<(), CompositorError>>), CompositorError>
    where
        I: FnOnce() -> Result<S, CompositorError> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel::<Job<S>>();
        let (ready_tx, ready_rx) = promise();
        let (exit_tx, exit_rx) = promise();
        let thread_name = name.to_string();

        let handle = thread::Builder::new()
            .name(format!("camswap-{}", name))
            .spawn(move || {
                debug!(name = %thread_name, "Compositor thread started");
                let mut state = match init() {
                    Ok(state) => {
                        ready_tx.complete(Ok(()));
                        state
                    }
                    Err(e) => {
                        ready_tx.complete(Err(e));
                        exit_tx.complete(());
                        return;
                    }
                };

                // Ends when every sender is dropped
                while let Ok(job) = receiver.recv() {
                    job(&mut state);
                }

                state.teardown();
                info!(name = %thread_name, "Compositor thread exiting");
                exit_tx.complete(());
            })
            .map_err(|e| CompositorError::ContextCreation(format!("thread spawn: {}", e)))?;

        Ok((
            Self {
                name: name.to_string(),
                sender: Mutex::new(Some(sender)),
                handle: Mutex::new(Some(handle)),
                exited: Mutex::new(Some(exit_rx)),
            },
            ready_rx,
        ))
    }

    /// Queue a job; `false` if the thread no longer accepts work
    pub fn post<F>(&self, job: F) -> bool
    where
        F: FnOnce(&mut S) + Send + 'static,
    {
        let Ok(sender) = self.sender.lock() else {
            return false;
        };
        match sender.as_ref() {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Run `job` on the thread and wait at most `timeout` for its result
    pub fn call<R, F>(&self, timeout: Duration, job: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut S) -> R + Send + 'static,
    {
        let (tx, rx) = promise();
        if !self.post(move |state| tx.complete(job(state))) {
            return None;
        }
        rx.wait(timeout)
    }

    /// Stop accepting work, let queued jobs finish, tear down and join
    ///
    /// Idempotent. Returns `false` if the thread did not exit within `timeout`;
    /// it is then detached and finishes on its own.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let exited = self.exited.lock().ok().and_then(|mut e| e.take());
        let Some(exited) = exited else {
            return true;
        };

        let finished = exited.wait(timeout).is_some();
        let handle = self.handle.lock().ok().and_then(|mut h| h.take());
        if finished {
            if let Some(handle) = handle
                && handle.join().is_err()
            {
                warn!(name = %self.name, "Compositor thread panicked");
            }
        } else {
            warn!(name = %self.name, ?timeout, "Compositor thread did not stop in time, detaching");
        }
        finished
    }
}

impl<S> Drop for CompositorThread<S> {
    fn drop(&mut self) {
        // Disconnecting lets the thread tear down even if shutdown was never called
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }
}
