// SPDX-License-Identifier: MPL-2.0

//! Short-lived background work: deferred photo injection and settings watching
//!
//! Interception entry points are synchronous host calls, so deferred work is
//! handed to a tokio runtime. Inside an existing runtime its handle is reused;
//! otherwise a small multi-threaded runtime is created and owned here.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct TaskRunner {
    handle: Handle,
    // `None` when borrowing an ambient runtime
    runtime: Option<Runtime>,
}

impl TaskRunner {
    pub fn new() -> std::io::Result<Self> {
        if let Ok(handle) = Handle::try_current() {
            debug!("Task runner using ambient tokio runtime");
            return Ok(Self {
                handle,
                runtime: None,
            });
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("camswap-tasks")
            .enable_all()
            .build()?;
        debug!("Task runner created its own tokio runtime");
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
        })
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    /// Run blocking `job` on the blocking pool after `delay`
    pub fn run_after<F>(&self, delay: Duration, name: &'static str, job: F) -> JoinHandle<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = tokio::task::spawn_blocking(job).await {
                warn!(task = name, error = %e, "Deferred task panicked");
            }
        })
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        // Dropping a runtime from inside async context panics
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_run_after_waits_for_delay() {
        let runner = TaskRunner::new().unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let started = std::time::Instant::now();
        let task = runner.run_after(Duration::from_millis(50), "test", move || {
            flag.store(true, Ordering::SeqCst);
        });
        runner.handle().block_on(task).unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_reuses_ambient_runtime() {
        let runner = TaskRunner::new().unwrap();
        let value = runner.spawn(async { 7 }).await.unwrap();
        assert_eq!(value, 7);
    }
}
