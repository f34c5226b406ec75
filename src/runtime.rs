use futures::FutureExt;
use once_cell::sync::Lazy;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::time::timeout;
use tokio_util::task::TaskTracker;
use tracing::Instrument;

static TOKIO_RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("tokio-chart-watch")
        .enable_all()
        .build()
        .expect("cannot build tokio runtime")
});

pub fn block_on<F: Future>(future: F) -> F::Output {
    TOKIO_RUNTIME.block_on(future)
}

pub fn handle() -> Handle {
    TOKIO_RUNTIME.handle().clone()
}

/// Runs fire and forget tasks.
///
/// Nothing a task does, panicking included, reaches the code that spawned it. Tasks still
/// running when the supervisor shuts down past its grace period are abandoned.
pub struct TaskSupervisor {
    handle: Handle,
    tracker: TaskTracker,
}

impl TaskSupervisor {
    pub fn new(handle: Handle) -> TaskSupervisor {
        TaskSupervisor {
            handle,
            tracker: TaskTracker::new(),
        }
    }

    pub fn spawn_detached<F>(&self, name: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let span = info_span!("detached_task", task = name);
        let name = name.to_string();

        self.tracker.spawn_on(
            async move {
                if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
                    error!("Detached task '{}' panicked: {}", name, panic_message(panic.as_ref()));
                }
            }
            .instrument(span),
            &self.handle,
        );
    }

    /// Number of tasks not finished yet.
    pub fn running(&self) -> usize {
        self.tracker.len()
    }

    /// Stops accepting tasks and waits up to `grace` for running ones.
    /// Returns whether every task finished in time.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();

        match timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "{} detached task(s) still running after {:?}, abandoning them.",
                    self.tracker.len(),
                    grace
                );
                false
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn test_panicking_task_is_contained() {
        // setup:
        let supervisor = TaskSupervisor::new(Handle::current());
        let done = Arc::new(AtomicUsize::new(0));
        let done_clone = done.clone();

        // execute:
        supervisor.spawn_detached("boom", async {
            panic!("index exploded");
        });
        supervisor.spawn_detached("fine", async move {
            done_clone.fetch_add(1, Ordering::SeqCst);
        });
        let all_finished = supervisor.shutdown(Duration::from_secs(5)).await;

        // verify:
        assert!(all_finished);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.running(), 0);
        assert!(logs_contain("Detached task 'boom' panicked: index exploded"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_shutdown_abandons_slow_tasks_after_grace() {
        // setup:
        let supervisor = TaskSupervisor::new(Handle::current());
        supervisor.spawn_detached("slow", tokio::time::sleep(Duration::from_secs(60)));

        // execute:
        let all_finished = supervisor.shutdown(Duration::from_millis(50)).await;

        // verify:
        assert!(!all_finished);
        assert_eq!(supervisor.running(), 1);
        assert!(logs_contain("still running after"));
    }

    #[test]
    fn test_block_on_shared_runtime() {
        let supervisor = TaskSupervisor::new(handle());
        supervisor.spawn_detached("sleepy", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });

        assert!(block_on(supervisor.shutdown(Duration::from_secs(5))));
    }
}
