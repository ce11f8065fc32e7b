//! Registry of the background tasks spawned for one request.

use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::task::JoinSet;

/// Owns the tasks of a request so cancellation can abort them together.
///
/// After [`TaskRegistry::shutdown`] every spawn attempt is refused and the
/// future is dropped without running.
pub struct TaskRegistry {
    tasks: Mutex<Option<JoinSet<()>>>,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    /// Empty registry accepting new tasks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Some(JoinSet::new())),
        }
    }

    /// Spawn `task` on the current runtime. Returns `false` after shutdown.
    pub fn spawn<F>(&self, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut guard = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tasks) = guard.as_mut() else {
            return false;
        };
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
        true
    }

    /// Abort every registered task and refuse new ones.
    pub fn shutdown(&self) {
        let tasks = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut tasks) = tasks {
            tasks.abort_all();
            tasks.detach_all();
        }
    }

    /// Number of tasks still tracked (finished tasks are reaped lazily).
    pub fn len(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, JoinSet::len)
    }

    /// Whether no tasks are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`TaskRegistry::shutdown`] has run.
    pub fn is_shut_down(&self) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct SetOnDrop(Arc<AtomicBool>);

    impl Drop for SetOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn shutdown_aborts_running_tasks() {
        let registry = TaskRegistry::new();
        let dropped = Arc::new(AtomicBool::new(false));
        let marker = SetOnDrop(Arc::clone(&dropped));
        assert!(registry.spawn(async move {
            let _marker = marker;
            std::future::pending::<()>().await;
        }));
        assert_eq!(registry.len(), 1);

        registry.shutdown();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dropped.load(Ordering::SeqCst));
        assert!(registry.is_shut_down());
    }

    #[tokio::test]
    async fn spawn_after_shutdown_is_refused() {
        let registry = TaskRegistry::new();
        registry.shutdown();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        assert!(!registry.spawn(async move {
            flag.store(true, Ordering::SeqCst);
        }));
        tokio::task::yield_now().await;
        assert!(!ran.load(Ordering::SeqCst));
        assert!(registry.is_empty());
    }
}
