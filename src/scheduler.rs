//! Deferred execution used to coalesce change notifications.
//!
//! Fields never call observers synchronously. They hand a [`Task`] to a
//! [`Scheduler`], which must run it after the current synchronous work and
//! before the next externally observable step.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use futures::executor::LocalSpawner;
use futures::task::LocalSpawnExt;

pub type Task = Box<dyn FnOnce() + 'static>;

pub trait Scheduler {
    fn schedule(&self, task: Task);
}

impl<S> Scheduler for Rc<S>
where
    S: Scheduler + ?Sized,
{
    fn schedule(&self, task: Task) {
        (**self).schedule(task)
    }
}

/// FIFO run-to-completion queue. Tasks queued while draining run in the same
/// drain.
#[derive(Default)]
pub struct TaskQueue {
    tasks: RefCell<VecDeque<Task>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }

    /// Runs the oldest task, returning `false` if the queue was empty.
    pub fn run_next(&self) -> bool {
        let task = self.tasks.borrow_mut().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks until the queue is empty and returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }
}

/// Spawns each task as a future on a `futures` `LocalPool`.
impl Scheduler for LocalSpawner {
    fn schedule(&self, task: Task) {
        if let Err(error) = self.spawn_local(async move { task() }) {
            tracing::warn!(%error, "local executor is shut down, dropping scheduled task");
        }
    }
}

thread_local! {
    static LOCAL_QUEUE: Rc<TaskQueue> = Rc::new(TaskQueue::new());
}

/// The queue fields use when no scheduler is configured.
pub fn local_queue() -> Rc<TaskQueue> {
    LOCAL_QUEUE.with(Rc::clone)
}

/// Drains [`local_queue`].
pub fn run_until_idle() -> usize {
    local_queue().run_until_idle()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;
    use std::cell::Cell;

    #[test]
    fn queue_runs_tasks_in_fifo_order() {
        let queue = TaskQueue::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for value in 0..3 {
            let log = log.clone();
            queue.schedule(Box::new(move || log.borrow_mut().push(value)));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn tasks_scheduled_while_draining_run_in_same_drain() {
        let queue = Rc::new(TaskQueue::new());
        let hits = Rc::new(Cell::new(0));
        let inner_queue = queue.clone();
        let inner_hits = hits.clone();
        queue.schedule(Box::new(move || {
            inner_hits.set(inner_hits.get() + 1);
            let hits = inner_hits.clone();
            inner_queue.schedule(Box::new(move || hits.set(hits.get() + 1)));
        }));
        assert_eq!(queue.run_until_idle(), 2);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn local_spawner_runs_tasks_when_pool_is_driven() {
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        spawner.schedule(Box::new(move || flag.set(true)));
        assert!(!hit.get());
        pool.run_until_stalled();
        assert!(hit.get());
    }
}
