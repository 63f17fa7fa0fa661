//! Bounded concurrent execution with a bounded FIFO admission queue.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::domain::error::{TaskError, TaskWireError};
use crate::domain::message::Request;
use crate::port::middleware::{Middleware, Next};

/// Runs at most `max_concurrent` tasks at a time, queueing up to `max_queued`
/// more. Admission is decided synchronously: a task that fits neither bound
/// fails with [`TaskWireError::QueueFull`] before its factory ever runs.
///
/// Queued tasks start strictly in admission order as running tasks settle,
/// one wake per settle. Dropping a queued admission future removes it from
/// the queue; dropping a running one releases its slot.
#[derive(Clone)]
pub struct ConcurrencyPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    max_concurrent: usize,
    max_queued: usize,
    state: Mutex<PoolState>,
}

struct PoolState {
    in_flight: usize,
    queue: VecDeque<(u64, oneshot::Sender<()>)>,
    next_waiter: u64,
}

impl ConcurrencyPool {
    pub fn new(max_concurrent: usize, max_queued: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                max_concurrent,
                max_queued,
                state: Mutex::new(PoolState {
                    in_flight: 0,
                    queue: VecDeque::new(),
                    next_waiter: 0,
                }),
            }),
        }
    }

    /// Admit `factory` for execution. The factory is invoked once the task
    /// holds a slot; the returned future resolves to its output.
    pub fn run<F, Fut>(
        &self,
        factory: F,
    ) -> Result<impl Future<Output = Fut::Output> + Send, TaskWireError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
        Fut::Output: Send,
    {
        // Guards are taken at admission time, so an admission future that is
        // dropped before it ever runs still gives its slot back.
        let admission = {
            let mut state = self.inner.state.lock().unwrap();
            if state.in_flight < self.inner.max_concurrent {
                state.in_flight += 1;
                Admission::Immediate(SlotGuard {
                    inner: self.inner.clone(),
                })
            } else if state.queue.len() < self.inner.max_queued {
                let id = state.next_waiter;
                state.next_waiter += 1;
                let (wake_tx, wake_rx) = oneshot::channel();
                state.queue.push_back((id, wake_tx));
                Admission::Queued(
                    WaiterGuard {
                        inner: self.inner.clone(),
                        id: Some(id),
                    },
                    wake_rx,
                )
            } else {
                return Err(TaskWireError::QueueFull);
            }
        };

        let inner = self.inner.clone();
        Ok(async move {
            let _slot = match admission {
                Admission::Immediate(slot) => slot,
                Admission::Queued(mut waiting, wake_rx) => {
                    // The sender lives in the queue; it is dropped only after
                    // a successful slot transfer, so this cannot fail.
                    let _ = wake_rx.await;
                    waiting.id = None;
                    SlotGuard { inner }
                }
            };
            factory().await
        })
    }

    /// Tasks currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().unwrap().in_flight
    }

    /// Tasks waiting in the admission queue.
    pub fn queued(&self) -> usize {
        self.inner.state.lock().unwrap().queue.len()
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub fn max_queued(&self) -> usize {
        self.inner.max_queued
    }

    /// Wrap this pool as a dispatch middleware. Requests rejected at
    /// admission fail with a 503 `TaskError`.
    pub fn into_middleware(self) -> PoolMiddleware {
        PoolMiddleware { pool: self }
    }
}

enum Admission {
    Immediate(SlotGuard),
    Queued(WaiterGuard, oneshot::Receiver<()>),
}

/// Give a slot back and hand it to the oldest live waiter, if any.
fn release_slot(inner: &Arc<PoolInner>) {
    let mut state = inner.state.lock().unwrap();
    state.in_flight -= 1;
    while let Some((_, wake_tx)) = state.queue.pop_front() {
        if wake_tx.send(()).is_ok() {
            state.in_flight += 1;
            break;
        }
    }
}

struct SlotGuard {
    inner: Arc<PoolInner>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        release_slot(&self.inner);
    }
}

struct WaiterGuard {
    inner: Arc<PoolInner>,
    id: Option<u64>,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        let Some(id) = self.id else { return };
        let still_queued = {
            let mut state = self.inner.state.lock().unwrap();
            match state.queue.iter().position(|(queued, _)| *queued == id) {
                Some(index) => {
                    state.queue.remove(index);
                    true
                }
                None => false,
            }
        };
        // Woken but dropped before taking the slot: release it onward.
        if !still_queued {
            release_slot(&self.inner);
        }
    }
}

/// Middleware funneling every request through a [`ConcurrencyPool`].
pub struct PoolMiddleware {
    pool: ConcurrencyPool,
}

#[async_trait]
impl Middleware for PoolMiddleware {
    async fn handle(&self, request: Request, next: Next) -> Result<Value, TaskError> {
        match self.pool.run(move || next.run(request)) {
            Ok(admitted) => admitted.await,
            Err(_) => Err(TaskError::new("concurrency pool queue is full").with_code(503)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_up_to_max_concurrent_immediately() {
        let pool = ConcurrencyPool::new(2, 0);
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let first = pool
            .run(move || async move {
                gate_rx.await.ok();
                1
            })
            .unwrap();
        let second = pool.run(|| async { 2 }).unwrap();
        assert_eq!(pool.in_flight(), 2);

        let first = tokio::spawn(first);
        assert_eq!(second.await, 2);
        assert_eq!(pool.in_flight(), 1);

        gate_tx.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn rejects_when_queue_is_full() {
        let pool = ConcurrencyPool::new(1, 1);
        let (_gate_tx, gate_rx) = oneshot::channel::<()>();

        let running = pool
            .run(move || async move {
                gate_rx.await.ok();
            })
            .unwrap();
        let _running = tokio::spawn(running);

        let queued = pool.run(|| async {}).unwrap();
        assert_eq!(pool.queued(), 1);

        assert!(matches!(
            pool.run(|| async {}).map(|_| ()),
            Err(TaskWireError::QueueFull)
        ));
        drop(queued);
    }

    #[tokio::test]
    async fn queued_tasks_start_in_admission_order() {
        let pool = ConcurrencyPool::new(1, 4);
        let order = Arc::new(Mutex::new(Vec::new()));
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let holder = pool
            .run(move || async move {
                gate_rx.await.ok();
            })
            .unwrap();
        let holder = tokio::spawn(holder);

        let mut admitted = Vec::new();
        for name in ["a", "b", "c"] {
            let order = order.clone();
            let task = pool
                .run(move || async move {
                    order.lock().unwrap().push(name);
                })
                .unwrap();
            admitted.push(tokio::spawn(task));
        }
        assert_eq!(pool.queued(), 3);

        gate_tx.send(()).unwrap();
        holder.await.unwrap();
        for task in admitted {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn dropping_a_queued_task_frees_its_slot() {
        let pool = ConcurrencyPool::new(1, 1);
        let (_gate_tx, gate_rx) = oneshot::channel::<()>();

        let running = pool
            .run(move || async move {
                gate_rx.await.ok();
            })
            .unwrap();
        let _running = tokio::spawn(running);

        let queued = pool.run(|| async {}).unwrap();
        assert!(pool.run(|| async {}).is_err());

        drop(queued);
        assert_eq!(pool.queued(), 0);
        assert!(pool.run(|| async {}).is_ok());
    }

    #[tokio::test]
    async fn settle_admits_exactly_one_waiter() {
        let pool = ConcurrencyPool::new(1, 2);
        let (gate_tx, gate_rx) = oneshot::channel::<()>();

        let running = pool
            .run(move || async move {
                gate_rx.await.ok();
            })
            .unwrap();
        let running = tokio::spawn(running);

        let (slow_tx, slow_rx) = oneshot::channel::<()>();
        let first = pool
            .run(move || async move {
                slow_rx.await.ok();
            })
            .unwrap();
        let second = pool.run(|| async {}).unwrap();
        let first = tokio::spawn(first);
        let second = tokio::spawn(second);
        assert_eq!(pool.queued(), 2);

        gate_tx.send(()).unwrap();
        running.await.unwrap();

        // The freed slot went to the first waiter; the second is still queued.
        assert_eq!(pool.in_flight(), 1);
        assert_eq!(pool.queued(), 1);

        slow_tx.send(()).unwrap();
        first.await.unwrap();
        second.await.unwrap();
        assert_eq!(pool.in_flight(), 0);
        assert_eq!(pool.queued(), 0);
    }
}
