//! Single-lane task queue
//!
//! Device transactions that mutate configuration must never interleave,
//! so they all run through one [`SerialQueue`]: tasks execute strictly
//! one at a time in submission order, and a task's result reaches only
//! its own submitter. The queue makes no attempt to guard against a
//! task that never completes: a stalled task stalls the lane, which is
//! the caller's responsibility to avoid.

use bisv_core::{BisvError, BisvResult};
use futures::future::BoxFuture;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};

pub(crate) struct SerialQueue {
    sender: mpsc::UnboundedSender<BoxFuture<'static, ()>>,
}

fn queue_terminated() -> BisvError {
    BisvError::InvalidState("task queue terminated".to_string())
}

impl SerialQueue {
    /// Create the queue and spawn its worker. Must be called from
    /// within a Tokio runtime.
    pub(crate) fn new() -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<BoxFuture<'static, ()>>();

        tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                task.await;
            }
        });

        Self { sender }
    }

    /// Submit a task and wait for its result.
    ///
    /// The task starts only after every previously submitted task has
    /// fully settled.
    pub(crate) async fn submit<T, F>(&self, task: F) -> BisvResult<T>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (result_sender, result_receiver) = oneshot::channel();

        let wrapped: BoxFuture<'static, ()> = Box::pin(async move {
            // the submitter may have given up waiting; that is fine
            let _ = result_sender.send(task.await);
        });

        self.sender.send(wrapped).map_err(|_| queue_terminated())?;
        result_receiver.await.map_err(|_| queue_terminated())
    }
}
