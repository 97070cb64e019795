use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::{EventQueue, QueueError, QueueReceiver};

/// An in-process queue, used when running without redis and in tests.
#[derive(Clone, Default)]
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    messages: Mutex<VecDeque<String>>,
    available: Notify,
    unavailable: AtomicBool,
}

impl Inner {
    fn lock_messages(&self) -> MutexGuard<'_, VecDeque<String>> {
        match self.messages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting to be popped.
    pub fn depth(&self) -> usize {
        self.inner.lock_messages().len()
    }

    /// Snapshot of the waiting messages, head first.
    pub fn messages(&self) -> Vec<String> {
        self.inner.lock_messages().iter().cloned().collect()
    }

    /// Make every push and pop fail, to simulate losing the queue.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.inner.unavailable.load(Ordering::SeqCst) {
            Err(QueueError::Unavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn push(&self, messages: Vec<String>) -> Result<(), QueueError> {
        self.check_available()?;

        let pushed = messages.len();
        self.inner.lock_messages().extend(messages);
        for _ in 0..pushed {
            self.inner.available.notify_one();
        }

        Ok(())
    }

    async fn receiver(&self) -> Result<Box<dyn QueueReceiver>, QueueError> {
        self.check_available()?;

        Ok(Box::new(MemoryReceiver {
            queue: self.clone(),
        }))
    }
}

struct MemoryReceiver {
    queue: MemoryQueue,
}

#[async_trait]
impl QueueReceiver for MemoryReceiver {
    async fn pop(&mut self, timeout: Duration) -> Result<Option<String>, QueueError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            self.queue.check_available()?;

            // Register interest before looking, so a push between the check and the wait
            // still wakes us up.
            let notified = self.queue.inner.available.notified();
            if let Some(message) = self.queue.inner.lock_messages().pop_front() {
                return Ok(Some(message));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn pops_in_push_order() {
        let queue = MemoryQueue::new();
        let mut receiver = queue.receiver().await.unwrap();

        queue.push(messages(&["a", "b"])).await.unwrap();
        queue.push(messages(&["c"])).await.unwrap();
        assert_eq!(queue.depth(), 3);

        for expected in ["a", "b", "c"] {
            let popped = receiver.pop(Duration::from_millis(10)).await.unwrap();
            assert_eq!(popped.as_deref(), Some(expected));
        }
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn pop_times_out_on_empty_queue() {
        let queue = MemoryQueue::new();
        let mut receiver = queue.receiver().await.unwrap();

        let popped = receiver.pop(Duration::from_millis(20)).await.unwrap();
        assert_eq!(popped, None);
    }

    #[tokio::test]
    async fn waiting_pop_wakes_up_on_push() {
        let queue = MemoryQueue::new();
        let mut receiver = queue.receiver().await.unwrap();

        let waiter = tokio::spawn(async move { receiver.pop(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push(messages(&["late"])).await.unwrap();

        let popped = waiter.await.unwrap().unwrap();
        assert_eq!(popped.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn each_message_is_popped_once() {
        let queue = MemoryQueue::new();
        let values: Vec<String> = (0..100).map(|i| i.to_string()).collect();
        queue.push(values.clone()).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let mut receiver = queue.receiver().await.unwrap();
            tasks.push(tokio::spawn(async move {
                let mut popped = Vec::new();
                while let Some(message) = receiver.pop(Duration::from_millis(20)).await.unwrap() {
                    popped.push(message);
                }
                popped
            }));
        }

        let mut popped = Vec::new();
        for task in tasks {
            popped.extend(task.await.unwrap());
        }
        popped.sort_by_key(|message| message.parse::<u32>().unwrap());
        assert_eq!(popped, values);
    }

    #[tokio::test]
    async fn unavailable_queue_rejects_push() {
        let queue = MemoryQueue::new();
        queue.set_unavailable(true);

        let result = queue.push(messages(&["a"])).await;
        assert!(matches!(result, Err(QueueError::Unavailable)));
        assert_eq!(queue.depth(), 0);

        queue.set_unavailable(false);
        queue.push(messages(&["a"])).await.unwrap();
        assert_eq!(queue.messages(), messages(&["a"]));
    }
}
