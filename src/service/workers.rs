//! Long-lived worker threads owned by the service.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, warn};

/// Cancellation signal handed to a worker.
#[derive(Clone)]
pub(crate) struct CancelToken {
    cancelled: Arc<AtomicBool>,
    /// Disconnects when the worker is cancelled.
    shutdown: Receiver<()>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sleep for `duration`. Returns false if cancelled first.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        match self.shutdown.recv_timeout(duration) {
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => !self.is_cancelled(),
            _ => false,
        }
    }

    /// Drain `stream`, calling `handle` per item, until the stream
    /// disconnects or the worker is cancelled. Cancellation is checked
    /// before every item.
    pub fn for_each<T, F>(&self, stream: Receiver<T>, mut handle: F)
    where
        F: FnMut(T) -> bool,
    {
        loop {
            if self.is_cancelled() {
                return;
            }
            select! {
                recv(stream) -> msg => match msg {
                    Ok(item) => {
                        if self.is_cancelled() || !handle(item) {
                            return;
                        }
                    }
                    Err(_) => return,
                },
                recv(self.shutdown) -> _ => return,
            }
        }
    }
}

/// A named worker thread with its cancellation handle.
pub(crate) struct Worker {
    name: &'static str,
    cancelled: Arc<AtomicBool>,
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn<F>(name: &'static str, body: F) -> io::Result<Self>
    where
        F: FnOnce(CancelToken) + Send + 'static,
    {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (shutdown_tx, shutdown_rx) = bounded(0);
        let token = CancelToken {
            cancelled: Arc::clone(&cancelled),
            shutdown: shutdown_rx,
        };

        let handle = thread::Builder::new()
            .name(format!("paywall-{}", name))
            .spawn(move || body(token))?;

        debug!(worker = name, "worker started");

        Ok(Self {
            name,
            cancelled,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Signal the worker to stop at its next check.
    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.shutdown.take();
    }

    /// Cancel and wait for the thread to exit. A worker never joins itself.
    pub fn stop(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(worker = self.name, "worker panicked");
            } else {
                debug!(worker = self.name, "worker stopped");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_stop_interrupts_blocked_stream() {
        let (_tx, rx) = bounded::<u32>(1);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_worker = Arc::clone(&seen);

        let worker = Worker::spawn("test", move |token| {
            token.for_each(rx, |_| {
                seen_in_worker.fetch_add(1, Ordering::SeqCst);
                true
            });
        })
        .unwrap();

        worker.stop();
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_for_each_until_disconnect() {
        let (tx, rx) = bounded::<u32>(4);
        let (done_tx, done_rx) = bounded(1);

        let worker = Worker::spawn("test", move |token| {
            let mut total = 0;
            token.for_each(rx, |n| {
                total += n;
                true
            });
            let _ = done_tx.send(total);
        })
        .unwrap();

        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);

        assert_eq!(done_rx.recv_timeout(Duration::from_secs(1)).unwrap(), 3);
        worker.stop();
    }

    #[test]
    fn test_sleep_cancelled() {
        let (done_tx, done_rx) = bounded(1);
        let worker = Worker::spawn("test", move |token| {
            let completed = token.sleep(Duration::from_secs(30));
            let _ = done_tx.send(completed);
        })
        .unwrap();

        worker.stop();
        assert!(!done_rx.recv_timeout(Duration::from_secs(1)).unwrap());
    }
}
