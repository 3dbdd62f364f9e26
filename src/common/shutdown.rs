//! One-shot termination signal shared between a controller and its tasks.

use std::future::Future;

use tokio::sync::watch;

/// A latch that flips once from running to terminated.
///
/// Any number of tasks may wait on it; waiters created after the flip
/// complete immediately.
#[derive(Debug)]
pub struct Shutdown {
    sender: watch::Sender<bool>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender,
        }
    }

    /// Signals termination. Idempotent.
    pub fn shutdown(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_terminated(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once [`Shutdown::shutdown`] has been called.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async move {
            // the sender lives as long as `self`; a closed channel also ends the wait
            let _ = receiver.wait_for(|terminated| *terminated).await;
        }
    }
}
