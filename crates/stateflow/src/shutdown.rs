use std::time::Duration;
use tokio::sync::oneshot::{Receiver, Sender};
use tracing::debug;

/// Default time allowed for instance tasks to drain before a forced stop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// A signal telling an instance task to stop consuming its mailbox.
#[derive(Debug)]
pub struct ShutdownSignal {
    pub shutdown_type: ShutdownType,
    pub sender: Option<Sender<()>>,
}

#[derive(Debug, Clone, Copy)]
pub enum ShutdownType {
    /// Finish the in-flight frame, drain the mailbox, then exit.
    Graceful,
    /// Exit as soon as the in-flight frame completes, dropping the queue.
    Force,
}

/// Broadcasts shutdown signals to every live instance task.
pub struct ShutdownController {
    subscribers: Vec<Sender<ShutdownSignal>>,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }

    /// Register a new instance task with the controller.
    pub fn subscribe(&mut self) -> ShutdownReceiver {
        let (sender, receiver) = tokio::sync::oneshot::channel();
        self.subscribers.push(sender);
        ShutdownReceiver { receiver }
    }

    /// Signal every subscriber and wait for each to acknowledge.
    pub async fn signal_shutdown(self, shutdown_type: ShutdownType) {
        debug!("signaling shutdown to {} instance tasks", self.subscribers.len());
        let mut acks = Vec::new();
        for sender in self.subscribers {
            let (responder, ack) = tokio::sync::oneshot::channel();
            acks.push(ack);
            if sender
                .send(ShutdownSignal {
                    shutdown_type,
                    sender: Some(responder),
                })
                .is_err()
            {
                // Task already exited; nothing to wait for.
                continue;
            }
        }

        for ack in acks {
            if let Err(e) = ack.await {
                debug!("instance task exited before acknowledging shutdown: {:?}", e);
            }
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving side held by each instance task.
pub struct ShutdownReceiver {
    pub receiver: Receiver<ShutdownSignal>,
}
