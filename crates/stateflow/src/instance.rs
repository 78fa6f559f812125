//! # Instance Task
//!
//! Each live function instance is one tokio task consuming a bounded
//! mailbox. That single consumer is what serializes invocations per
//! instance: a frame for an instance can only be built by its own task, so
//! two frames for the same (typename, id) can never overlap, while
//! instances of other addresses progress freely on their own tasks.

use crate::address::Address;
use crate::bridge::HostBridge;
use crate::dispatcher::{DispatcherHandle, FunctionRegistration};
use crate::errors::RuntimeError;
use crate::frame::{deep_merge, FrameStatus, InvocationFrame};
use crate::shutdown::{ShutdownReceiver, ShutdownSignal, ShutdownType};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

/// One delivery pulled off an instance mailbox.
///
/// A populated `reply_tx` marks the invocation as the target of a request;
/// the instance task answers it exactly once, after commit.
pub(crate) struct Invocation {
    pub(crate) caller: Address,
    pub(crate) payload: Value,
    pub(crate) options: Value,
    pub(crate) reply_tx: Option<oneshot::Sender<Result<Value, RuntimeError>>>,
}

/// The execution loop of a single function instance.
pub(crate) struct InstanceRuntime {
    address: Address,
    registration: Arc<FunctionRegistration>,
    mailbox_rx: mpsc::Receiver<Invocation>,
    dispatcher: DispatcherHandle,
}

impl InstanceRuntime {
    pub(crate) fn new(
        address: Address,
        registration: Arc<FunctionRegistration>,
        mailbox_rx: mpsc::Receiver<Invocation>,
        dispatcher: DispatcherHandle,
    ) -> Self {
        Self {
            address,
            registration,
            mailbox_rx,
            dispatcher,
        }
    }

    pub(crate) async fn run(mut self, mut shutdown: ShutdownReceiver) {
        loop {
            tokio::select! {
                maybe_invocation = self.mailbox_rx.recv() => match maybe_invocation {
                    Some(invocation) => self.handle_invocation(invocation).await,
                    None => break,
                },
                signal = &mut shutdown.receiver => {
                    let signal = signal.unwrap_or(ShutdownSignal {
                        shutdown_type: ShutdownType::Graceful,
                        sender: None,
                    });
                    if let ShutdownType::Graceful = signal.shutdown_type {
                        // Close first so queued invocations drain, then stop.
                        self.mailbox_rx.close();
                        while let Some(invocation) = self.mailbox_rx.recv().await {
                            self.handle_invocation(invocation).await;
                        }
                    }
                    if let Some(ack) = signal.sender {
                        let _ = ack.send(());
                    }
                    break;
                }
            }
        }
        debug!(instance = %self.address, "instance task exited");
    }

    /// Run one invocation to completion: load contexts, execute the script
    /// against a fresh frame, commit mutations, answer the requester.
    async fn handle_invocation(&self, invocation: Invocation) {
        let Invocation {
            caller,
            payload,
            options,
            reply_tx,
        } = invocation;

        let store = self.dispatcher.store();
        let contexts = match store.load(&self.address).await {
            Ok(contexts) => contexts,
            Err(e) => {
                error!(instance = %self.address, "context load failed: {}", e);
                if let Some(tx) = reply_tx {
                    let _ = tx.send(Err(RuntimeError::TargetError {
                        target: self.address.clone(),
                        reason: format!("context load failed: {}", e),
                    }));
                }
                return;
            }
        };

        // Typename defaults sit under the incoming options, message wins.
        let mut merged_options = self.registration.config.options.clone();
        deep_merge(&mut merged_options, &options);

        let is_request = reply_tx.is_some();
        let mut frame = InvocationFrame::new(
            caller,
            self.address.clone(),
            payload,
            merged_options,
            contexts,
            is_request,
        );

        let run_result = {
            let mut bridge = HostBridge::new(&mut frame, self.dispatcher.clone());
            self.registration.executor.run(&mut bridge).await
        };

        match run_result {
            Ok(()) => {
                if let Some(pair) = frame.commit_contexts() {
                    if let Err(e) = store.commit(&self.address, pair).await {
                        frame.set_status(FrameStatus::HostError);
                        error!(instance = %self.address, "context commit failed: {}", e);
                        if let Some(tx) = reply_tx {
                            let _ = tx.send(Err(RuntimeError::ContextPersistFailed(
                                self.address.clone(),
                                e.to_string(),
                            )));
                        }
                        return;
                    }
                }
                frame.set_status(FrameStatus::Ok);
                if let Some(tx) = reply_tx {
                    let _ = tx.send(Ok(frame.take_reply_data()));
                }
                debug!(
                    instance = %self.address,
                    invocation = %frame.invocation_id(),
                    actions = frame.actions().len(),
                    "invocation completed"
                );
            }
            Err(fault) => {
                // No commit, no reply data. Signals already dispatched by
                // this frame stay dispatched; sent messages cannot be
                // recalled.
                frame.set_status(FrameStatus::ScriptError);
                warn!(instance = %self.address, "script fault: {}", fault);
                if let Some(tx) = reply_tx {
                    let _ = tx.send(Err(RuntimeError::ScriptFault(
                        self.address.clone(),
                        fault.message.clone(),
                    )));
                }
            }
        }
    }
}
