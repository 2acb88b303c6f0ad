// (c) Cartesi and individual authors (see AUTHORS)
// SPDX-License-Identifier: Apache-2.0 (see LICENSE)

//! Background tasks that log contract events until shut down.

use std::fmt::Debug;
use std::pin::pin;

use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::Filter;
use alloy_primitives::Address;
use futures_util::{Stream, StreamExt, stream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::chain::ChainError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerSummary {
    pub listeners: usize,
    pub events: u64,
}

/// Owns the listener tasks. Dropping it stops them.
pub struct EventListeners {
    cancel: CancellationToken,
    handles: Vec<(String, JoinHandle<u64>)>,
}

impl Default for EventListeners {
    fn default() -> Self {
        Self::new()
    }
}

impl EventListeners {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Logs every item of `events` under `name` until the stream ends or the
    /// listeners are shut down.
    pub fn spawn<S>(&mut self, name: impl Into<String>, events: S)
    where
        S: Stream + Send + 'static,
        S::Item: Debug,
    {
        let name = name.into();
        let cancel = self.cancel.child_token();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            let mut events = pin!(events);
            let mut seen = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    next = events.next() => match next {
                        Some(event) => {
                            seen += 1;
                            info!(listener = %task_name, ?event, "contract event");
                        }
                        None => break,
                    },
                }
            }
            seen
        });
        self.handles.push((name, handle));
    }

    /// One polling log filter per `(name, address)`.
    pub async fn watch_contracts(
        &mut self,
        provider: &DynProvider,
        contracts: &[(String, Address)],
    ) -> Result<(), ChainError> {
        for (name, address) in contracts {
            let poller = provider
                .watch_logs(&Filter::new().address(*address))
                .await
                .map_err(|err| ChainError::Transport(err.to_string()))?;
            self.spawn(name.clone(), poller.into_stream().flat_map(stream::iter));
            info!(contract = %name, %address, "watching events");
        }
        Ok(())
    }

    /// Listeners whose task is still running.
    pub fn active(&self) -> usize {
        self.handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .count()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn shutdown(mut self) -> ListenerSummary {
        self.cancel.cancel();
        let handles = std::mem::take(&mut self.handles);
        let mut summary = ListenerSummary {
            listeners: handles.len(),
            events: 0,
        };
        for (name, handle) in handles {
            match handle.await {
                Ok(events) => summary.events += events,
                Err(err) => warn!(listener = %name, error = %err, "listener task failed"),
            }
        }
        info!(listeners = summary.listeners, events = summary.events, "listeners stopped");
        summary
    }
}

impl Drop for EventListeners {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
