//! Single-writer event queue in front of a [`RelayEngine`].
//!
//! Every read-then-write sequence in the engine assumes no other event for
//! the same source chat runs concurrently. The dispatcher owns the engine on
//! one blocking worker and feeds it events from an mpsc queue, so events are
//! handled strictly one after another no matter how many tasks submit them.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use relay_store::LinkStore;

use crate::engine::RelayEngine;
use crate::event::{InboundEvent, Outcome};
use crate::gateway::ChatGateway;

/// Errors from submitting events to the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is shut down")]
    Closed,

    #[error("dispatcher worker panicked: {0}")]
    Worker(String),
}

type Job<S, G> = Box<dyn FnOnce(&mut RelayEngine<S, G>) + Send>;

/// Handle to a running dispatcher. Cheap to share behind an `Arc`.
pub struct RelayDispatcher<S, G> {
    queue: mpsc::Sender<Job<S, G>>,
    worker: JoinHandle<RelayEngine<S, G>>,
}

impl<S, G> RelayDispatcher<S, G>
where
    S: LinkStore + Send + 'static,
    G: ChatGateway + Send + 'static,
{
    /// Move `engine` onto a blocking worker with a queue of `capacity` events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(engine: RelayEngine<S, G>, capacity: usize) -> Self {
        let (queue, mut jobs) = mpsc::channel::<Job<S, G>>(capacity.max(1));
        let worker = tokio::task::spawn_blocking(move || {
            let mut engine = engine;
            while let Some(job) = jobs.blocking_recv() {
                job(&mut engine);
            }
            engine
        });
        Self { queue, worker }
    }

    /// Queue an event and wait for its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the worker has stopped.
    pub async fn dispatch(&self, event: InboundEvent) -> Result<Outcome, DispatchError> {
        self.dispatch_with(event, |_, outcome| outcome).await
    }

    /// Queue an event, then run `finish` on the engine with its outcome
    /// before the next event is handled.
    ///
    /// Hosts use this to collect per-event state from the gateway, such as
    /// the deliveries the event produced.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Closed`] if the worker has stopped.
    pub async fn dispatch_with<R, F>(
        &self,
        event: InboundEvent,
        finish: F,
    ) -> Result<R, DispatchError>
    where
        R: Send + 'static,
        F: FnOnce(&mut RelayEngine<S, G>, Outcome) -> R + Send + 'static,
    {
        let (reply, result) = oneshot::channel();
        let job: Job<S, G> = Box::new(move |engine| {
            let outcome = engine.handle(event);
            if reply.send(finish(engine, outcome)).is_err() {
                debug!("caller stopped waiting for outcome");
            }
        });
        self.queue
            .send(job)
            .await
            .map_err(|_| DispatchError::Closed)?;
        result.await.map_err(|_| DispatchError::Closed)
    }

    /// Stop accepting events, drain the queue, and hand back the engine.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Worker`] if the worker panicked.
    pub async fn shutdown(self) -> Result<RelayEngine<S, G>, DispatchError> {
        drop(self.queue);
        self.worker
            .await
            .map_err(|e| DispatchError::Worker(e.to_string()))
    }
}
