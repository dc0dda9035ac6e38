use crate::messages::{EngineMessage, EngineStatus};
use anyhow::{Context, Result};
use paper_trade_core::error::EngineError;
use paper_trade_core::events::EngineEvent;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Cloneable-enough entry point to a running scheduler: status queries,
/// event subscriptions, and graceful shutdown.
pub struct MonitorHandle {
    tx: mpsc::Sender<EngineMessage>,
    event_tx: broadcast::Sender<EngineEvent>,
    status_rx: watch::Receiver<EngineStatus>,
    actor: JoinHandle<Result<(), EngineError>>,
    pollers: Vec<JoinHandle<()>>,
}

impl MonitorHandle {
    pub(crate) fn new(
        tx: mpsc::Sender<EngineMessage>,
        event_tx: broadcast::Sender<EngineEvent>,
        status_rx: watch::Receiver<EngineStatus>,
        actor: JoinHandle<Result<(), EngineError>>,
        pollers: Vec<JoinHandle<()>>,
    ) -> Self {
        Self {
            tx,
            event_tx,
            status_rx,
            actor,
            pollers,
        }
    }

    /// Subscribes to the live event stream. Events mirror what the sink
    /// receives, in the same order.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// A watch receiver that always holds the latest engine status.
    #[must_use]
    pub fn status_stream(&self) -> watch::Receiver<EngineStatus> {
        self.status_rx.clone()
    }

    /// Requests a fresh status snapshot from the actor.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler has already stopped.
    pub async fn status(&self) -> Result<EngineStatus> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineMessage::GetStatus(reply_tx))
            .await
            .context("scheduler is not running")?;
        reply_rx.await.context("scheduler dropped the status request")
    }

    /// Graceful shutdown: stop accepting timer fires, let the in-flight
    /// cycle finish, flush final state to the sink, then join every task.
    ///
    /// # Errors
    ///
    /// Returns the engine's fatal error if it halted, or a join error if a
    /// task panicked.
    pub async fn shutdown(self) -> Result<()> {
        // The send fails when the actor already halted on a fatal error;
        // the join below surfaces that error.
        let _ = self.tx.send(EngineMessage::Shutdown).await;

        for poller in self.pollers {
            poller.await.context("poller task panicked")?;
        }
        self.actor.await.context("engine task panicked")??;
        Ok(())
    }
}
