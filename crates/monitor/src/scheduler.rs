use crate::handle::MonitorHandle;
use crate::messages::{EngineMessage, EngineState, EngineStatus};
use chrono::{DateTime, Utc};
use paper_trade_core::domain::{ExitReason, Portfolio, PriceTick, StrategyVersion};
use paper_trade_core::error::EngineError;
use paper_trade_core::events::EngineEvent;
use paper_trade_core::position::PositionManager;
use paper_trade_core::traits::{EventSink, MarketData};
use paper_trade_core::{AppConfig, Candle};
use paper_trade_strategy::{
    IndicatorCalculator, RiskManager, SignalDetector, TrailingStopController,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

const MAILBOX_CAPACITY: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Drives the engine from two independent time bases: a slow candle-close
/// check and a fast live-price check. Each cadence is its own tokio task
/// that only fetches; all state mutation happens in the engine actor,
/// which drains one bounded mailbox.
pub struct MonitoringScheduler;

impl MonitoringScheduler {
    /// Spawns the engine actor and both poller tasks. The returned handle
    /// is the only way to observe or stop them.
    #[must_use]
    pub fn spawn(
        config: &AppConfig,
        market_data: Arc<dyn MarketData>,
        sink: Box<dyn EventSink>,
    ) -> MonitorHandle {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (status_tx, status_rx) =
            watch::channel(EngineStatus::initial(Portfolio::new(config.risk.initial_capital)));

        let actor = EngineActor::new(config, rx, sink, event_tx.clone(), status_tx, shutdown_tx);
        let actor_task = tokio::spawn(actor.run());

        let fetch_timeout = Duration::from_secs(config.monitor.fetch_timeout_secs);
        let candle_task = spawn_candle_poller(
            tx.clone(),
            Arc::clone(&market_data),
            Duration::from_secs(config.monitor.candle_check_interval_secs),
            fetch_timeout,
            config.exchange.candle_history,
            shutdown_rx.clone(),
        );
        let price_task = spawn_price_poller(
            tx.clone(),
            market_data,
            Duration::from_secs(config.monitor.price_check_interval_secs),
            fetch_timeout,
            shutdown_rx,
        );

        MonitorHandle::new(tx, event_tx, status_rx, actor_task, vec![candle_task, price_task])
    }
}

/// Candle cadence: fetch history on a fixed interval, forward the result.
/// A failed or timed-out fetch becomes `FetchFailed` — the poller never
/// touches trading state.
fn spawn_candle_poller(
    tx: mpsc::Sender<EngineMessage>,
    market_data: Arc<dyn MarketData>,
    interval: Duration,
    fetch_timeout: Duration,
    candle_history: usize,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let message =
                        match tokio::time::timeout(fetch_timeout, market_data.fetch_candles(candle_history)).await {
                            Ok(Ok(candles)) => EngineMessage::Candles(candles),
                            Ok(Err(error)) => EngineMessage::FetchFailed { context: "candle", error },
                            Err(_) => EngineMessage::FetchFailed {
                                context: "candle",
                                error: EngineError::Data(format!(
                                    "candle fetch timed out after {fetch_timeout:?}"
                                )),
                            },
                        };
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Price cadence: fetch the live ticker on a fast interval.
fn spawn_price_poller(
    tx: mpsc::Sender<EngineMessage>,
    market_data: Arc<dyn MarketData>,
    interval: Duration,
    fetch_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let message =
                        match tokio::time::timeout(fetch_timeout, market_data.fetch_live_price()).await {
                            Ok(Ok(tick)) => EngineMessage::PriceTick(tick),
                            Ok(Err(error)) => EngineMessage::FetchFailed { context: "live-price", error },
                            Err(_) => EngineMessage::FetchFailed {
                                context: "live-price",
                                error: EngineError::Data(format!(
                                    "live-price fetch timed out after {fetch_timeout:?}"
                                )),
                            },
                        };
                    if tx.send(message).await.is_err() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Owns all trading state. Messages are processed strictly one at a time;
/// a candle-driven trail/close and a live-price check can never interleave.
struct EngineActor {
    rx: mpsc::Receiver<EngineMessage>,
    sink: Box<dyn EventSink>,
    event_tx: broadcast::Sender<EngineEvent>,
    status_tx: watch::Sender<EngineStatus>,
    shutdown_tx: watch::Sender<bool>,

    positions: PositionManager,
    detector: SignalDetector,
    trailing: TrailingStopController,
    risk: RiskManager,
    indicators: IndicatorCalculator,
    strategy_version: StrategyVersion,

    last_candle_time: Option<DateTime<Utc>>,
    state: EngineState,
}

impl EngineActor {
    fn new(
        config: &AppConfig,
        rx: mpsc::Receiver<EngineMessage>,
        sink: Box<dyn EventSink>,
        event_tx: broadcast::Sender<EngineEvent>,
        status_tx: watch::Sender<EngineStatus>,
        shutdown_tx: watch::Sender<bool>,
    ) -> Self {
        Self {
            rx,
            sink,
            event_tx,
            status_tx,
            shutdown_tx,
            positions: PositionManager::new(config.risk.initial_capital),
            detector: SignalDetector::from_config(&config.strategy),
            trailing: TrailingStopController::new(config.strategy.strategy_version),
            risk: RiskManager::from_config(&config.risk),
            indicators: IndicatorCalculator::from_config(&config.strategy),
            strategy_version: config.strategy.strategy_version,
            last_candle_time: None,
            state: EngineState::Running,
        }
    }

    async fn run(mut self) -> Result<(), EngineError> {
        tracing::info!("monitoring scheduler started");

        while let Some(message) = self.rx.recv().await {
            let result = match message {
                EngineMessage::Candles(candles) => self.on_candles(candles).await,
                EngineMessage::PriceTick(tick) => self.on_price_tick(tick).await,
                EngineMessage::FetchFailed { context, error } => {
                    self.on_fetch_failed(context, &error).await
                }
                EngineMessage::GetStatus(reply) => {
                    let _ = reply.send(self.status());
                    Ok(())
                }
                EngineMessage::Shutdown => break,
            };

            match result {
                Ok(()) => {}
                Err(error) if error.is_fatal() => {
                    tracing::error!("fatal engine error, halting scheduler: {error}");
                    self.state = EngineState::Halted;
                    self.rx.close();
                    let _ = self.shutdown_tx.send(true);
                    let _ = self.sink.flush().await;
                    self.publish_status();
                    return Err(error);
                }
                Err(error) => {
                    tracing::warn!("cycle skipped: {error}");
                }
            }
            self.publish_status();
        }

        self.finish().await
    }

    /// Graceful shutdown: stop the pollers, flush final state to the sink.
    async fn finish(&mut self) -> Result<(), EngineError> {
        // Closing the mailbox wakes any poller blocked on a full channel.
        self.rx.close();
        let _ = self.shutdown_tx.send(true);

        let portfolio = self.positions.portfolio().clone();
        if let Err(error) = self
            .emit(EngineEvent::PortfolioUpdate {
                portfolio,
                timestamp: Utc::now(),
            })
            .await
        {
            tracing::warn!("final portfolio update not recorded: {error}");
        }
        self.sink.flush().await?;

        self.state = EngineState::Stopped;
        self.publish_status();
        tracing::info!("monitoring scheduler stopped");
        Ok(())
    }

    /// Candle cycle: indicators → trailing/exit for an open position, or
    /// guard + signal detection when flat. Keyed on the newest closed
    /// candle so re-delivery of the same history is a no-op.
    async fn on_candles(&mut self, mut candles: Vec<Candle>) -> Result<(), EngineError> {
        // The newest candle is still forming; act on closed candles only.
        candles.pop();
        let Some(latest_time) = candles.last().map(|c| c.open_time) else {
            return Err(EngineError::Validation(
                "candle fetch returned no closed candles".to_string(),
            ));
        };
        if self.last_candle_time.is_some_and(|seen| latest_time <= seen) {
            tracing::debug!(%latest_time, "no new closed candle");
            return Ok(());
        }
        if candles.len() < self.indicators.min_history() {
            return Err(EngineError::Validation(format!(
                "insufficient candle history: {} closed candles, need {}",
                candles.len(),
                self.indicators.min_history()
            )));
        }

        let snapshots = self.indicators.compute(&candles);
        let current = snapshots[snapshots.len() - 1];
        let prior = snapshots[snapshots.len() - 2];
        let latest = &candles[candles.len() - 1];

        if self.positions.is_flat() {
            self.try_enter(&prior, &current, latest).await?;
        } else {
            self.trail_and_check_exit(&current, latest).await?;
        }

        self.last_candle_time = Some(latest_time);
        Ok(())
    }

    async fn try_enter(
        &mut self,
        prior: &paper_trade_core::IndicatorSnapshot,
        current: &paper_trade_core::IndicatorSnapshot,
        candle: &Candle,
    ) -> Result<(), EngineError> {
        match self.risk.entry_allowed(candle.open_time) {
            Ok(()) => {}
            Err(error @ EngineError::GuardTripped(_)) => {
                tracing::warn!("{error}; new entries disabled until the next trading day");
                return Ok(());
            }
            Err(error) => return Err(error),
        }

        let cash_balance = self.positions.portfolio().cash_balance;
        match self
            .detector
            .evaluate(prior, current, candle, &self.risk, cash_balance)
        {
            Ok(Some(signal)) => {
                self.emit(EngineEvent::SignalDetected(signal.clone())).await?;
                let position = self
                    .positions
                    .open(&signal, self.strategy_version, candle.open_time)?
                    .clone();
                tracing::info!(
                    side = ?position.side,
                    entry = %position.entry_price,
                    stop = %position.stop_loss,
                    target = %position.take_profit,
                    quantity = %position.quantity,
                    "position opened"
                );
                self.emit(EngineEvent::PositionOpened(position)).await?;
            }
            Ok(None) => {}
            Err(error @ EngineError::Validation(_)) => {
                tracing::warn!("signal discarded: {error}");
            }
            Err(error) => return Err(error),
        }
        Ok(())
    }

    async fn trail_and_check_exit(
        &mut self,
        current: &paper_trade_core::IndicatorSnapshot,
        candle: &Candle,
    ) -> Result<(), EngineError> {
        let (side, old_stop) = match self.positions.position() {
            Some(position) => (position.side, position.stop_loss),
            None => return Ok(()),
        };

        let proposed = self
            .trailing
            .proposed_stop(side, old_stop, current.ema_short, current.ema_long);
        if let Some((old, new)) = self.positions.trail_stop(proposed)? {
            tracing::info!(%old, %new, "trailing stop moved");
            self.emit(EngineEvent::StopTrailed {
                side,
                old_stop: old,
                new_stop: new,
                timestamp: candle.open_time,
            })
            .await?;
        }

        if let Some((exit_price, reason)) = self.positions.exit_on_candle(candle) {
            self.close_position(exit_price, candle.open_time, reason).await?;
        }
        Ok(())
    }

    /// Live-price cycle: mark-to-market and stop/target check only. The
    /// trailing stop is never touched here.
    async fn on_price_tick(&mut self, tick: PriceTick) -> Result<(), EngineError> {
        if self.positions.is_flat() {
            return Ok(());
        }

        self.positions.mark_to_market(tick.price);
        if let Some((exit_price, reason)) = self.positions.exit_on_tick(tick.price) {
            self.close_position(exit_price, tick.timestamp, reason).await?;
        } else {
            let portfolio = self.positions.portfolio().clone();
            self.emit(EngineEvent::PortfolioUpdate {
                portfolio,
                timestamp: tick.timestamp,
            })
            .await?;
        }
        Ok(())
    }

    async fn close_position(
        &mut self,
        exit_price: Decimal,
        exit_time: DateTime<Utc>,
        reason: ExitReason,
    ) -> Result<(), EngineError> {
        let trade = self.positions.close(exit_price, exit_time, reason)?;
        self.risk.record_close(&trade);
        tracing::info!(
            reason = ?reason,
            exit = %exit_price,
            pnl = %trade.realized_pnl,
            cash = %self.positions.portfolio().cash_balance,
            "position closed"
        );
        self.emit(EngineEvent::PositionClosed(trade)).await?;

        let portfolio = self.positions.portfolio().clone();
        self.emit(EngineEvent::PortfolioUpdate {
            portfolio,
            timestamp: exit_time,
        })
        .await
    }

    async fn on_fetch_failed(
        &mut self,
        context: &'static str,
        error: &EngineError,
    ) -> Result<(), EngineError> {
        tracing::warn!("{context} fetch failed, skipping cycle: {error}");
        self.emit(EngineEvent::DataWarning {
            context: context.to_string(),
            message: error.to_string(),
            timestamp: Utc::now(),
        })
        .await
    }

    /// Sends an event to in-process subscribers and the sink, in order.
    async fn emit(&mut self, event: EngineEvent) -> Result<(), EngineError> {
        let _ = self.event_tx.send(event.clone());
        self.sink.publish(&event).await
    }

    fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state,
            portfolio: self.positions.portfolio().clone(),
            position: self.positions.position().cloned(),
            closed_trades: self.positions.closed_trades().len(),
            last_candle_time: self.last_candle_time,
            last_heartbeat: Utc::now(),
        }
    }

    fn publish_status(&self) {
        let _ = self.status_tx.send(self.status());
    }
}
