//! Settings providers: static destinations and hot-swappable ones

use crate::traits::SettingsProvider;
use conveyor_core::{ConveyorConfig, ExchangeSettings, QueueSettings};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

/// Destinations fixed at construction time
#[derive(Debug, Clone, Default)]
pub struct StaticSettings {
    queue: QueueSettings,
    exchange: ExchangeSettings,
}

impl StaticSettings {
    pub fn new(queue: QueueSettings, exchange: ExchangeSettings) -> Self {
        Self { queue, exchange }
    }

    pub fn from_config(config: &ConveyorConfig) -> Self {
        Self::new(config.queue.clone(), config.exchange.clone())
    }
}

impl SettingsProvider for StaticSettings {
    fn queue_settings(&self) -> QueueSettings {
        self.queue.clone()
    }

    fn exchange_settings(&self) -> ExchangeSettings {
        self.exchange.clone()
    }
}

#[derive(Debug, Clone)]
struct Destinations {
    queue: QueueSettings,
    exchange: ExchangeSettings,
}

/// Destinations that can be replaced while a driver is running
///
/// Each read returns the latest snapshot; a swap never tears queue and
/// exchange apart.
#[derive(Debug, Clone)]
pub struct SharedSettings {
    rx: watch::Receiver<Destinations>,
}

/// Write side of `SharedSettings`
#[derive(Debug, Clone)]
pub struct SettingsHandle {
    tx: Arc<watch::Sender<Destinations>>,
}

impl SharedSettings {
    /// Create shared destinations and the handle that swaps them
    pub fn new(queue: QueueSettings, exchange: ExchangeSettings) -> (Self, SettingsHandle) {
        let (tx, rx) = watch::channel(Destinations { queue, exchange });
        (Self { rx }, SettingsHandle { tx: Arc::new(tx) })
    }
}

impl SettingsProvider for SharedSettings {
    fn queue_settings(&self) -> QueueSettings {
        self.rx.borrow().queue.clone()
    }

    fn exchange_settings(&self) -> ExchangeSettings {
        self.rx.borrow().exchange.clone()
    }
}

impl SettingsHandle {
    /// Replace both destinations at once
    pub fn swap(&self, queue: QueueSettings, exchange: ExchangeSettings) {
        info!(queue = %queue.name, exchange = %exchange.name, "Swapping queue settings");
        self.tx.send_replace(Destinations { queue, exchange });
    }

    pub fn swap_queue(&self, queue: QueueSettings) {
        self.tx.send_modify(|current| current.queue = queue);
    }

    pub fn swap_exchange(&self, exchange: ExchangeSettings) {
        self.tx.send_modify(|current| current.exchange = exchange);
    }
}
