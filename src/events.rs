//! Round events pushed to viewers
//!
//! Delivery is fire-and-forget: the engine publishes and moves on whether or
//! not anyone is listening.

use crate::game::RoundStatus;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoundEvent {
    RoundPhaseChanged {
        round_id: u64,
        status: RoundStatus,
        time_remaining_ms: u64,
    },
    BallRevealed {
        round_id: u64,
        value: u8,
        /// 0-based position in the winning set
        index: u8,
        /// Everything revealed so far, including `value`
        drawn: Vec<u8>,
    },
    RoundFinished {
        round_id: u64,
        winning_numbers: Vec<u8>,
    },
    Heartbeat {
        timestamp: u64,
    },
}

impl RoundEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            RoundEvent::RoundPhaseChanged { .. } => "round_phase_changed",
            RoundEvent::BallRevealed { .. } => "ball_revealed",
            RoundEvent::RoundFinished { .. } => "round_finished",
            RoundEvent::Heartbeat { .. } => "heartbeat",
        }
    }
}

/// Where the engine sends its events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: RoundEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: RoundEvent) {}
}

/// Fan-out of round events to any number of subscribers
#[derive(Clone)]
pub struct BroadcastHub {
    tx: broadcast::Sender<RoundEvent>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoundEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish a heartbeat every `period` until the returned task is aborted.
    pub fn start_heartbeat(&self, period: Duration, clock: std::sync::Arc<dyn crate::clock::Clock>) -> JoinHandle<()> {
        let hub = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                hub.publish(RoundEvent::Heartbeat {
                    timestamp: clock.now_ms(),
                });
            }
        })
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastHub {
    fn publish(&self, event: RoundEvent) {
        let kind = event.kind();
        if let Err(e) = self.tx.send(event) {
            debug!(kind, "No subscribers for round event: {}", e);
        }
    }
}
