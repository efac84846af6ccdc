//! Engine and API metrics in Prometheus text format

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::time::{Duration, Instant};

pub struct KenoMetrics {
    registry: Registry,
    start_time: Instant,
    pub rounds_completed: IntCounter,
    pub balls_revealed: IntCounter,
    pub bets_accepted: IntCounter,
    pub bets_rejected: IntCounterVec,
    pub tickets_settled: IntCounter,
    pub storage_retries: IntCounter,
    pub stall_recoveries: IntCounter,
    pub unsettled_rounds: IntCounter,
    pub current_round: IntGauge,
}

impl KenoMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("keno".to_string()), None)?;

        let rounds_completed = IntCounter::new("rounds_completed_total", "Rounds that reached finished")?;
        let balls_revealed = IntCounter::new("balls_revealed_total", "Winning numbers published")?;
        let bets_accepted = IntCounter::new("bets_accepted_total", "Tickets committed")?;
        let bets_rejected = IntCounterVec::new(
            Opts::new("bets_rejected_total", "Bets refused, by reason"),
            &["reason"],
        )?;
        let tickets_settled = IntCounter::new("tickets_settled_total", "Tickets moved out of pending")?;
        let storage_retries = IntCounter::new("storage_retries_total", "Engine steps retried after a store error")?;
        let stall_recoveries = IntCounter::new("stall_recoveries_total", "Stalled rounds force-advanced")?;
        let unsettled_rounds = IntCounter::new("unsettled_rounds_total", "Rounds finished with settlement incomplete")?;
        let current_round = IntGauge::new("current_round_id", "Id of the current round")?;

        registry.register(Box::new(rounds_completed.clone()))?;
        registry.register(Box::new(balls_revealed.clone()))?;
        registry.register(Box::new(bets_accepted.clone()))?;
        registry.register(Box::new(bets_rejected.clone()))?;
        registry.register(Box::new(tickets_settled.clone()))?;
        registry.register(Box::new(storage_retries.clone()))?;
        registry.register(Box::new(stall_recoveries.clone()))?;
        registry.register(Box::new(unsettled_rounds.clone()))?;
        registry.register(Box::new(current_round.clone()))?;

        Ok(Self {
            registry,
            start_time: Instant::now(),
            rounds_completed,
            balls_revealed,
            bets_accepted,
            bets_rejected,
            tickets_settled,
            storage_retries,
            stall_recoveries,
            unsettled_rounds,
            current_round,
        })
    }

    pub fn record_rejection(&self, reason: &str) {
        self.bets_rejected.with_label_values(&[reason]).inc();
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
