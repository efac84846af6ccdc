//! Winning-set selection under a return-to-player band.
//!
//! Both selectors are bounded random searches: they sample uniformly random
//! K-of-N candidates, score each by the payout it would cause against the
//! round's pending tickets, and keep the best. RTP control is probabilistic;
//! nothing guarantees a candidate inside the band exists or is found.

use crate::config::{DrawStrategy, GameConfig, RtpConfig, RtpScope};
use crate::errors::RoundError;
use crate::game::types::{AggregateStats, Ticket, TicketStatus, WinningSet};
use rand::seq::index::sample;
use rand::RngCore;

/// Band the payout ratio should land in, and what the ratio is measured against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RtpTarget {
    pub scope: RtpScope,
    pub floor: f64,
    pub ceiling: f64,
}

impl RtpTarget {
    pub fn from_config(config: &RtpConfig) -> Self {
        Self {
            scope: config.scope,
            floor: config.floor,
            ceiling: config.ceiling,
        }
    }

    /// Payout ratio a candidate would produce.
    pub fn ratio(&self, payout: u64, round_stake: u64, stats: &AggregateStats) -> f64 {
        match self.scope {
            RtpScope::Round => {
                if round_stake == 0 {
                    0.0
                } else {
                    payout as f64 / round_stake as f64
                }
            }
            RtpScope::Global => {
                let staked = stats.total_staked.saturating_add(round_stake);
                if staked == 0 {
                    0.0
                } else {
                    stats.total_paid_out.saturating_add(payout) as f64 / staked as f64
                }
            }
        }
    }

    /// 0 inside the band, otherwise how far outside it.
    pub fn distance(&self, ratio: f64) -> f64 {
        if ratio < self.floor {
            self.floor - ratio
        } else if ratio > self.ceiling {
            ratio - self.ceiling
        } else {
            0.0
        }
    }
}

/// Snapshot a selector decides from. Taken once, at the cutoff.
pub struct DrawContext<'a> {
    pub tickets: &'a [Ticket],
    pub stats: AggregateStats,
    pub rules: &'a GameConfig,
}

impl<'a> DrawContext<'a> {
    pub fn new(tickets: &'a [Ticket], stats: AggregateStats, rules: &'a GameConfig) -> Self {
        Self { tickets, stats, rules }
    }

    fn pending(&self) -> impl Iterator<Item = &Ticket> {
        self.tickets
            .iter()
            .filter(|t| t.status == TicketStatus::Pending)
    }

    pub fn round_stake(&self) -> u64 {
        self.pending().fold(0u64, |acc, t| acc.saturating_add(t.stake))
    }

    /// Total payout if `candidate` were drawn.
    pub fn projected_payout(&self, candidate: &[u8]) -> u64 {
        let mut drawn = [false; 256];
        for &n in candidate {
            drawn[n as usize] = true;
        }
        self.pending().fold(0u64, |acc, t| {
            let hits = t.hits_against(&drawn);
            let win = self
                .rules
                .paytable
                .payout(t.stake, t.numbers.len() as u8, hits);
            acc.saturating_add(win)
        })
    }

    /// Numbers picked by at least one pending ticket.
    fn picked_mask(&self) -> [bool; 257] {
        let mut picked = [false; 257];
        for t in self.pending() {
            for &n in &t.numbers {
                picked[n as usize] = true;
            }
        }
        picked
    }
}

/// Outcome of a selection, kept for logging and metrics.
#[derive(Debug, Clone)]
pub struct DrawDecision {
    pub numbers: WinningSet,
    pub projected_payout: u64,
    pub round_stake: u64,
    pub ratio: f64,
    pub trials_used: u32,
    pub in_band: bool,
}

pub trait DrawSelector: Send + Sync {
    fn name(&self) -> &'static str;

    fn select(&self, ctx: &DrawContext<'_>, rng: &mut dyn RngCore) -> Result<DrawDecision, RoundError>;
}

/// Build the selector named by the configuration.
pub fn selector_for(config: &RtpConfig) -> Box<dyn DrawSelector> {
    let target = RtpTarget::from_config(config);
    match config.strategy {
        DrawStrategy::RtpBand => Box::new(RtpBandSelector::new(target, config.trials)),
        DrawStrategy::NearMiss => Box::new(NearMissSelector::new(target, config.trials)),
    }
}

/// Uniform K-of-N sample, in draw order.
fn random_candidate(rules: &GameConfig, rng: &mut dyn RngCore) -> Vec<u8> {
    sample(rng, rules.pool_size as usize, rules.draw_size as usize)
        .into_iter()
        .map(|i| (i + 1) as u8)
        .collect()
}

struct Scored {
    numbers: Vec<u8>,
    payout: u64,
    ratio: f64,
    distance: f64,
}

fn score(ctx: &DrawContext<'_>, target: &RtpTarget, round_stake: u64, numbers: Vec<u8>) -> Scored {
    let payout = ctx.projected_payout(&numbers);
    let ratio = target.ratio(payout, round_stake, &ctx.stats);
    Scored {
        distance: target.distance(ratio),
        numbers,
        payout,
        ratio,
    }
}

fn decide(ctx: &DrawContext<'_>, best: Scored, round_stake: u64, trials_used: u32) -> Result<DrawDecision, RoundError> {
    Ok(DrawDecision {
        in_band: best.distance == 0.0,
        numbers: WinningSet::new(best.numbers, ctx.rules)?,
        projected_payout: best.payout,
        round_stake,
        ratio: best.ratio,
        trials_used,
    })
}

/// Default selector: first candidate inside the band, else the closest seen.
pub struct RtpBandSelector {
    target: RtpTarget,
    trials: u32,
}

impl RtpBandSelector {
    pub fn new(target: RtpTarget, trials: u32) -> Self {
        Self {
            target,
            trials: trials.max(1),
        }
    }
}

impl DrawSelector for RtpBandSelector {
    fn name(&self) -> &'static str {
        "rtp_band"
    }

    fn select(&self, ctx: &DrawContext<'_>, rng: &mut dyn RngCore) -> Result<DrawDecision, RoundError> {
        let round_stake = ctx.round_stake();
        if round_stake == 0 {
            // Nothing at stake: any uniform draw will do
            let numbers = random_candidate(ctx.rules, rng);
            let scored = score(ctx, &self.target, 0, numbers);
            return decide(ctx, scored, 0, 1);
        }

        let mut best: Option<Scored> = None;
        let mut used = 0;
        for _ in 0..self.trials {
            used += 1;
            let candidate = score(ctx, &self.target, round_stake, random_candidate(ctx.rules, rng));
            if candidate.distance == 0.0 {
                best = Some(candidate);
                break;
            }
            if best.as_ref().map_or(true, |b| candidate.distance < b.distance) {
                best = Some(candidate);
            }
        }

        match best {
            Some(best) => decide(ctx, best, round_stake, used),
            None => Err(RoundError::InvalidDraw("no candidate generated".to_string())),
        }
    }
}

/// Adjacency-biased variant. Among in-band candidates it keeps the one with the
/// most drawn numbers sitting next to (±1) a number some player picked, without
/// being picked itself. Falls back to the closest candidate when none is in band.
pub struct NearMissSelector {
    target: RtpTarget,
    trials: u32,
}

impl NearMissSelector {
    pub fn new(target: RtpTarget, trials: u32) -> Self {
        Self {
            target,
            trials: trials.max(1),
        }
    }
}

/// Drawn numbers adjacent to a pick but not picked.
pub fn near_miss_count(candidate: &[u8], picked: &[bool; 257]) -> usize {
    candidate
        .iter()
        .filter(|&&n| {
            let n = n as usize;
            !picked[n] && ((n > 1 && picked[n - 1]) || (n < 256 && picked[n + 1]))
        })
        .count()
}

impl DrawSelector for NearMissSelector {
    fn name(&self) -> &'static str {
        "near_miss"
    }

    fn select(&self, ctx: &DrawContext<'_>, rng: &mut dyn RngCore) -> Result<DrawDecision, RoundError> {
        let round_stake = ctx.round_stake();
        if round_stake == 0 {
            let numbers = random_candidate(ctx.rules, rng);
            let scored = score(ctx, &self.target, 0, numbers);
            return decide(ctx, scored, 0, 1);
        }

        let picked = ctx.picked_mask();
        let mut closest: Option<Scored> = None;
        let mut best_in_band: Option<(usize, Scored)> = None;

        for _ in 0..self.trials {
            let candidate = score(ctx, &self.target, round_stake, random_candidate(ctx.rules, rng));
            if candidate.distance == 0.0 {
                let adjacency = near_miss_count(&candidate.numbers, &picked);
                if best_in_band.as_ref().map_or(true, |(a, _)| adjacency > *a) {
                    best_in_band = Some((adjacency, candidate));
                }
            } else if closest.as_ref().map_or(true, |c| candidate.distance < c.distance) {
                closest = Some(candidate);
            }
        }

        match best_in_band.map(|(_, s)| s).or(closest) {
            Some(best) => decide(ctx, best, round_stake, self.trials),
            None => Err(RoundError::InvalidDraw("no candidate generated".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Paytable;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn ticket(id: &str, numbers: Vec<u8>, stake: u64) -> Ticket {
        Ticket::new(id.to_string(), format!("user-{}", id), 1, numbers, stake, 0)
    }

    fn round_target(ceiling: f64) -> RtpTarget {
        RtpTarget {
            scope: RtpScope::Round,
            floor: 0.0,
            ceiling,
        }
    }

    #[test]
    fn test_empty_pool_draws_valid_set() {
        let rules = GameConfig::default();
        let ctx = DrawContext::new(&[], AggregateStats::default(), &rules);
        let mut rng = StdRng::seed_from_u64(7);

        let decision = RtpBandSelector::new(round_target(0.7), 100)
            .select(&ctx, &mut rng)
            .unwrap();
        assert_eq!(decision.numbers.len(), 20);
        assert_eq!(decision.round_stake, 0);
        assert_eq!(decision.trials_used, 1);
    }

    #[test]
    fn test_same_seed_same_draw() {
        let rules = GameConfig::default();
        let tickets = vec![ticket("a", vec![1, 2, 3, 4, 5], 100)];
        let ctx = DrawContext::new(&tickets, AggregateStats::default(), &rules);
        let selector = RtpBandSelector::new(round_target(0.7), 50);

        let a = selector.select(&ctx, &mut StdRng::seed_from_u64(42)).unwrap();
        let b = selector.select(&ctx, &mut StdRng::seed_from_u64(42)).unwrap();
        assert_eq!(a.numbers, b.numbers);
    }

    #[test]
    fn test_projected_payout_sums_floors() {
        let mut rules = GameConfig::default();
        rules.paytable = Paytable::from_rows(&[(3, &[(2, 2.0), (3, 10.0)]), (2, &[(1, 1.0), (2, 5.0)])]);
        let tickets = vec![ticket("a", vec![1, 2, 3], 100), ticket("b", vec![4, 5], 50)];
        let ctx = DrawContext::new(&tickets, AggregateStats::default(), &rules);

        assert_eq!(ctx.round_stake(), 150);
        assert_eq!(ctx.projected_payout(&[1, 2, 3, 6, 7]), 1_000);
        assert_eq!(ctx.projected_payout(&[1, 2, 4, 6, 7]), 250);
    }

    #[test]
    fn test_settled_tickets_are_ignored() {
        let rules = GameConfig::default();
        let mut settled = ticket("a", vec![1], 500);
        settled.status = TicketStatus::Lost;
        let tickets = vec![settled];
        let ctx = DrawContext::new(&tickets, AggregateStats::default(), &rules);
        assert_eq!(ctx.round_stake(), 0);
    }

    #[test]
    fn test_band_selector_stays_under_ceiling_when_possible() {
        let rules = GameConfig::default();
        // One hit pays 340 of 500 staked; two hits overshoot the ceiling
        let tickets: Vec<Ticket> = (1..=5).map(|n| ticket(&n.to_string(), vec![n], 100)).collect();
        let ctx = DrawContext::new(&tickets, AggregateStats::default(), &rules);
        let selector = RtpBandSelector::new(round_target(0.7), 200);

        for seed in 0..20 {
            let decision = selector.select(&ctx, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert!(decision.in_band, "seed {} missed the band", seed);
            assert!(decision.ratio <= 0.7);
        }
    }

    #[test]
    fn test_unreachable_band_returns_closest() {
        let rules = GameConfig::default();
        let tickets = vec![ticket("a", vec![1, 2], 100)];
        let ctx = DrawContext::new(&tickets, AggregateStats::default(), &rules);
        let target = RtpTarget {
            scope: RtpScope::Round,
            floor: 1_000.0,
            ceiling: 2_000.0,
        };

        let decision = RtpBandSelector::new(target, 30)
            .select(&ctx, &mut StdRng::seed_from_u64(3))
            .unwrap();
        assert!(!decision.in_band);
        assert_eq!(decision.trials_used, 30);
    }

    #[test]
    fn test_global_scope_ratio() {
        let target = RtpTarget {
            scope: RtpScope::Global,
            floor: 0.7,
            ceiling: 0.85,
        };
        let stats = AggregateStats {
            total_staked: 900,
            total_paid_out: 700,
            ..Default::default()
        };
        let ratio = target.ratio(100, 100, &stats);
        assert!((ratio - 0.8).abs() < 1e-9);
        assert_eq!(target.distance(ratio), 0.0);
        assert!((target.distance(0.5) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_near_miss_count() {
        let mut picked = [false; 257];
        picked[10] = true;
        picked[20] = true;
        // 9 and 11 border 10, 21 borders 20, 20 itself is a hit, 40 is unrelated
        assert_eq!(near_miss_count(&[9, 11, 20, 21, 40], &picked), 3);
        assert_eq!(near_miss_count(&[1], &picked), 0);
    }

    #[test]
    fn test_near_miss_stays_in_band() {
        let rules = GameConfig::default();
        let tickets: Vec<Ticket> = (1..=3).map(|n| ticket(&n.to_string(), vec![n * 10], 100)).collect();
        let ctx = DrawContext::new(&tickets, AggregateStats::default(), &rules);
        let selector = NearMissSelector::new(round_target(0.7), 100);

        let decision = selector.select(&ctx, &mut StdRng::seed_from_u64(11)).unwrap();
        assert!(decision.in_band);
        assert_eq!(selector.name(), "near_miss");
    }

    #[test]
    fn test_selector_for_strategy() {
        let mut config = RtpConfig::default();
        assert_eq!(selector_for(&config).name(), "rtp_band");
        config.strategy = DrawStrategy::NearMiss;
        assert_eq!(selector_for(&config).name(), "near_miss");
    }
}
