//! Keno paytable: (numbers picked, numbers hit) -> payout multiplier.
//!
//! Multipliers are held in hundredths so `floor(stake * multiplier)` is exact
//! integer arithmetic. Undefined (picks, hits) pairs pay nothing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serialized form: string keys so the table round-trips through TOML and JSON.
type PaytableRepr = BTreeMap<String, BTreeMap<String, f64>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PaytableRepr", into = "PaytableRepr")]
pub struct Paytable {
    /// picks -> hits -> multiplier in hundredths
    rows: BTreeMap<u8, BTreeMap<u8, u64>>,
}

impl Paytable {
    /// Build from `(picks, [(hits, multiplier)])` rows.
    pub fn from_rows(rows: &[(u8, &[(u8, f64)])]) -> Self {
        let rows = rows
            .iter()
            .map(|(picks, entries)| {
                let row = entries
                    .iter()
                    .map(|&(hits, mult)| (hits, to_hundredths(mult)))
                    .collect();
                (*picks, row)
            })
            .collect();
        Self { rows }
    }

    /// Paytable used by the live game.
    pub fn standard() -> Self {
        Self::from_rows(&[
            (1, &[(1, 3.4)]),
            (2, &[(2, 12.5)]),
            (3, &[(2, 2.0), (3, 40.0)]),
            (4, &[(2, 1.0), (3, 8.0), (4, 180.0)]),
            (5, &[(3, 3.0), (4, 15.0), (5, 450.0)]),
            (6, &[(3, 2.0), (4, 10.0), (5, 45.0), (6, 1800.0)]),
            (7, &[(4, 4.0), (5, 15.0), (6, 120.0), (7, 4000.0)]),
            (8, &[(4, 2.0), (5, 10.0), (6, 40.0), (7, 400.0), (8, 8000.0)]),
            (9, &[(5, 5.0), (6, 20.0), (7, 120.0), (8, 1200.0), (9, 20000.0)]),
            (
                10,
                &[
                    (4, 2.0),
                    (5, 5.0),
                    (6, 10.0),
                    (7, 40.0),
                    (8, 400.0),
                    (9, 4000.0),
                    (10, 100000.0),
                ],
            ),
        ])
    }

    /// Multiplier in hundredths, 0 when undefined.
    pub fn multiplier_hundredths(&self, picks: u8, hits: u8) -> u64 {
        self.rows
            .get(&picks)
            .and_then(|row| row.get(&hits))
            .copied()
            .unwrap_or(0)
    }

    pub fn multiplier(&self, picks: u8, hits: u8) -> f64 {
        self.multiplier_hundredths(picks, hits) as f64 / 100.0
    }

    /// `floor(stake * multiplier)`, saturating at `u64::MAX`.
    pub fn payout(&self, stake: u64, picks: u8, hits: u8) -> u64 {
        let cents = self.multiplier_hundredths(picks, hits);
        if cents == 0 {
            return 0;
        }
        let amount = stake as u128 * cents as u128 / 100;
        u64::try_from(amount).unwrap_or(u64::MAX)
    }

    /// Pick counts that have at least one paying row.
    pub fn pick_counts(&self) -> impl Iterator<Item = u8> + '_ {
        self.rows.keys().copied()
    }

    /// Highest hit count listed for any pick size.
    pub fn max_hits(&self) -> u8 {
        self.rows
            .values()
            .flat_map(|row| row.keys().copied())
            .max()
            .unwrap_or(0)
    }
}

impl Default for Paytable {
    fn default() -> Self {
        Self::standard()
    }
}

fn to_hundredths(mult: f64) -> u64 {
    if mult.is_finite() && mult > 0.0 {
        (mult * 100.0).round() as u64
    } else {
        0
    }
}

impl TryFrom<PaytableRepr> for Paytable {
    type Error = String;

    fn try_from(repr: PaytableRepr) -> Result<Self, Self::Error> {
        let mut rows = BTreeMap::new();
        for (picks, entries) in repr {
            let picks: u8 = picks
                .trim()
                .parse()
                .map_err(|_| format!("invalid pick count '{}'", picks))?;
            let mut row = BTreeMap::new();
            for (hits, mult) in entries {
                let hits: u8 = hits
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid hit count '{}' for {} picks", hits, picks))?;
                if hits > picks {
                    return Err(format!("{} hits listed for {} picks", hits, picks));
                }
                if !mult.is_finite() || mult < 0.0 {
                    return Err(format!("invalid multiplier {} for {}/{}", mult, picks, hits));
                }
                row.insert(hits, to_hundredths(mult));
            }
            rows.insert(picks, row);
        }
        Ok(Self { rows })
    }
}

impl From<Paytable> for PaytableRepr {
    fn from(table: Paytable) -> Self {
        table
            .rows
            .into_iter()
            .map(|(picks, row)| {
                let row = row
                    .into_iter()
                    .map(|(hits, cents)| (hits.to_string(), cents as f64 / 100.0))
                    .collect();
                (picks.to_string(), row)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_lookups() {
        let table = Paytable::standard();
        assert_eq!(table.multiplier(3, 3), 40.0);
        assert_eq!(table.multiplier(10, 10), 100000.0);
        assert_eq!(table.multiplier(1, 1), 3.4);
    }

    #[test]
    fn test_undefined_pairs_pay_zero() {
        let table = Paytable::standard();
        assert_eq!(table.payout(100, 3, 1), 0);
        assert_eq!(table.payout(100, 3, 0), 0);
        assert_eq!(table.payout(100, 15, 15), 0);
    }

    #[test]
    fn test_payout_is_floored() {
        let table = Paytable::from_rows(&[(1, &[(1, 3.4)]), (2, &[(2, 12.5)])]);
        assert_eq!(table.payout(100, 1, 1), 340);
        assert_eq!(table.payout(3, 1, 1), 10); // 10.2
        assert_eq!(table.payout(1, 2, 2), 12); // 12.5
    }

    #[test]
    fn test_payout_saturates() {
        let table = Paytable::standard();
        assert_eq!(table.payout(u64::MAX, 10, 10), u64::MAX);
    }

    #[test]
    fn test_json_round_trip_keeps_multipliers() {
        let table = Paytable::from_rows(&[(3, &[(2, 2.0), (3, 10.0)]), (2, &[(1, 1.0), (2, 5.0)])]);
        let json = serde_json::to_string(&table).unwrap();
        let back: Paytable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_rejects_impossible_rows() {
        let json = r#"{"2": {"3": 5.0}}"#;
        assert!(serde_json::from_str::<Paytable>(json).is_err());

        let json = r#"{"two": {"1": 5.0}}"#;
        assert!(serde_json::from_str::<Paytable>(json).is_err());
    }

    #[test]
    fn test_max_hits() {
        assert_eq!(Paytable::standard().max_hits(), 10);
        assert_eq!(Paytable::from_rows(&[]).max_hits(), 0);
    }
}
