// Copyright 2026 Hypermesh Foundation. All rights reserved.
// CloudGrid Simulation Core - Economy Ledger
//
// Money is exact (`Decimal`); reputation and score are plain floats since
// they only feed thresholds and the HUD.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::adapter::{to_decimal, to_display};
use crate::catalog::{ScoreTable, TrafficSpec};
use crate::types::{EconomyView, FailureReason, NodeKind, Outcome, Rejected, ScoreCategory, TrafficType};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub total: f64,
    pub storage: f64,
    pub database: f64,
    pub security: f64,
}

impl Score {
    fn category_mut(&mut self, category: ScoreCategory) -> &mut f64 {
        match category {
            ScoreCategory::Storage => &mut self.storage,
            ScoreCategory::Database => &mut self.database,
            ScoreCategory::Security => &mut self.security,
        }
    }
}

/// Itemized accounting for reports. Never consulted by game rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Finances {
    pub income_by_type: BTreeMap<TrafficType, Decimal>,
    pub upkeep_by_kind: BTreeMap<NodeKind, Decimal>,
    pub purchases: Decimal,
    pub upgrades: Decimal,
    pub repairs: Decimal,
    pub refunds: Decimal,
    pub completed_by_type: BTreeMap<TrafficType, u64>,
    pub failed_by_type: BTreeMap<TrafficType, u64>,
    pub failures_by_reason: BTreeMap<FailureReason, u64>,
    pub cache_hits: u64,
    pub blocked: u64,
    pub passed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expense {
    Purchase,
    Upgrade,
    Repair,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ledger {
    money: Decimal,
    reputation: f64,
    score: Score,
    finances: Finances,
}

impl Ledger {
    pub fn new(start_money: f64, start_reputation: f64) -> Self {
        Self {
            money: to_decimal(start_money),
            reputation: start_reputation,
            score: Score::default(),
            finances: Finances::default(),
        }
    }

    pub fn money(&self) -> Decimal {
        self.money
    }

    pub fn reputation(&self) -> f64 {
        self.reputation
    }

    pub fn score(&self) -> &Score {
        &self.score
    }

    pub fn finances(&self) -> &Finances {
        &self.finances
    }

    // ─── Request Outcomes ────────────────────────────────────────────────

    pub fn apply(&mut self, traffic: TrafficType, outcome: Outcome, spec: &TrafficSpec, table: &ScoreTable) {
        match outcome {
            Outcome::Completed { cached } => {
                let bonus = if cached { 1.0 + table.cache_bonus } else { 1.0 };
                let earned = to_decimal(spec.reward) * to_decimal(bonus);
                self.money += earned;
                *self.finances.income_by_type.entry(traffic).or_default() += earned;
                *self.finances.completed_by_type.entry(traffic).or_default() += 1;
                if cached {
                    self.finances.cache_hits += 1;
                }
                self.score.total += spec.score;
                *self.score.category_mut(traffic.category()) += spec.score;
                self.reputation += table.completion_reputation;
            }
            Outcome::Failed { reason } => {
                self.reputation += table.fail_reputation;
                self.score.total -= spec.score * table.failure_clawback;
                *self.finances.failed_by_type.entry(traffic).or_default() += 1;
                *self.finances.failures_by_reason.entry(reason).or_default() += 1;
            }
            Outcome::MaliciousBlocked => {
                self.score.security += table.malicious_blocked_score;
                self.score.total += table.malicious_blocked_score;
                self.money += to_decimal(table.malicious_blocked_reward);
                self.finances.blocked += 1;
            }
            Outcome::MaliciousPassed { reason } => {
                self.reputation += table.malicious_passed_reputation;
                self.finances.passed += 1;
                *self.finances.failures_by_reason.entry(reason).or_default() += 1;
                tracing::warn!(?reason, reputation = self.reputation, "malicious request got through");
            }
        }
    }

    // ─── Spending ────────────────────────────────────────────────────────

    pub fn can_afford(&self, cost: f64) -> bool {
        self.money >= to_decimal(cost)
    }

    /// Debit a player purchase. Refused when the balance does not cover it.
    pub fn charge(&mut self, cost: f64, expense: Expense) -> Result<(), Rejected> {
        let cost = to_decimal(cost);
        if self.money < cost {
            return Err(Rejected::InsufficientFunds {
                needed: to_display(cost),
                available: to_display(self.money),
            });
        }
        self.money -= cost;
        let bucket = match expense {
            Expense::Purchase => &mut self.finances.purchases,
            Expense::Upgrade => &mut self.finances.upgrades,
            Expense::Repair => &mut self.finances.repairs,
        };
        *bucket += cost;
        Ok(())
    }

    /// Running costs always go through, even into debt.
    pub fn debit_upkeep(&mut self, kind: NodeKind, amount: f64) {
        let amount = to_decimal(amount);
        self.money -= amount;
        *self.finances.upkeep_by_kind.entry(kind).or_default() += amount;
    }

    pub fn refund(&mut self, amount: Decimal) {
        self.money += amount;
        self.finances.refunds += amount;
    }

    // ─── End of Tick ─────────────────────────────────────────────────────

    pub fn clamp_reputation(&mut self, max: f64) {
        self.reputation = self.reputation.min(max);
    }

    /// Reputation gone or debt past the floor.
    pub fn is_ruined(&self, money_floor: f64) -> bool {
        self.reputation <= 0.0 || self.money <= to_decimal(money_floor)
    }

    pub(crate) fn restore(&mut self, money: Decimal, reputation: f64, score: Score) {
        self.money = money;
        self.reputation = reputation;
        self.score = score;
    }

    pub fn view(&self, upkeep_per_second: f64) -> EconomyView {
        let completed: u64 = self.finances.completed_by_type.values().sum();
        let failed: u64 = self.finances.failed_by_type.values().sum();
        EconomyView {
            money: to_display(self.money),
            reputation: self.reputation,
            score_total: self.score.total,
            score_storage: self.score.storage,
            score_database: self.score.database,
            score_security: self.score.security,
            upkeep_per_second,
            requests_completed: completed + self.finances.blocked,
            requests_failed: failed + self.finances.passed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TrafficCatalog;
    use rust_decimal_macros::dec;

    fn apply(ledger: &mut Ledger, traffic: TrafficType, outcome: Outcome) {
        let catalog = TrafficCatalog::default();
        ledger.apply(traffic, outcome, catalog.spec_for(traffic), &ScoreTable::default());
    }

    #[test]
    fn completion_pays_and_scores_category() {
        let mut ledger = Ledger::new(500.0, 90.0);
        apply(&mut ledger, TrafficType::Write, Outcome::Completed { cached: false });
        assert_eq!(ledger.money(), dec!(501.5));
        assert_eq!(ledger.score().database, 8.0);
        assert_eq!(ledger.score().total, 8.0);
        assert!((ledger.reputation() - 90.1).abs() < 1e-9);
        assert_eq!(ledger.finances().income_by_type[&TrafficType::Write], dec!(1.5));
    }

    #[test]
    fn cached_completion_earns_bonus() {
        let mut ledger = Ledger::new(0.0, 100.0);
        apply(&mut ledger, TrafficType::Search, Outcome::Completed { cached: true });
        assert_eq!(ledger.money(), dec!(3.0));
        assert_eq!(ledger.finances().cache_hits, 1);
    }

    #[test]
    fn failure_claws_back_half_score() {
        let mut ledger = Ledger::new(500.0, 100.0);
        apply(&mut ledger, TrafficType::Static, Outcome::Failed { reason: FailureReason::NoEntryConnection });
        assert_eq!(ledger.score().total, -1.5);
        assert_eq!(ledger.reputation(), 97.5);
        assert_eq!(ledger.money(), dec!(500));
        assert_eq!(ledger.finances().failures_by_reason[&FailureReason::NoEntryConnection], 1);
    }

    #[test]
    fn malicious_outcomes() {
        let mut ledger = Ledger::new(0.0, 100.0);
        apply(&mut ledger, TrafficType::Malicious, Outcome::MaliciousBlocked);
        assert_eq!(ledger.score().security, 5.0);
        assert_eq!(ledger.money(), dec!(0.5));

        apply(&mut ledger, TrafficType::Malicious, Outcome::MaliciousPassed {
            reason: FailureReason::BypassedFirewall,
        });
        assert_eq!(ledger.reputation(), 95.0);

        let overflow = Outcome::failure(TrafficType::Malicious, FailureReason::QueueOverflow);
        apply(&mut ledger, TrafficType::Malicious, overflow);
        assert_eq!(ledger.reputation(), 90.0);
        assert_eq!(ledger.score().total, 5.0);
        assert_eq!(ledger.finances().passed, 2);
        assert_eq!(ledger.finances().failures_by_reason[&FailureReason::QueueOverflow], 1);
    }

    #[test]
    fn charge_refuses_overdraft() {
        let mut ledger = Ledger::new(100.0, 100.0);
        ledger.charge(75.0, Expense::Purchase).unwrap();
        let err = ledger.charge(50.0, Expense::Purchase).unwrap_err();
        assert_eq!(err, Rejected::InsufficientFunds { needed: 50.0, available: 25.0 });
        assert_eq!(ledger.money(), dec!(25));
        ledger.refund(dec!(37));
        assert_eq!(ledger.money(), dec!(62));
    }

    #[test]
    fn upkeep_can_go_negative_and_ruin() {
        let mut ledger = Ledger::new(0.0, 100.0);
        ledger.debit_upkeep(NodeKind::Database, 999.0);
        assert!(!ledger.is_ruined(-1000.0));
        ledger.debit_upkeep(NodeKind::Database, 1.0);
        assert!(ledger.is_ruined(-1000.0));
        assert_eq!(ledger.finances().upkeep_by_kind[&NodeKind::Database], dec!(1000));
    }

    #[test]
    fn reputation_is_capped() {
        let mut ledger = Ledger::new(0.0, 100.0);
        apply(&mut ledger, TrafficType::Read, Outcome::Completed { cached: false });
        ledger.clamp_reputation(100.0);
        assert_eq!(ledger.reputation(), 100.0);
    }
}
