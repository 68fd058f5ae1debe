//! The five sorted exit-condition sets attached to a position.
//!
//! # Scan semantics
//!
//! - Sets are scanned in [`ExitKind::SCAN_ORDER`], each in its own sort order
//! - Only triggered rules add to the running exit fraction
//! - The scan stops at the rule that brings the fraction to 1.0, capping that
//!   rule's share so the reported fractions sum to exactly 1.0
//! - Under [`ScanPolicy::FullCoverage`] a scan that never reaches 1.0 reports nothing

use crate::domain::diagnostic::{Diagnostic, StaleReference};
use crate::domain::error::SoltradeError;
use crate::domain::exit_rule::{
    ExitCondition, ExitKind, ExitRule, StopLoss, TakeProfit, TrailingStopLoss, TrailingTakeProfit,
    TrueTrailingTakeProfit,
};
use std::cmp::Ordering;
use std::str::FromStr;

const EPSILON: f64 = 1e-9;

/// Whether a scan may report triggered rules that do not add up to a full exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScanPolicy {
    #[default]
    FullCoverage,
    Partial,
}

impl FromStr for ScanPolicy {
    type Err = SoltradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "full" | "full_coverage" => Ok(ScanPolicy::FullCoverage),
            "partial" => Ok(ScanPolicy::Partial),
            other => Err(SoltradeError::invalid(
                "scan_policy",
                format!("expected `full` or `partial`, got `{other}`"),
            )),
        }
    }
}

/// One rule reported by a scan, addressed by kind and index within its set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggeredExit {
    pub kind: ExitKind,
    pub pct: f64,
    pub index: usize,
}

/// Rules of one kind, kept in evaluation order.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleSet<R> {
    rules: Vec<R>,
}

impl<R> Default for RuleSet<R> {
    fn default() -> Self {
        RuleSet { rules: Vec::new() }
    }
}

impl<R: ExitCondition> RuleSet<R> {
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn as_slice(&self) -> &[R] {
        &self.rules
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.rules.iter()
    }

    pub fn get(&self, index: usize) -> Result<R, StaleReference> {
        self.rules.get(index).copied().ok_or(self.stale(index))
    }

    pub fn pct_sum(&self) -> f64 {
        self.rules.iter().map(ExitCondition::pct_of_position).sum()
    }

    /// Inserts after every rule that does not sort after `rule`; returns the index.
    pub fn insert(&mut self, rule: R) -> usize {
        let index = self
            .rules
            .partition_point(|r| r.precedence(&rule) != Ordering::Greater);
        self.rules.insert(index, rule);
        index
    }

    pub fn remove(&mut self, index: usize) -> Result<R, StaleReference> {
        if index < self.rules.len() {
            Ok(self.rules.remove(index))
        } else {
            Err(self.stale(index))
        }
    }

    fn stale(&self, index: usize) -> StaleReference {
        StaleReference {
            kind: R::KIND,
            index,
            len: self.rules.len(),
        }
    }

    fn triggered(&self, price: f64) -> Vec<(usize, f64)> {
        self.rules
            .iter()
            .enumerate()
            .filter(|(_, rule)| rule.is_triggered(price))
            .map(|(index, rule)| (index, rule.pct_of_position()))
            .collect()
    }

    /// Replaces every rule with `f(rule)` and restores the sort order.
    fn replace_each(&mut self, mut f: impl FnMut(R) -> R) {
        for rule in self.rules.iter_mut() {
            *rule = f(*rule);
        }
        self.rules.sort_by(|a, b| a.precedence(b));
    }

    /// Removes the given indices (resolved against the current order).
    fn remove_all(&mut self, indices: &[usize]) {
        let mut indices = indices.to_vec();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        indices.dedup();
        for index in indices {
            if index < self.rules.len() {
                self.rules.remove(index);
            }
        }
    }

    /// Scales the remaining fractions back up to the set's total before `removed` left it.
    fn rescale(&mut self, removed: f64) -> Option<f64> {
        let current = self.pct_sum();
        if self.rules.is_empty() || current <= 0.0 {
            return None;
        }
        let factor = (current + removed) / current;
        self.replace_each(|rule| {
            let pct = rule.pct_of_position() * factor;
            rule.with_pct_of_position(pct)
        });
        Some(factor)
    }
}

macro_rules! with_set {
    ($book:expr, $kind:expr, |$set:ident| $body:expr) => {
        match $kind {
            ExitKind::TakeProfit => {
                let $set = &$book.take_profit;
                $body
            }
            ExitKind::TrailingTakeProfit => {
                let $set = &$book.trailing_take_profit;
                $body
            }
            ExitKind::TrueTrailingTakeProfit => {
                let $set = &$book.true_trailing_take_profit;
                $body
            }
            ExitKind::StopLoss => {
                let $set = &$book.stop_loss;
                $body
            }
            ExitKind::TrailingStopLoss => {
                let $set = &$book.trailing_stop_loss;
                $body
            }
        }
    };
}

macro_rules! with_set_mut {
    ($book:expr, $kind:expr, |$set:ident| $body:expr) => {
        match $kind {
            ExitKind::TakeProfit => {
                let $set = &mut $book.take_profit;
                $body
            }
            ExitKind::TrailingTakeProfit => {
                let $set = &mut $book.trailing_take_profit;
                $body
            }
            ExitKind::TrueTrailingTakeProfit => {
                let $set = &mut $book.true_trailing_take_profit;
                $body
            }
            ExitKind::StopLoss => {
                let $set = &mut $book.stop_loss;
                $body
            }
            ExitKind::TrailingStopLoss => {
                let $set = &mut $book.trailing_stop_loss;
                $body
            }
        }
    };
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExitBook {
    take_profit: RuleSet<TakeProfit>,
    trailing_take_profit: RuleSet<TrailingTakeProfit>,
    true_trailing_take_profit: RuleSet<TrueTrailingTakeProfit>,
    stop_loss: RuleSet<StopLoss>,
    trailing_stop_loss: RuleSet<TrailingStopLoss>,
}

impl ExitBook {
    pub fn take_profit(&self) -> &RuleSet<TakeProfit> {
        &self.take_profit
    }

    pub fn trailing_take_profit(&self) -> &RuleSet<TrailingTakeProfit> {
        &self.trailing_take_profit
    }

    pub fn true_trailing_take_profit(&self) -> &RuleSet<TrueTrailingTakeProfit> {
        &self.true_trailing_take_profit
    }

    pub fn stop_loss(&self) -> &RuleSet<StopLoss> {
        &self.stop_loss
    }

    pub fn trailing_stop_loss(&self) -> &RuleSet<TrailingStopLoss> {
        &self.trailing_stop_loss
    }

    pub fn len(&self, kind: ExitKind) -> usize {
        with_set!(self, kind, |set| set.len())
    }

    pub fn is_empty(&self) -> bool {
        ExitKind::SCAN_ORDER.iter().all(|&kind| self.len(kind) == 0)
    }

    pub fn pct_sum(&self, kind: ExitKind) -> f64 {
        with_set!(self, kind, |set| set.pct_sum())
    }

    /// Sum of `pct_of_position` over every active rule.
    pub fn active_pct_sum(&self) -> f64 {
        ExitKind::SCAN_ORDER
            .iter()
            .map(|&kind| self.pct_sum(kind))
            .sum()
    }

    pub fn has_trailing(&self) -> bool {
        !(self.trailing_stop_loss.is_empty()
            && self.trailing_take_profit.is_empty()
            && self.true_trailing_take_profit.is_empty())
    }

    pub fn get(&self, kind: ExitKind, index: usize) -> Result<ExitRule, StaleReference> {
        with_set!(self, kind, |set| set.get(index).map(ExitCondition::into_rule))
    }

    pub fn insert(&mut self, rule: ExitRule) -> usize {
        match rule {
            ExitRule::TakeProfit(r) => self.take_profit.insert(r),
            ExitRule::TrailingTakeProfit(r) => self.trailing_take_profit.insert(r),
            ExitRule::TrueTrailingTakeProfit(r) => self.true_trailing_take_profit.insert(r),
            ExitRule::StopLoss(r) => self.stop_loss.insert(r),
            ExitRule::TrailingStopLoss(r) => self.trailing_stop_loss.insert(r),
        }
    }

    pub fn remove(&mut self, kind: ExitKind, index: usize) -> Result<ExitRule, StaleReference> {
        with_set_mut!(self, kind, |set| set
            .remove(index)
            .map(ExitCondition::into_rule))
    }

    pub(crate) fn remove_all(&mut self, kind: ExitKind, indices: &[usize]) {
        with_set_mut!(self, kind, |set| set.remove_all(indices))
    }

    pub(crate) fn rescale(&mut self, kind: ExitKind, removed: f64) -> Option<f64> {
        with_set_mut!(self, kind, |set| set.rescale(removed))
    }

    /// Moves trailing exit prices for a new observation.
    ///
    /// `at_high`/`at_low` say whether `price` equals the running high/low of the
    /// position. Returns one diagnostic per rule whose exit price changed.
    pub fn ratchet(
        &mut self,
        token: &str,
        price: f64,
        at_high: bool,
        at_low: bool,
    ) -> Vec<Diagnostic> {
        let mut events = Vec::new();

        if at_high {
            self.trailing_stop_loss.replace_each(|rule| {
                let next = rule.ratcheted(price);
                if next.exit_price > rule.exit_price {
                    events.push(Diagnostic::Ratcheted {
                        token: token.to_string(),
                        kind: ExitKind::TrailingStopLoss,
                        trail_pct: rule.trail_pct,
                        exit_price: next.exit_price,
                        current_price: price,
                    });
                }
                next
            });
        }

        self.trailing_take_profit.replace_each(|rule| match rule.exit_price {
            None if price >= rule.trigger_price => {
                let next = rule.armed(price);
                events.push(Diagnostic::Armed {
                    token: token.to_string(),
                    trail_pct: rule.trail_pct,
                    exit_price: next.exit_price.unwrap_or(price),
                    current_price: price,
                });
                next
            }
            Some(previous) if at_high => {
                let next = rule.ratcheted(price);
                if let Some(exit_price) = next.exit_price.filter(|&p| p > previous) {
                    events.push(Diagnostic::Ratcheted {
                        token: token.to_string(),
                        kind: ExitKind::TrailingTakeProfit,
                        trail_pct: rule.trail_pct,
                        exit_price,
                        current_price: price,
                    });
                }
                next
            }
            _ => rule,
        });

        if at_low {
            self.true_trailing_take_profit.replace_each(|rule| {
                let next = rule.ratcheted(price);
                if next.exit_price < rule.exit_price {
                    events.push(Diagnostic::Ratcheted {
                        token: token.to_string(),
                        kind: ExitKind::TrueTrailingTakeProfit,
                        trail_pct: rule.trail_pct,
                        exit_price: next.exit_price,
                        current_price: price,
                    });
                }
                next
            });
        }

        events
    }

    /// Collects the rules triggered at `price`, in scan order.
    pub fn scan(&self, price: f64, policy: ScanPolicy) -> Vec<TriggeredExit> {
        let mut triggered = Vec::new();
        let mut total = 0.0;

        for kind in ExitKind::SCAN_ORDER {
            let hits = with_set!(self, kind, |set| set.triggered(price));
            for (index, pct) in hits {
                if total + pct >= 1.0 - EPSILON {
                    triggered.push(TriggeredExit {
                        kind,
                        pct: 1.0 - total,
                        index,
                    });
                    return triggered;
                }
                total += pct;
                triggered.push(TriggeredExit { kind, pct, index });
            }
        }

        match policy {
            ScanPolicy::FullCoverage => Vec::new(),
            ScanPolicy::Partial => triggered,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tp(exit_price: f64, pct: f64) -> ExitRule {
        ExitRule::TakeProfit(TakeProfit {
            exit_price,
            pct_of_position: pct,
        })
    }

    fn sl(exit_price: f64, pct: f64) -> ExitRule {
        ExitRule::StopLoss(StopLoss {
            exit_price,
            pct_of_position: pct,
        })
    }

    fn tsl(exit_price: f64, trail_pct: f64, pct: f64) -> ExitRule {
        ExitRule::TrailingStopLoss(TrailingStopLoss {
            exit_price,
            trail_pct,
            pct_of_position: pct,
        })
    }

    #[test]
    fn take_profit_sorted_ascending() {
        let mut book = ExitBook::default();
        book.insert(tp(120.0, 0.3));
        book.insert(tp(110.0, 0.3));
        assert_eq!(book.insert(tp(115.0, 0.3)), 1);
        let prices: Vec<f64> = book.take_profit().iter().map(|r| r.exit_price).collect();
        assert_eq!(prices, vec![110.0, 115.0, 120.0]);
    }

    #[test]
    fn stop_loss_sorted_descending() {
        let mut book = ExitBook::default();
        book.insert(sl(90.0, 0.5));
        book.insert(sl(95.0, 0.5));
        let prices: Vec<f64> = book.stop_loss().iter().map(|r| r.exit_price).collect();
        assert_eq!(prices, vec![95.0, 90.0]);
    }

    #[test]
    fn trailing_stop_sorted_by_trail() {
        let mut book = ExitBook::default();
        book.insert(tsl(80.0, 0.2, 0.5));
        book.insert(tsl(95.0, 0.05, 0.5));
        let trails: Vec<f64> = book
            .trailing_stop_loss()
            .iter()
            .map(|r| r.trail_pct)
            .collect();
        assert_eq!(trails, vec![0.05, 0.2]);
    }

    #[test]
    fn equal_keys_keep_insertion_order() {
        let mut book = ExitBook::default();
        book.insert(tp(110.0, 0.2));
        assert_eq!(book.insert(tp(110.0, 0.3)), 1);
        assert_relative_eq!(book.take_profit().as_slice()[1].pct_of_position, 0.3);
    }

    #[test]
    fn get_and_remove_out_of_range_are_stale() {
        let mut book = ExitBook::default();
        book.insert(sl(95.0, 1.0));
        let stale = book.remove(ExitKind::StopLoss, 4).unwrap_err();
        assert_eq!(stale.len, 1);
        assert_eq!(stale.kind, ExitKind::StopLoss);
        assert!(book.get(ExitKind::TakeProfit, 0).is_err());
        assert!(book.remove(ExitKind::StopLoss, 0).is_ok());
        assert!(book.is_empty());
    }

    #[test]
    fn active_pct_sum_spans_all_sets() {
        let mut book = ExitBook::default();
        book.insert(tp(110.0, 0.25));
        book.insert(sl(90.0, 0.5));
        book.insert(tsl(90.0, 0.1, 0.25));
        assert_relative_eq!(book.active_pct_sum(), 1.0);
        assert_relative_eq!(book.pct_sum(ExitKind::StopLoss), 0.5);
    }

    #[test]
    fn scan_reports_only_triggered_rules() {
        let mut book = ExitBook::default();
        // untriggered take profit must not count toward the total
        book.insert(tp(200.0, 0.5));
        book.insert(sl(95.0, 0.5));
        book.insert(tsl(96.0, 0.04, 0.5));

        let hits = book.scan(94.0, ScanPolicy::FullCoverage);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].kind, ExitKind::StopLoss);
        assert_eq!(hits[1].kind, ExitKind::TrailingStopLoss);
        assert_relative_eq!(hits.iter().map(|h| h.pct).sum::<f64>(), 1.0);
    }

    #[test]
    fn scan_caps_last_fraction() {
        let mut book = ExitBook::default();
        book.insert(tp(110.0, 0.75));
        book.insert(sl(200.0, 0.75));
        let hits = book.scan(150.0, ScanPolicy::FullCoverage);
        assert_eq!(hits.len(), 2);
        assert_relative_eq!(hits[0].pct, 0.75);
        assert_relative_eq!(hits[1].pct, 0.25);
    }

    #[test]
    fn scan_below_full_depends_on_policy() {
        let mut book = ExitBook::default();
        book.insert(tp(110.0, 0.5));
        book.insert(tp(120.0, 0.5));
        assert!(book.scan(115.0, ScanPolicy::FullCoverage).is_empty());
        let partial = book.scan(115.0, ScanPolicy::Partial);
        assert_eq!(
            partial,
            vec![TriggeredExit {
                kind: ExitKind::TakeProfit,
                pct: 0.5,
                index: 0
            }]
        );
    }

    #[test]
    fn ratchet_moves_trailing_stop_on_new_high() {
        let mut book = ExitBook::default();
        book.insert(tsl(90.0, 0.1, 1.0));
        let events = book.ratchet("SOL", 110.0, true, false);
        assert_eq!(events.len(), 1);
        assert_relative_eq!(book.trailing_stop_loss().as_slice()[0].exit_price, 99.0, epsilon = 1e-9);

        let events = book.ratchet("SOL", 105.0, false, false);
        assert!(events.is_empty());
        assert_relative_eq!(book.trailing_stop_loss().as_slice()[0].exit_price, 99.0, epsilon = 1e-9);
    }

    #[test]
    fn ratchet_arms_trailing_take_profit_and_resorts() {
        let mut book = ExitBook::default();
        let near = TrailingTakeProfit::from_price(100.0, 0.1, 0.05, 0.5).unwrap();
        let far = TrailingTakeProfit::from_price(100.0, 0.5, 0.05, 0.5).unwrap();
        book.insert(ExitRule::TrailingTakeProfit(far));
        book.insert(ExitRule::TrailingTakeProfit(near));

        let events = book.ratchet("SOL", 111.0, true, false);
        assert!(matches!(events.as_slice(), [Diagnostic::Armed { .. }]));
        let set = book.trailing_take_profit().as_slice();
        assert!(set[0].is_armed());
        assert!(!set[1].is_armed());
        assert_relative_eq!(set[0].trigger_price, 110.0, epsilon = 1e-9);
    }

    #[test]
    fn ratchet_lowers_true_trailing_take_profit_on_new_low() {
        let mut book = ExitBook::default();
        let rule = TrueTrailingTakeProfit::from_price(100.0, 0.1, 1.0).unwrap();
        book.insert(ExitRule::TrueTrailingTakeProfit(rule));
        book.ratchet("SOL", 80.0, false, true);
        assert_relative_eq!(
            book.true_trailing_take_profit().as_slice()[0].exit_price,
            88.0,
            epsilon = 1e-9
        );
        assert_eq!(book.scan(87.0, ScanPolicy::FullCoverage).len(), 0);
        assert_eq!(book.scan(88.5, ScanPolicy::FullCoverage).len(), 1);
    }

    #[test]
    fn rescale_restores_set_total() {
        let mut book = ExitBook::default();
        book.insert(tp(110.0, 0.25));
        book.insert(tp(120.0, 0.25));
        book.remove_all(ExitKind::TakeProfit, &[0]);
        let factor = book.rescale(ExitKind::TakeProfit, 0.25).unwrap();
        assert_relative_eq!(factor, 2.0);
        assert_relative_eq!(book.pct_sum(ExitKind::TakeProfit), 0.5);
    }

    #[test]
    fn rescale_skips_empty_set() {
        let mut book = ExitBook::default();
        assert_eq!(book.rescale(ExitKind::StopLoss, 0.5), None);
    }

    #[test]
    fn scan_policy_parses() {
        assert_eq!("full".parse::<ScanPolicy>().unwrap(), ScanPolicy::FullCoverage);
        assert_eq!("Partial".parse::<ScanPolicy>().unwrap(), ScanPolicy::Partial);
        assert!("sometimes".parse::<ScanPolicy>().is_err());
    }
}
