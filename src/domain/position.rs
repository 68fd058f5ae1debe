//! Market position lifecycle.
//!
//! A [`MarketPosition`] tracks one token held by a strategy: the entries that
//! built it, the exits confirmed against it, and the [`ExitBook`] of rules that
//! decide when it should be reduced.
//!
//! # Lifecycle
//!
//! 1. [`MarketPosition::open`] from a fully specified [`OpenPosition`]
//! 2. [`MarketPosition::add_entry`] to average in
//! 3. [`MarketPosition::update`] on every price tick, returning triggered rules
//! 4. [`MarketPosition::confirm`] with the triggered rules the executor accepted
//!
//! `position_size` is the fraction of the aggregate entered quantity still held:
//! 1.0 after the entries, shrinking with every confirmed exit. Absolute
//! quantities are kept alongside so both views stay available.

use crate::domain::diagnostic::{Diagnostic, StaleReference};
use crate::domain::error::{SoltradeError, require_positive};
use crate::domain::exit_book::{ExitBook, ScanPolicy, TriggeredExit};
use crate::domain::exit_rule::{
    ExitCondition, ExitKind, ExitRule, StopLoss, TakeProfit, TrailingStopLoss, TrailingTakeProfit,
    TrueTrailingTakeProfit,
};
use crate::domain::settings::ExitDefaults;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

const EPSILON: f64 = 1e-9;

/// Everything needed to open a position. All fields are required.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenPosition {
    pub token: String,
    pub txid: String,
    pub entry_price: f64,
    pub entry_size: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord {
    pub txid: String,
    pub entry_price: f64,
    pub entry_size: f64,
    pub timestamp: DateTime<Utc>,
}

/// A confirmed exit, as handed to the persistence layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitRecord {
    pub txid: String,
    pub kind: ExitKind,
    pub pct_exited: f64,
    pub quantity_exited: f64,
    pub resulting_position_size: f64,
}

/// A triggered rule the executor accepted, with the transaction that filled it.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmedExit {
    pub txid: String,
    pub exit: TriggeredExit,
}

impl ConfirmedExit {
    pub fn new(txid: impl Into<String>, exit: TriggeredExit) -> Self {
        ConfirmedExit {
            txid: txid.into(),
            exit,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub triggered: Vec<TriggeredExit>,
    pub diagnostics: Vec<Diagnostic>,
}

impl UpdateOutcome {
    pub fn is_action(&self) -> bool {
        !self.triggered.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfirmOutcome {
    /// Fraction of the pre-confirm position that remains.
    pub remaining: f64,
    pub closed: bool,
    pub exits: Vec<ExitRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarketPosition {
    token: String,
    avg_price: f64,
    current_price: f64,
    last_price: f64,
    highest_price: f64,
    lowest_price: f64,
    position_size: f64,
    total_entered: f64,
    total_exited: f64,
    entries: Vec<EntryRecord>,
    exits: Vec<ExitRecord>,
    exit_book: ExitBook,
    scan_policy: ScanPolicy,
}

impl MarketPosition {
    pub fn open(open: OpenPosition) -> Result<Self, SoltradeError> {
        let OpenPosition {
            token,
            txid,
            entry_price,
            entry_size,
            timestamp,
        } = open;

        if token.trim().is_empty() {
            return Err(SoltradeError::invalid("token", "must not be empty"));
        }
        if txid.trim().is_empty() {
            return Err(SoltradeError::invalid("txid", "must not be empty"));
        }
        require_positive("entry_price", entry_price)?;
        require_positive("entry_size", entry_size)?;

        Ok(MarketPosition {
            token,
            avg_price: entry_price,
            current_price: entry_price,
            last_price: entry_price,
            highest_price: entry_price,
            lowest_price: entry_price,
            position_size: 1.0,
            total_entered: entry_size,
            total_exited: 0.0,
            entries: vec![EntryRecord {
                txid,
                entry_price,
                entry_size,
                timestamp,
            }],
            exits: Vec::new(),
            exit_book: ExitBook::default(),
            scan_policy: ScanPolicy::default(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn avg_price(&self) -> f64 {
        self.avg_price
    }

    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    pub fn last_price(&self) -> f64 {
        self.last_price
    }

    pub fn highest_price(&self) -> f64 {
        self.highest_price
    }

    pub fn lowest_price(&self) -> f64 {
        self.lowest_price
    }

    /// Outstanding fraction of the aggregate entered quantity.
    pub fn position_size(&self) -> f64 {
        self.position_size
    }

    pub fn total_entered(&self) -> f64 {
        self.total_entered
    }

    pub fn total_exited(&self) -> f64 {
        self.total_exited
    }

    /// Outstanding quantity in entry units.
    pub fn outstanding_size(&self) -> f64 {
        (self.total_entered - self.total_exited).max(0.0)
    }

    pub fn unrealized_pnl(&self) -> f64 {
        self.outstanding_size() * (self.current_price - self.avg_price)
    }

    pub fn is_closed(&self) -> bool {
        self.position_size <= EPSILON
    }

    pub fn entries(&self) -> &[EntryRecord] {
        &self.entries
    }

    pub fn exits(&self) -> &[ExitRecord] {
        &self.exits
    }

    pub fn exit_book(&self) -> &ExitBook {
        &self.exit_book
    }

    /// Sum of `pct_of_position` across every active exit rule.
    pub fn active_exit_pct(&self) -> f64 {
        self.exit_book.active_pct_sum()
    }

    pub fn scan_policy(&self) -> ScanPolicy {
        self.scan_policy
    }

    pub fn set_scan_policy(&mut self, policy: ScanPolicy) {
        self.scan_policy = policy;
    }

    /// Records another entry and recomputes average price and size from scratch.
    pub fn add_entry(
        &mut self,
        txid: impl Into<String>,
        entry_price: f64,
        entry_size: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<EntryRecord, SoltradeError> {
        let txid = txid.into();
        if txid.trim().is_empty() {
            return Err(SoltradeError::invalid("txid", "must not be empty"));
        }
        require_positive("entry_price", entry_price)?;
        require_positive("entry_size", entry_size)?;
        if self.has_txid(&txid) {
            return Err(SoltradeError::DuplicateTransaction { txid });
        }

        let record = EntryRecord {
            txid,
            entry_price,
            entry_size,
            timestamp,
        };
        self.entries.push(record.clone());
        self.recalculate();
        Ok(record)
    }

    fn recalculate(&mut self) {
        let total_value: f64 = self
            .entries
            .iter()
            .map(|e| e.entry_price * e.entry_size)
            .sum();
        let total_entered: f64 = self.entries.iter().map(|e| e.entry_size).sum();
        let total_exited: f64 = self.exits.iter().map(|e| e.quantity_exited).sum();

        self.avg_price = total_value / total_entered;
        self.total_entered = total_entered;
        self.total_exited = total_exited.min(total_entered);
        self.position_size = self.outstanding_size() / total_entered;
    }

    fn has_txid(&self, txid: &str) -> bool {
        self.entries.iter().any(|e| e.txid == txid) || self.exits.iter().any(|e| e.txid == txid)
    }

    pub fn add_stop_loss(&mut self, sl_pct: f64, pct_exit: f64) -> Result<usize, SoltradeError> {
        let rule = StopLoss::from_price(self.current_price, sl_pct, pct_exit)?;
        Ok(self.exit_book.insert(rule.into_rule()))
    }

    pub fn add_take_profit(&mut self, tp_pct: f64, pct_exit: f64) -> Result<usize, SoltradeError> {
        let rule = TakeProfit::from_price(self.current_price, tp_pct, pct_exit)?;
        Ok(self.exit_book.insert(rule.into_rule()))
    }

    pub fn add_trailing_stop_loss(
        &mut self,
        trail_pct: f64,
        pct_exit: f64,
    ) -> Result<usize, SoltradeError> {
        let rule = TrailingStopLoss::from_price(self.current_price, trail_pct, pct_exit)?;
        Ok(self.exit_book.insert(rule.into_rule()))
    }

    pub fn add_trailing_take_profit(
        &mut self,
        profit_target_pct: f64,
        trail_pct: f64,
        pct_exit: f64,
    ) -> Result<usize, SoltradeError> {
        let rule = TrailingTakeProfit::from_price(
            self.current_price,
            profit_target_pct,
            trail_pct,
            pct_exit,
        )?;
        Ok(self.exit_book.insert(rule.into_rule()))
    }

    pub fn add_true_trailing_take_profit(
        &mut self,
        trail_pct: f64,
        pct_exit: f64,
    ) -> Result<usize, SoltradeError> {
        let rule = TrueTrailingTakeProfit::from_price(self.current_price, trail_pct, pct_exit)?;
        Ok(self.exit_book.insert(rule.into_rule()))
    }

    /// Attaches every enabled default rule and adopts the configured scan policy.
    pub fn add_default_exits(&mut self, defaults: &ExitDefaults) -> Result<(), SoltradeError> {
        if defaults.take_profit_enabled() {
            self.add_take_profit(defaults.take_profit_pct, defaults.take_profit_exit)?;
        }
        if defaults.trailing_take_profit_enabled() {
            self.add_trailing_take_profit(
                defaults.trailing_take_profit_target_pct,
                defaults.trailing_take_profit_trail_pct,
                defaults.trailing_take_profit_exit,
            )?;
        }
        if defaults.true_trailing_take_profit_enabled() {
            self.add_true_trailing_take_profit(
                defaults.true_trailing_take_profit_pct,
                defaults.true_trailing_take_profit_exit,
            )?;
        }
        if defaults.stop_loss_enabled() {
            self.add_stop_loss(defaults.stop_loss_pct, defaults.stop_loss_exit)?;
        }
        if defaults.trailing_stop_loss_enabled() {
            self.add_trailing_stop_loss(
                defaults.trailing_stop_loss_pct,
                defaults.trailing_stop_loss_exit,
            )?;
        }
        self.scan_policy = defaults.scan_policy;
        Ok(())
    }

    pub fn get_exit_condition(
        &self,
        kind: ExitKind,
        index: usize,
    ) -> Result<ExitRule, StaleReference> {
        self.exit_book.get(kind, index)
    }

    pub fn remove_exit_condition(
        &mut self,
        kind: ExitKind,
        index: usize,
    ) -> Result<ExitRule, StaleReference> {
        self.exit_book.remove(kind, index)
    }

    /// Refreshes the price, moves trailing rules and scans for triggered exits.
    ///
    /// A closed position still tracks prices but never reports triggers.
    pub fn update(&mut self, price: f64) -> Result<UpdateOutcome, SoltradeError> {
        require_positive("price", price)?;

        self.last_price = self.current_price;
        self.current_price = price;
        self.highest_price = self.highest_price.max(price);
        self.lowest_price = self.lowest_price.min(price);

        let mut diagnostics = Vec::new();
        if self.exit_book.has_trailing() {
            diagnostics.extend(self.exit_book.ratchet(
                &self.token,
                price,
                price >= self.highest_price,
                price <= self.lowest_price,
            ));
        }

        if self.is_closed() {
            return Ok(UpdateOutcome {
                triggered: Vec::new(),
                diagnostics,
            });
        }

        let triggered = self.exit_book.scan(price, self.scan_policy);
        for hit in &triggered {
            diagnostics.push(Diagnostic::Triggered {
                token: self.token.clone(),
                kind: hit.kind,
                index: hit.index,
                exit_price: self
                    .exit_book
                    .get(hit.kind, hit.index)
                    .ok()
                    .and_then(|rule| rule.exit_price()),
                current_price: price,
            });
        }

        Ok(UpdateOutcome {
            triggered,
            diagnostics,
        })
    }

    /// Applies the exits the executor accepted.
    ///
    /// Indices are resolved against the exit sets as the preceding scan saw
    /// them; stale or repeated indices are skipped and reported. Once the
    /// accepted fractions reach 1 the position is closed and later entries are
    /// ignored. Otherwise the position shrinks by `position_size * exit_amt` and
    /// each affected set is rescaled to its previous total.
    pub fn confirm(&mut self, accepted: &[ConfirmedExit]) -> Result<ConfirmOutcome, SoltradeError> {
        let mut seen = HashSet::new();
        for confirmed in accepted {
            if confirmed.txid.trim().is_empty() {
                return Err(SoltradeError::invalid("txid", "must not be empty"));
            }
            let pct = confirmed.exit.pct;
            if !(pct.is_finite() && pct > 0.0 && pct <= 1.0 + EPSILON) {
                return Err(SoltradeError::invalid(
                    "pct_exited",
                    format!("must be in (0, 1], got {pct}"),
                ));
            }
            if self.has_txid(&confirmed.txid) || !seen.insert(confirmed.txid.as_str()) {
                return Err(SoltradeError::DuplicateTransaction {
                    txid: confirmed.txid.clone(),
                });
            }
        }

        let mut diagnostics = Vec::new();
        let mut claimed: Vec<(ExitKind, usize)> = Vec::new();
        let mut applied: Vec<(&str, ExitKind, f64)> = Vec::new();
        let mut impacted: BTreeMap<ExitKind, f64> = BTreeMap::new();
        let mut exit_amt = 0.0;
        let mut closed = false;

        for confirmed in accepted {
            let TriggeredExit { kind, pct, index } = confirmed.exit;
            let len = self.exit_book.len(kind);
            if index >= len || claimed.contains(&(kind, index)) {
                diagnostics.push(
                    StaleReference { kind, index, len }.into_diagnostic(&self.token, "confirm"),
                );
                continue;
            }

            let pct = pct.min(1.0 - exit_amt);
            claimed.push((kind, index));
            applied.push((confirmed.txid.as_str(), kind, pct));
            *impacted.entry(kind).or_default() += pct;
            exit_amt += pct;

            if exit_amt >= 1.0 - EPSILON {
                closed = true;
                break;
            }
        }

        for kind in ExitKind::SCAN_ORDER {
            let indices: Vec<usize> = claimed
                .iter()
                .filter(|(k, _)| *k == kind)
                .map(|(_, index)| *index)
                .collect();
            if !indices.is_empty() {
                self.exit_book.remove_all(kind, &indices);
            }
        }

        let outstanding = self.outstanding_size();
        if closed {
            self.position_size = 0.0;
            self.total_exited = self.total_entered;
        } else {
            self.position_size -= self.position_size * exit_amt;
            self.total_exited += outstanding * exit_amt;
        }

        let records: Vec<ExitRecord> = applied
            .into_iter()
            .map(|(txid, kind, pct)| ExitRecord {
                txid: txid.to_string(),
                kind,
                pct_exited: pct,
                quantity_exited: outstanding * pct,
                resulting_position_size: self.position_size,
            })
            .collect();
        self.exits.extend(records.iter().cloned());

        if closed {
            return Ok(ConfirmOutcome {
                remaining: 0.0,
                closed: true,
                exits: records,
                diagnostics,
            });
        }

        for (kind, removed) in impacted {
            if let Some(factor) = self.exit_book.rescale(kind, removed) {
                diagnostics.push(Diagnostic::Rescaled {
                    token: self.token.clone(),
                    kind,
                    factor,
                });
            }
        }

        Ok(ConfirmOutcome {
            remaining: 1.0 - exit_amt,
            closed: false,
            exits: records,
            diagnostics,
        })
    }
}
