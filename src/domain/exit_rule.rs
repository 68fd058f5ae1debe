//! Exit rule value types.
//!
//! Each of the five rule kinds is a small `Copy` struct. Ratchets build a
//! replacement value instead of editing fields in place, and [`ExitRule`] is the
//! sum type handed out when a caller needs a rule without knowing its kind.

use crate::domain::error::SoltradeError;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExitKind {
    TakeProfit,
    TrailingTakeProfit,
    TrueTrailingTakeProfit,
    StopLoss,
    TrailingStopLoss,
}

impl ExitKind {
    /// Order in which the sets are scanned for triggers.
    pub const SCAN_ORDER: [ExitKind; 5] = [
        ExitKind::TakeProfit,
        ExitKind::TrailingTakeProfit,
        ExitKind::TrueTrailingTakeProfit,
        ExitKind::StopLoss,
        ExitKind::TrailingStopLoss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExitKind::TakeProfit => "take_profit",
            ExitKind::TrailingTakeProfit => "trailing_take_profit",
            ExitKind::TrueTrailingTakeProfit => "true_trailing_take_profit",
            ExitKind::StopLoss => "stop_loss",
            ExitKind::TrailingStopLoss => "trailing_stop_loss",
        }
    }
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ExitKind {
    type Err = SoltradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExitKind::SCAN_ORDER
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SoltradeError::invalid("exit_kind", format!("unknown exit kind `{s}`")))
    }
}

/// Behaviour shared by the five rule structs.
pub trait ExitCondition: Copy + fmt::Debug {
    const KIND: ExitKind;

    fn pct_of_position(&self) -> f64;

    fn with_pct_of_position(self, pct: f64) -> Self;

    /// Price the rule currently fires at; `None` while it cannot fire.
    fn exit_price(&self) -> Option<f64>;

    fn is_triggered(&self, price: f64) -> bool;

    /// Evaluation order within the rule's own set.
    fn precedence(&self, other: &Self) -> Ordering;

    fn into_rule(self) -> ExitRule;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TakeProfit {
    pub exit_price: f64,
    pub pct_of_position: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StopLoss {
    pub exit_price: f64,
    pub pct_of_position: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingStopLoss {
    pub exit_price: f64,
    pub trail_pct: f64,
    pub pct_of_position: f64,
}

/// Unarmed until the price reaches `trigger_price`; then trails the high by `trail_pct`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrailingTakeProfit {
    pub exit_price: Option<f64>,
    pub trail_pct: f64,
    pub trigger_price: f64,
    pub pct_of_position: f64,
}

/// A profit target held `trail_pct` above the lowest price seen, firing on a rebound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrueTrailingTakeProfit {
    pub exit_price: f64,
    pub trail_pct: f64,
    pub pct_of_position: f64,
}

impl TakeProfit {
    pub fn from_price(price: f64, tp_pct: f64, pct_exit: f64) -> Result<Self, SoltradeError> {
        let tp_pct = upside_pct("tp_pct", tp_pct)?;
        Ok(TakeProfit {
            exit_price: price * (1.0 + tp_pct),
            pct_of_position: exit_fraction(pct_exit)?,
        })
    }
}

impl StopLoss {
    pub fn from_price(price: f64, sl_pct: f64, pct_exit: f64) -> Result<Self, SoltradeError> {
        let sl_pct = downside_pct("sl_pct", sl_pct)?;
        Ok(StopLoss {
            exit_price: price * (1.0 - sl_pct),
            pct_of_position: exit_fraction(pct_exit)?,
        })
    }
}

impl TrailingStopLoss {
    pub fn from_price(price: f64, trail_pct: f64, pct_exit: f64) -> Result<Self, SoltradeError> {
        let trail_pct = downside_pct("trail_pct", trail_pct)?;
        Ok(TrailingStopLoss {
            exit_price: price * (1.0 - trail_pct),
            trail_pct,
            pct_of_position: exit_fraction(pct_exit)?,
        })
    }

    /// Raises the stop to `trail_pct` below `price`; never lowers it.
    pub fn ratcheted(self, price: f64) -> Self {
        TrailingStopLoss {
            exit_price: self.exit_price.max(price * (1.0 - self.trail_pct)),
            ..self
        }
    }
}

impl TrailingTakeProfit {
    pub fn from_price(
        price: f64,
        profit_target_pct: f64,
        trail_pct: f64,
        pct_exit: f64,
    ) -> Result<Self, SoltradeError> {
        let profit_target_pct = upside_pct("profit_target_pct", profit_target_pct)?;
        Ok(TrailingTakeProfit {
            exit_price: None,
            trail_pct: downside_pct("trail_pct", trail_pct)?,
            trigger_price: price * (1.0 + profit_target_pct),
            pct_of_position: exit_fraction(pct_exit)?,
        })
    }

    pub fn is_armed(&self) -> bool {
        self.exit_price.is_some()
    }

    /// Sets the exit price the first time `price` reaches the trigger.
    pub fn armed(self, price: f64) -> Self {
        TrailingTakeProfit {
            exit_price: Some(price * (1.0 - self.trail_pct)),
            ..self
        }
    }

    /// Raises an armed exit to `trail_pct` below `price`; never lowers it.
    pub fn ratcheted(self, price: f64) -> Self {
        let candidate = price * (1.0 - self.trail_pct);
        TrailingTakeProfit {
            exit_price: self.exit_price.map(|exit| exit.max(candidate)),
            ..self
        }
    }
}

impl TrueTrailingTakeProfit {
    pub fn from_price(price: f64, trail_pct: f64, pct_exit: f64) -> Result<Self, SoltradeError> {
        let trail_pct = upside_pct("trail_pct", trail_pct)?;
        Ok(TrueTrailingTakeProfit {
            exit_price: price * (1.0 + trail_pct),
            trail_pct,
            pct_of_position: exit_fraction(pct_exit)?,
        })
    }

    /// Lowers the target to `trail_pct` above `price`; never raises it.
    pub fn ratcheted(self, price: f64) -> Self {
        TrueTrailingTakeProfit {
            exit_price: self.exit_price.min(price * (1.0 + self.trail_pct)),
            ..self
        }
    }
}

impl ExitCondition for TakeProfit {
    const KIND: ExitKind = ExitKind::TakeProfit;

    fn pct_of_position(&self) -> f64 {
        self.pct_of_position
    }

    fn with_pct_of_position(self, pct: f64) -> Self {
        TakeProfit {
            pct_of_position: pct,
            ..self
        }
    }

    fn exit_price(&self) -> Option<f64> {
        Some(self.exit_price)
    }

    fn is_triggered(&self, price: f64) -> bool {
        price >= self.exit_price
    }

    fn precedence(&self, other: &Self) -> Ordering {
        self.exit_price.total_cmp(&other.exit_price)
    }

    fn into_rule(self) -> ExitRule {
        ExitRule::TakeProfit(self)
    }
}

impl ExitCondition for StopLoss {
    const KIND: ExitKind = ExitKind::StopLoss;

    fn pct_of_position(&self) -> f64 {
        self.pct_of_position
    }

    fn with_pct_of_position(self, pct: f64) -> Self {
        StopLoss {
            pct_of_position: pct,
            ..self
        }
    }

    fn exit_price(&self) -> Option<f64> {
        Some(self.exit_price)
    }

    fn is_triggered(&self, price: f64) -> bool {
        price <= self.exit_price
    }

    // highest floor first
    fn precedence(&self, other: &Self) -> Ordering {
        other.exit_price.total_cmp(&self.exit_price)
    }

    fn into_rule(self) -> ExitRule {
        ExitRule::StopLoss(self)
    }
}

impl ExitCondition for TrailingStopLoss {
    const KIND: ExitKind = ExitKind::TrailingStopLoss;

    fn pct_of_position(&self) -> f64 {
        self.pct_of_position
    }

    fn with_pct_of_position(self, pct: f64) -> Self {
        TrailingStopLoss {
            pct_of_position: pct,
            ..self
        }
    }

    fn exit_price(&self) -> Option<f64> {
        Some(self.exit_price)
    }

    fn is_triggered(&self, price: f64) -> bool {
        price <= self.exit_price
    }

    fn precedence(&self, other: &Self) -> Ordering {
        self.trail_pct.total_cmp(&other.trail_pct)
    }

    fn into_rule(self) -> ExitRule {
        ExitRule::TrailingStopLoss(self)
    }
}

impl ExitCondition for TrailingTakeProfit {
    const KIND: ExitKind = ExitKind::TrailingTakeProfit;

    fn pct_of_position(&self) -> f64 {
        self.pct_of_position
    }

    fn with_pct_of_position(self, pct: f64) -> Self {
        TrailingTakeProfit {
            pct_of_position: pct,
            ..self
        }
    }

    fn exit_price(&self) -> Option<f64> {
        self.exit_price
    }

    fn is_triggered(&self, price: f64) -> bool {
        self.exit_price.is_some_and(|exit| price <= exit)
    }

    // armed rules first, then by exit price
    fn precedence(&self, other: &Self) -> Ordering {
        match (self.exit_price, other.exit_price) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }

    fn into_rule(self) -> ExitRule {
        ExitRule::TrailingTakeProfit(self)
    }
}

impl ExitCondition for TrueTrailingTakeProfit {
    const KIND: ExitKind = ExitKind::TrueTrailingTakeProfit;

    fn pct_of_position(&self) -> f64 {
        self.pct_of_position
    }

    fn with_pct_of_position(self, pct: f64) -> Self {
        TrueTrailingTakeProfit {
            pct_of_position: pct,
            ..self
        }
    }

    fn exit_price(&self) -> Option<f64> {
        Some(self.exit_price)
    }

    fn is_triggered(&self, price: f64) -> bool {
        price >= self.exit_price
    }

    fn precedence(&self, other: &Self) -> Ordering {
        self.trail_pct.total_cmp(&other.trail_pct)
    }

    fn into_rule(self) -> ExitRule {
        ExitRule::TrueTrailingTakeProfit(self)
    }
}

/// Any one exit rule, tagged with its kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExitRule {
    TakeProfit(TakeProfit),
    TrailingTakeProfit(TrailingTakeProfit),
    TrueTrailingTakeProfit(TrueTrailingTakeProfit),
    StopLoss(StopLoss),
    TrailingStopLoss(TrailingStopLoss),
}

impl ExitRule {
    pub fn kind(&self) -> ExitKind {
        match self {
            ExitRule::TakeProfit(_) => ExitKind::TakeProfit,
            ExitRule::TrailingTakeProfit(_) => ExitKind::TrailingTakeProfit,
            ExitRule::TrueTrailingTakeProfit(_) => ExitKind::TrueTrailingTakeProfit,
            ExitRule::StopLoss(_) => ExitKind::StopLoss,
            ExitRule::TrailingStopLoss(_) => ExitKind::TrailingStopLoss,
        }
    }

    pub fn pct_of_position(&self) -> f64 {
        match self {
            ExitRule::TakeProfit(r) => r.pct_of_position,
            ExitRule::TrailingTakeProfit(r) => r.pct_of_position,
            ExitRule::TrueTrailingTakeProfit(r) => r.pct_of_position,
            ExitRule::StopLoss(r) => r.pct_of_position,
            ExitRule::TrailingStopLoss(r) => r.pct_of_position,
        }
    }

    pub fn exit_price(&self) -> Option<f64> {
        match self {
            ExitRule::TakeProfit(r) => r.exit_price(),
            ExitRule::TrailingTakeProfit(r) => r.exit_price(),
            ExitRule::TrueTrailingTakeProfit(r) => r.exit_price(),
            ExitRule::StopLoss(r) => r.exit_price(),
            ExitRule::TrailingStopLoss(r) => r.exit_price(),
        }
    }

    pub fn is_triggered(&self, price: f64) -> bool {
        match self {
            ExitRule::TakeProfit(r) => r.is_triggered(price),
            ExitRule::TrailingTakeProfit(r) => r.is_triggered(price),
            ExitRule::TrueTrailingTakeProfit(r) => r.is_triggered(price),
            ExitRule::StopLoss(r) => r.is_triggered(price),
            ExitRule::TrailingStopLoss(r) => r.is_triggered(price),
        }
    }
}

fn exit_fraction(pct: f64) -> Result<f64, SoltradeError> {
    if pct.is_finite() && pct > 0.0 && pct <= 1.0 {
        Ok(pct)
    } else {
        Err(SoltradeError::invalid(
            "pct_exit",
            format!("must be in (0, 1], got {pct}"),
        ))
    }
}

fn downside_pct(field: &'static str, pct: f64) -> Result<f64, SoltradeError> {
    if pct.is_finite() && (0.0..1.0).contains(&pct) {
        Ok(pct)
    } else {
        Err(SoltradeError::invalid(field, format!("must be in [0, 1), got {pct}")))
    }
}

fn upside_pct(field: &'static str, pct: f64) -> Result<f64, SoltradeError> {
    if pct.is_finite() && pct >= 0.0 {
        Ok(pct)
    } else {
        Err(SoltradeError::invalid(
            field,
            format!("must be finite and non-negative, got {pct}"),
        ))
    }
}
