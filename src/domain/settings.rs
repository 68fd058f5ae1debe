//! Strategy settings and default exit rules, read and validated from config.
//!
//! ```ini
//! [strategy]
//! strategy_id = momentum-1h
//! entry_size = 1.0
//!
//! [exits]
//! stop_loss_pct = 0.05
//! stop_loss_exit = 0.5
//! trailing_stop_loss_pct = 0.1
//! trailing_stop_loss_exit = 0.5
//! scan_policy = full
//! ```
//!
//! A zero percentage disables the rule. The exit fractions of the enabled
//! rules must not add up to more than 1.

use crate::domain::error::SoltradeError;
use crate::domain::exit_book::ScanPolicy;
use crate::ports::config_port::ConfigPort;

const STRATEGY: &str = "strategy";
const EXITS: &str = "exits";

#[derive(Debug, Clone, PartialEq)]
pub struct ExitDefaults {
    pub stop_loss_pct: f64,
    pub stop_loss_exit: f64,
    pub take_profit_pct: f64,
    pub take_profit_exit: f64,
    pub trailing_stop_loss_pct: f64,
    pub trailing_stop_loss_exit: f64,
    pub trailing_take_profit_target_pct: f64,
    pub trailing_take_profit_trail_pct: f64,
    pub trailing_take_profit_exit: f64,
    pub true_trailing_take_profit_pct: f64,
    pub true_trailing_take_profit_exit: f64,
    pub scan_policy: ScanPolicy,
}

impl Default for ExitDefaults {
    fn default() -> Self {
        ExitDefaults {
            stop_loss_pct: 0.05,
            stop_loss_exit: 1.0,
            take_profit_pct: 0.0,
            take_profit_exit: 1.0,
            trailing_stop_loss_pct: 0.0,
            trailing_stop_loss_exit: 1.0,
            trailing_take_profit_target_pct: 0.0,
            trailing_take_profit_trail_pct: 0.0,
            trailing_take_profit_exit: 1.0,
            true_trailing_take_profit_pct: 0.0,
            true_trailing_take_profit_exit: 1.0,
            scan_policy: ScanPolicy::FullCoverage,
        }
    }
}

impl ExitDefaults {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SoltradeError> {
        let d = ExitDefaults::default();
        let scan_policy = match config.get_string(EXITS, "scan_policy") {
            Some(raw) => raw.parse().map_err(|_| SoltradeError::ConfigInvalid {
                section: EXITS.to_string(),
                key: "scan_policy".to_string(),
                reason: format!("expected `full` or `partial`, got `{raw}`"),
            })?,
            None => d.scan_policy,
        };

        let defaults = ExitDefaults {
            stop_loss_pct: config.get_double(EXITS, "stop_loss_pct", d.stop_loss_pct),
            stop_loss_exit: config.get_double(EXITS, "stop_loss_exit", d.stop_loss_exit),
            take_profit_pct: config.get_double(EXITS, "take_profit_pct", d.take_profit_pct),
            take_profit_exit: config.get_double(EXITS, "take_profit_exit", d.take_profit_exit),
            trailing_stop_loss_pct: config.get_double(
                EXITS,
                "trailing_stop_loss_pct",
                d.trailing_stop_loss_pct,
            ),
            trailing_stop_loss_exit: config.get_double(
                EXITS,
                "trailing_stop_loss_exit",
                d.trailing_stop_loss_exit,
            ),
            trailing_take_profit_target_pct: config.get_double(
                EXITS,
                "trailing_take_profit_target_pct",
                d.trailing_take_profit_target_pct,
            ),
            trailing_take_profit_trail_pct: config.get_double(
                EXITS,
                "trailing_take_profit_trail_pct",
                d.trailing_take_profit_trail_pct,
            ),
            trailing_take_profit_exit: config.get_double(
                EXITS,
                "trailing_take_profit_exit",
                d.trailing_take_profit_exit,
            ),
            true_trailing_take_profit_pct: config.get_double(
                EXITS,
                "true_trailing_take_profit_pct",
                d.true_trailing_take_profit_pct,
            ),
            true_trailing_take_profit_exit: config.get_double(
                EXITS,
                "true_trailing_take_profit_exit",
                d.true_trailing_take_profit_exit,
            ),
            scan_policy,
        };
        defaults.validate()?;
        Ok(defaults)
    }

    pub fn validate(&self) -> Result<(), SoltradeError> {
        validate_range("stop_loss_pct", self.stop_loss_pct, 0.0, 1.0, false)?;
        validate_range("take_profit_pct", self.take_profit_pct, 0.0, f64::MAX, true)?;
        validate_range(
            "trailing_stop_loss_pct",
            self.trailing_stop_loss_pct,
            0.0,
            1.0,
            false,
        )?;
        validate_range(
            "trailing_take_profit_target_pct",
            self.trailing_take_profit_target_pct,
            0.0,
            f64::MAX,
            true,
        )?;
        validate_range(
            "trailing_take_profit_trail_pct",
            self.trailing_take_profit_trail_pct,
            0.0,
            1.0,
            false,
        )?;
        validate_range(
            "true_trailing_take_profit_pct",
            self.true_trailing_take_profit_pct,
            0.0,
            f64::MAX,
            true,
        )?;

        for (key, exit) in [
            ("stop_loss_exit", self.stop_loss_exit),
            ("take_profit_exit", self.take_profit_exit),
            ("trailing_stop_loss_exit", self.trailing_stop_loss_exit),
            ("trailing_take_profit_exit", self.trailing_take_profit_exit),
            ("true_trailing_take_profit_exit", self.true_trailing_take_profit_exit),
        ] {
            if !(exit.is_finite() && exit > 0.0 && exit <= 1.0) {
                return Err(invalid(EXITS, key, "exit fraction must be in (0, 1]"));
            }
        }

        let total = self.enabled_exit_sum();
        if total > 1.0 + 1e-9 {
            return Err(invalid(
                EXITS,
                "stop_loss_exit",
                &format!("enabled exit fractions sum to {total}, which exceeds 1"),
            ));
        }
        Ok(())
    }

    pub fn stop_loss_enabled(&self) -> bool {
        self.stop_loss_pct > 0.0
    }

    pub fn take_profit_enabled(&self) -> bool {
        self.take_profit_pct > 0.0
    }

    pub fn trailing_stop_loss_enabled(&self) -> bool {
        self.trailing_stop_loss_pct > 0.0
    }

    /// Enabled by a non-zero trail; a zero target arms on the first tick.
    pub fn trailing_take_profit_enabled(&self) -> bool {
        self.trailing_take_profit_trail_pct > 0.0
    }

    pub fn true_trailing_take_profit_enabled(&self) -> bool {
        self.true_trailing_take_profit_pct > 0.0
    }

    /// Sum of the exit fractions of every enabled rule.
    pub fn enabled_exit_sum(&self) -> f64 {
        [
            (self.stop_loss_enabled(), self.stop_loss_exit),
            (self.take_profit_enabled(), self.take_profit_exit),
            (self.trailing_stop_loss_enabled(), self.trailing_stop_loss_exit),
            (
                self.trailing_take_profit_enabled(),
                self.trailing_take_profit_exit,
            ),
            (
                self.true_trailing_take_profit_enabled(),
                self.true_trailing_take_profit_exit,
            ),
        ]
        .iter()
        .filter(|(enabled, _)| *enabled)
        .map(|(_, exit)| exit)
        .sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub strategy_id: String,
    pub entry_size: f64,
    pub exits: ExitDefaults,
}

impl Settings {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SoltradeError> {
        let strategy_id = match config.get_string(STRATEGY, "strategy_id") {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => {
                return Err(SoltradeError::ConfigMissing {
                    section: STRATEGY.to_string(),
                    key: "strategy_id".to_string(),
                });
            }
        };

        let entry_size = config.get_double(STRATEGY, "entry_size", 1.0);
        if !(entry_size.is_finite() && entry_size > 0.0) {
            return Err(invalid(STRATEGY, "entry_size", "entry_size must be positive"));
        }

        Ok(Settings {
            strategy_id,
            entry_size,
            exits: ExitDefaults::from_config(config)?,
        })
    }
}

fn validate_range(
    key: &str,
    value: f64,
    min: f64,
    max: f64,
    max_inclusive: bool,
) -> Result<(), SoltradeError> {
    let below_max = if max_inclusive { value <= max } else { value < max };
    if value.is_finite() && value >= min && below_max {
        Ok(())
    } else {
        let upper = if max_inclusive {
            "".to_string()
        } else {
            format!(" and below {max}")
        };
        Err(invalid(
            EXITS,
            key,
            &format!("{key} must be at least {min}{upper}"),
        ))
    }
}

fn invalid(section: &str, key: &str, reason: &str) -> SoltradeError {
    SoltradeError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}
