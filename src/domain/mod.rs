//! Core domain types and logic.

pub mod container;
pub mod diagnostic;
pub mod error;
pub mod exit_book;
pub mod exit_rule;
pub mod ohlcv;
pub mod position;
pub mod replay;
pub mod series;
pub mod series_table;
pub mod settings;
