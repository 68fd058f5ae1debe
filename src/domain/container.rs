//! Positions held by one strategy, keyed by token.

use crate::domain::error::SoltradeError;
use crate::domain::position::{MarketPosition, OpenPosition, UpdateOutcome};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PositionContainer {
    strategy_id: String,
    active_holdings: BTreeMap<String, MarketPosition>,
}

impl PositionContainer {
    pub fn new(strategy_id: impl Into<String>) -> Self {
        PositionContainer {
            strategy_id: strategy_id.into(),
            active_holdings: BTreeMap::new(),
        }
    }

    pub fn strategy_id(&self) -> &str {
        &self.strategy_id
    }

    /// Opens a position and stores it under its token, replacing any previous one.
    /// Returns the replaced position, if there was one.
    pub fn add_position(
        &mut self,
        open: OpenPosition,
    ) -> Result<Option<MarketPosition>, SoltradeError> {
        let position = MarketPosition::open(open)?;
        Ok(self
            .active_holdings
            .insert(position.token().to_string(), position))
    }

    pub fn get(&self, token: &str) -> Option<&MarketPosition> {
        self.active_holdings.get(token)
    }

    pub fn get_mut(&mut self, token: &str) -> Option<&mut MarketPosition> {
        self.active_holdings.get_mut(token)
    }

    pub fn remove(&mut self, token: &str) -> Option<MarketPosition> {
        self.active_holdings.remove(token)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.active_holdings.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.active_holdings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active_holdings.is_empty()
    }

    /// Positions in token order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &MarketPosition)> {
        self.active_holdings
            .iter()
            .map(|(token, position)| (token.as_str(), position))
    }

    /// Forwards a price to the position held in `token`.
    /// `None` when the strategy holds no such position.
    pub fn update(
        &mut self,
        token: &str,
        price: f64,
    ) -> Option<Result<UpdateOutcome, SoltradeError>> {
        self.active_holdings
            .get_mut(token)
            .map(|position| position.update(price))
    }

    /// Removes and returns every position whose size reached zero.
    pub fn prune_closed(&mut self) -> Vec<MarketPosition> {
        let closed: Vec<String> = self
            .active_holdings
            .iter()
            .filter(|(_, position)| position.is_closed())
            .map(|(token, _)| token.clone())
            .collect();
        closed
            .into_iter()
            .filter_map(|token| self.active_holdings.remove(&token))
            .collect()
    }
}
