//! Windowed numeric series and trailing-window statistics.
//!
//! Every query addresses samples relative to the *end* of the series:
//! - `lag`: offset of the window's last sample from the most recent one (0 = latest)
//! - `length`: number of samples in the window, counted backward from `lag`
//!
//! A window longer than the available history is clamped to `len - lag` samples.
//! Regression queries (`slope`, `predict`) span `length` steps, i.e. `length + 1`
//! samples, and are undefined rather than clamped when the history is too short.

/// The other side of a crossover comparison.
#[derive(Debug, Clone, Copy)]
pub enum CrossTarget<'a> {
    Series(&'a WindowedSeries),
    Value(f64),
}

impl CrossTarget<'_> {
    fn value_at(&self, lag: usize) -> Option<f64> {
        match self {
            CrossTarget::Series(series) => series.value_at(lag),
            CrossTarget::Value(v) => Some(*v),
        }
    }
}

impl From<f64> for CrossTarget<'_> {
    fn from(value: f64) -> Self {
        CrossTarget::Value(value)
    }
}

impl<'a> From<&'a WindowedSeries> for CrossTarget<'a> {
    fn from(series: &'a WindowedSeries) -> Self {
        CrossTarget::Series(series)
    }
}

#[derive(Debug, Clone, Copy)]
struct LinearFit {
    slope: f64,
    intercept: f64,
}

/// An immutable, chronologically ordered (oldest first) sequence of samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowedSeries {
    samples: Vec<f64>,
}

impl WindowedSeries {
    pub fn new(samples: Vec<f64>) -> Self {
        WindowedSeries { samples }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.samples
    }

    /// The sample `lag` steps back from the most recent one.
    pub fn value_at(&self, lag: usize) -> Option<f64> {
        let n = self.samples.len();
        if lag < n {
            Some(self.samples[n - 1 - lag])
        } else {
            None
        }
    }

    pub fn latest(&self) -> Option<f64> {
        self.value_at(0)
    }

    /// The clamped window of `length` samples ending `lag` steps back.
    pub fn window(&self, length: usize, lag: usize) -> &[f64] {
        let n = self.samples.len();
        if lag >= n {
            return &[];
        }
        let end = n - lag;
        let length = length.min(end);
        &self.samples[end - length..end]
    }

    pub fn mean(&self, length: usize, lag: usize) -> Option<f64> {
        mean_of(self.window(length, lag))
    }

    pub fn max(&self, length: usize, lag: usize) -> Option<f64> {
        self.window(length, lag).iter().copied().reduce(f64::max)
    }

    pub fn min(&self, length: usize, lag: usize) -> Option<f64> {
        self.window(length, lag).iter().copied().reduce(f64::min)
    }

    /// Population standard deviation over the window.
    pub fn std_dev(&self, length: usize, lag: usize) -> Option<f64> {
        let window = self.window(length, lag);
        let mean = mean_of(window)?;
        let variance = window
            .iter()
            .map(|v| {
                let diff = v - mean;
                diff * diff
            })
            .sum::<f64>()
            / window.len() as f64;
        Some(variance.sqrt())
    }

    /// Sample covariance (n - 1 denominator) over the window both series can supply.
    ///
    /// Returns 0.0 when fewer than two common samples are available.
    pub fn covariance(&self, other: &WindowedSeries, length: usize, lag: usize) -> f64 {
        let available = self
            .len()
            .saturating_sub(lag)
            .min(other.len().saturating_sub(lag));
        let length = length.min(available);
        if length < 2 {
            return 0.0;
        }

        let xs = self.window(length, lag);
        let ys = other.window(length, lag);
        let (Some(x_mean), Some(y_mean)) = (mean_of(xs), mean_of(ys)) else {
            return 0.0;
        };

        let co_moment: f64 = xs
            .iter()
            .zip(ys)
            .map(|(x, y)| (x - x_mean) * (y - y_mean))
            .sum();
        co_moment / (length - 1) as f64
    }

    /// True if the series moved from at-or-below `target` to strictly above it
    /// between offsets `lag + 1` and `lag`.
    pub fn crossed_above<'a>(&self, target: impl Into<CrossTarget<'a>>, lag: usize) -> bool {
        let target = target.into();
        self.crossing(target, lag)
            .is_some_and(|c| c.prev <= c.prev_target && c.curr > c.curr_target)
    }

    /// True if the series moved from at-or-above `target` to strictly below it
    /// between offsets `lag + 1` and `lag`.
    pub fn crossed_below<'a>(&self, target: impl Into<CrossTarget<'a>>, lag: usize) -> bool {
        let target = target.into();
        self.crossing(target, lag)
            .is_some_and(|c| c.prev >= c.prev_target && c.curr < c.curr_target)
    }

    pub fn has_crossed_above<'a>(
        &self,
        target: impl Into<CrossTarget<'a>>,
        lookback: usize,
    ) -> bool {
        let target = target.into();
        (0..=lookback).any(|lag| self.crossed_above(target, lag))
    }

    pub fn has_crossed_below<'a>(
        &self,
        target: impl Into<CrossTarget<'a>>,
        lookback: usize,
    ) -> bool {
        let target = target.into();
        (0..=lookback).any(|lag| self.crossed_below(target, lag))
    }

    pub fn is_above(&self, value: f64, lag: usize) -> bool {
        self.value_at(lag).is_some_and(|v| v > value)
    }

    pub fn is_below(&self, value: f64, lag: usize) -> bool {
        self.value_at(lag).is_some_and(|v| v < value)
    }

    /// Least-squares slope over the `length + 1` samples ending at `lag`.
    pub fn slope(&self, length: usize, lag: usize) -> Option<f64> {
        self.fit(length, lag).map(|fit| fit.slope)
    }

    pub fn is_rising(&self, length: usize, lag: usize) -> bool {
        self.slope(length, lag).is_some_and(|s| s > 0.0)
    }

    pub fn is_falling(&self, length: usize, lag: usize) -> bool {
        self.slope(length, lag).is_some_and(|s| s < 0.0)
    }

    /// Extrapolates the regression line `future_steps` past the window's last sample.
    pub fn predict(&self, future_steps: usize, length: usize, lag: usize) -> Option<f64> {
        self.fit(length, lag)
            .map(|fit| fit.intercept + fit.slope * (length + future_steps) as f64)
    }

    /// Mean percentage gain between consecutive samples of the window.
    pub fn average_gain(&self, length: usize, lag: usize) -> f64 {
        self.average_change(length, lag, |pct| pct.max(0.0))
    }

    /// Mean percentage loss (as a positive number) between consecutive samples.
    pub fn average_loss(&self, length: usize, lag: usize) -> f64 {
        self.average_change(length, lag, |pct| (-pct).max(0.0))
    }

    /// Relative strength index in [0, 100] built from `average_gain`/`average_loss`.
    /// A flat window reads 50.
    pub fn relative_strength(&self, length: usize, lag: usize) -> f64 {
        let gain = self.average_gain(length, lag);
        let loss = self.average_loss(length, lag);
        if loss == 0.0 {
            if gain == 0.0 { 50.0 } else { 100.0 }
        } else {
            100.0 - (100.0 / (1.0 + gain / loss))
        }
    }

    fn average_change(&self, length: usize, lag: usize, side: impl Fn(f64) -> f64) -> f64 {
        // transitions out of a zero sample have no defined percentage change
        let (total, count) = self
            .window(length, lag)
            .windows(2)
            .filter(|pair| pair[0] != 0.0)
            .map(|pair| side((pair[1] - pair[0]) / pair[0] * 100.0))
            .fold((0.0, 0usize), |(total, count), v| (total + v, count + 1));

        if count == 0 {
            0.0
        } else {
            total / count as f64
        }
    }

    fn fit(&self, length: usize, lag: usize) -> Option<LinearFit> {
        let n = self.samples.len();
        if lag.saturating_add(length) >= n {
            return None;
        }
        let end = n - lag;
        let ys = &self.samples[end - length - 1..end];

        let x_mean = length as f64 / 2.0;
        let y_mean = mean_of(ys)?;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (x, y) in ys.iter().enumerate() {
            let dx = x as f64 - x_mean;
            sxx += dx * dx;
            sxy += dx * (y - y_mean);
        }

        let slope = if sxx == 0.0 { 0.0 } else { sxy / sxx };
        Some(LinearFit {
            slope,
            intercept: y_mean - slope * x_mean,
        })
    }

    fn crossing(&self, target: CrossTarget<'_>, lag: usize) -> Option<Crossing> {
        Some(Crossing {
            curr: self.value_at(lag)?,
            prev: self.value_at(lag + 1)?,
            curr_target: target.value_at(lag)?,
            prev_target: target.value_at(lag + 1)?,
        })
    }
}

struct Crossing {
    curr: f64,
    prev: f64,
    curr_target: f64,
    prev_target: f64,
}

fn mean_of(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

impl From<Vec<f64>> for WindowedSeries {
    fn from(samples: Vec<f64>) -> Self {
        WindowedSeries::new(samples)
    }
}

impl FromIterator<f64> for WindowedSeries {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        WindowedSeries::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ascending() -> WindowedSeries {
        (1..=10).map(f64::from).collect()
    }

    #[test]
    fn mean_of_last_three() {
        let series = ascending();
        assert_relative_eq!(series.mean(3, 0).unwrap(), 9.0);
    }

    #[test]
    fn mean_with_lag() {
        let series = ascending();
        // [6, 7, 8]
        assert_relative_eq!(series.mean(3, 2).unwrap(), 7.0);
    }

    #[test]
    fn window_is_clamped() {
        let series = ascending();
        assert_eq!(series.window(50, 7), &[1.0, 2.0, 3.0]);
        assert_eq!(series.mean(50, 7), series.mean(3, 7));
        assert!(series.window(3, 10).is_empty());
        assert_eq!(series.mean(3, 10), None);
    }

    #[test]
    fn max_min() {
        let series = WindowedSeries::new(vec![5.0, 1.0, 9.0, 3.0, 4.0]);
        assert_eq!(series.max(3, 0), Some(9.0));
        assert_eq!(series.min(3, 0), Some(3.0));
        assert_eq!(series.max(2, 3), Some(5.0));
        assert_eq!(series.min(1, 5), None);
    }

    #[test]
    fn std_dev_population() {
        let series = WindowedSeries::new(vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert_relative_eq!(series.std_dev(8, 0).unwrap(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(series.std_dev(1, 0).unwrap(), 0.0);
    }

    #[test]
    fn covariance_of_linear_series() {
        let x: WindowedSeries = (1..=5).map(f64::from).collect();
        let y: WindowedSeries = (1..=5).map(|v| f64::from(v) * 2.0).collect();
        // var(1..=5) with n-1 = 2.5, scaled by 2
        assert_relative_eq!(x.covariance(&y, 5, 0), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn covariance_uses_shorter_history() {
        let x: WindowedSeries = (1..=10).map(f64::from).collect();
        let y = WindowedSeries::new(vec![2.0, 4.0, 6.0]);
        // y's window [2, 4, 6] against x's [8, 9, 10]
        assert_relative_eq!(x.covariance(&y, 10, 0), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn covariance_degenerate_is_zero() {
        let x = WindowedSeries::new(vec![1.0, 2.0]);
        assert_eq!(x.covariance(&x, 5, 1), 0.0);
        assert_eq!(x.covariance(&x, 5, 4), 0.0);
    }

    #[test]
    fn crossed_above_scalar() {
        let series = WindowedSeries::new(vec![1.0, 2.0, 3.0]);
        assert!(series.crossed_above(2.5, 0));
        assert!(!series.crossed_above(2.5, 1));
        assert!(!series.crossed_below(2.5, 0));
        assert!(!series.crossed_above(2.5, 2));
    }

    #[test]
    fn crossed_above_from_touching() {
        let series = WindowedSeries::new(vec![2.0, 3.0]);
        assert!(series.crossed_above(2.0, 0));
    }

    #[test]
    fn crossed_below_series() {
        let fast = WindowedSeries::new(vec![5.0, 6.0, 4.0]);
        let slow = WindowedSeries::new(vec![5.0, 5.0, 5.0]);
        assert!(fast.crossed_below(&slow, 0));
        assert!(!fast.crossed_above(&slow, 0));
        assert!(fast.crossed_above(&slow, 1));
    }

    #[test]
    fn crossing_needs_two_samples_on_both_sides() {
        let fast = WindowedSeries::new(vec![1.0, 2.0, 3.0]);
        let slow = WindowedSeries::new(vec![2.5]);
        assert!(!fast.crossed_above(&slow, 0));
    }

    #[test]
    fn has_crossed_within_lookback() {
        let series = WindowedSeries::new(vec![1.0, 3.0, 4.0, 5.0]);
        assert!(!series.has_crossed_above(2.0, 1));
        assert!(series.has_crossed_above(2.0, 2));
        assert!(!series.has_crossed_below(2.0, 10));
    }

    #[test]
    fn is_above_and_below() {
        let series = WindowedSeries::new(vec![1.0, 5.0]);
        assert!(series.is_above(4.0, 0));
        assert!(series.is_below(4.0, 1));
        assert!(!series.is_above(0.0, 2));
        assert!(!series.is_below(10.0, 2));
    }

    #[test]
    fn slope_of_line() {
        let series = ascending();
        assert_relative_eq!(series.slope(3, 0).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(series.slope(4, 5).unwrap(), 1.0, epsilon = 1e-12);
        assert!(series.is_rising(3, 0));
        assert!(!series.is_falling(3, 0));
    }

    #[test]
    fn slope_undefined_without_history() {
        let series = ascending();
        assert_eq!(series.slope(10, 0), None);
        assert_eq!(series.slope(5, 5), None);
        assert!(series.slope(5, 4).is_some());
        assert!(!series.is_rising(10, 0));
        assert!(!series.is_falling(10, 0));
    }

    #[test]
    fn slope_of_single_point_is_flat() {
        let series = ascending();
        assert_eq!(series.slope(0, 0), Some(0.0));
    }

    #[test]
    fn falling_series() {
        let series = WindowedSeries::new(vec![10.0, 8.0, 7.0, 3.0]);
        assert!(series.is_falling(3, 0));
    }

    #[test]
    fn predict_extends_line() {
        let series = ascending();
        // fit over [7, 8, 9, 10] at x = 0..=3, evaluated at x = 5
        assert_relative_eq!(series.predict(2, 3, 0).unwrap(), 12.0, epsilon = 1e-9);
        assert_relative_eq!(series.predict(1, 3, 0).unwrap(), 11.0, epsilon = 1e-9);
        assert_eq!(series.predict(1, 20, 0), None);
    }

    #[test]
    fn average_gain_and_loss() {
        // +10%, -50%, +100%
        let series = WindowedSeries::new(vec![10.0, 11.0, 5.5, 11.0]);
        assert_relative_eq!(series.average_gain(4, 0), 110.0 / 3.0, epsilon = 1e-9);
        assert_relative_eq!(series.average_loss(4, 0), 50.0 / 3.0, epsilon = 1e-9);
    }

    #[test]
    fn average_gain_skips_zero_prior() {
        let series = WindowedSeries::new(vec![0.0, 5.0, 10.0]);
        // only 5 -> 10 qualifies
        assert_relative_eq!(series.average_gain(3, 0), 100.0, epsilon = 1e-9);
        let zeros = WindowedSeries::new(vec![0.0, 5.0]);
        assert_eq!(zeros.average_gain(2, 0), 0.0);
        assert_eq!(zeros.average_loss(2, 0), 0.0);
    }

    #[test]
    fn relative_strength_bounds() {
        let up = ascending();
        assert_relative_eq!(up.relative_strength(5, 0), 100.0);
        let flat = WindowedSeries::new(vec![3.0, 3.0, 3.0]);
        assert_relative_eq!(flat.relative_strength(3, 0), 50.0);
        let down = WindowedSeries::new(vec![4.0, 2.0, 1.0]);
        assert_relative_eq!(down.relative_strength(3, 0), 0.0);
    }
}
