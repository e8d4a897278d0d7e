//! Bollinger Bands.
//!
//! - Middle: SMA over n periods
//! - Upper: Middle + (multiplier × StdDev)
//! - Lower: Middle - (multiplier × StdDev)
//!
//! StdDev is the population standard deviation (divides by N, not N-1).
//! Default parameters: period=20, multiplier=2.0. Warmup: first (period-1)
//! bars are invalid.

use crate::domain::error::InsufficientData;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_bollinger(
    bars: &[Bar],
    period: usize,
    std_dev: f64,
) -> Result<IndicatorSeries, InsufficientData> {
    let indicator_type = IndicatorType::Bollinger { period, std_dev };
    indicator_type.require(bars.len())?;

    let mut values = Vec::with_capacity(bars.len());
    let warmup = period - 1;

    for (i, bar) in bars.iter().enumerate() {
        let valid = i >= warmup;

        let (upper, middle, lower) = if valid {
            let window = &bars[i + 1 - period..=i];
            let middle: f64 = window.iter().map(|b| b.close).sum::<f64>() / period as f64;
            let variance: f64 = window
                .iter()
                .map(|b| {
                    let diff = b.close - middle;
                    diff * diff
                })
                .sum::<f64>()
                / period as f64;
            let stddev = variance.sqrt();
            (middle + std_dev * stddev, middle, middle - std_dev * stddev)
        } else {
            (0.0, 0.0, 0.0)
        };

        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            },
        });
    }

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::make_bars;

    fn bands(series: &IndicatorSeries, i: usize) -> (f64, f64, f64) {
        match series.values[i].value {
            IndicatorValue::Bollinger {
                upper,
                middle,
                lower,
            } => (upper, middle, lower),
            _ => panic!("expected Bollinger value"),
        }
    }

    #[test]
    fn bollinger_warmup() {
        let bars = make_bars(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let series = calculate_bollinger(&bars, 3, 2.0).unwrap();

        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!(series.values[2].valid);
        assert!(series.values[4].valid);
    }

    #[test]
    fn bollinger_constant_values_collapse() {
        let bars = make_bars(&[100.0; 5]);
        let series = calculate_bollinger(&bars, 3, 2.0).unwrap();
        let (upper, middle, lower) = bands(&series, 2);
        assert!((middle - 100.0).abs() < f64::EPSILON);
        assert!((upper - 100.0).abs() < f64::EPSILON);
        assert!((lower - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn bollinger_basic_calculation() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let series = calculate_bollinger(&bars, 3, 2.0).unwrap();
        let (upper, middle, lower) = bands(&series, 2);

        let stddev = (200.0_f64 / 3.0).sqrt();
        assert!((middle - 20.0).abs() < 1e-10);
        assert!((upper - (20.0 + 2.0 * stddev)).abs() < 1e-10);
        assert!((lower - (20.0 - 2.0 * stddev)).abs() < 1e-10);
    }

    #[test]
    fn bollinger_symmetry() {
        let bars = make_bars(&[10.0, 25.0, 30.0]);
        let series = calculate_bollinger(&bars, 3, 1.5).unwrap();
        let (upper, middle, lower) = bands(&series, 2);
        assert!(((upper - middle) - (middle - lower)).abs() < 1e-10);
    }

    #[test]
    fn bollinger_multiplier_is_exact() {
        let bars = make_bars(&[10.0, 20.0, 30.0]);
        let series = calculate_bollinger(&bars, 3, 2.004).unwrap();
        let (upper, middle, _) = bands(&series, 2);
        let stddev = (200.0_f64 / 3.0).sqrt();
        assert!((upper - middle - 2.004 * stddev).abs() < 1e-10);
    }

    #[test]
    fn bollinger_insufficient_bars() {
        let bars = make_bars(&[10.0, 20.0]);
        assert!(calculate_bollinger(&bars, 20, 2.0).is_err());
    }
}
