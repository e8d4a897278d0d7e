//! Simple Moving Average.
//!
//! SMA(n)[i] = mean(C[i-n+1..=i]). Rolling sum, so O(len).
//! Warmup: first (n-1) bars are invalid.

use crate::domain::error::InsufficientData;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_sma(bars: &[Bar], period: usize) -> Result<IndicatorSeries, InsufficientData> {
    let indicator_type = IndicatorType::Sma(period);
    indicator_type.require(bars.len())?;

    let mut values = Vec::with_capacity(bars.len());
    let mut sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        sum += bar.close;
        if i >= period {
            sum -= bars[i - period].close;
        }
        let valid = i + 1 >= period;
        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Simple(if valid { sum / period as f64 } else { 0.0 }),
        });
    }

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}
