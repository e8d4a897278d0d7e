//! Average True Range with Wilder's smoothing.
//!
//! TR[0] = high - low; TR[i] = max(H-L, |H-C[i-1]|, |L-C[i-1]|).
//! Seed is the mean of the first n TRs, then ATR = (prev*(n-1) + TR) / n.

use crate::domain::error::InsufficientData;
use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::ohlcv::Bar;

pub fn calculate_atr(bars: &[Bar], period: usize) -> Result<IndicatorSeries, InsufficientData> {
    let indicator_type = IndicatorType::Atr(period);
    indicator_type.require(bars.len())?;

    let mut values = Vec::with_capacity(bars.len());
    let mut atr = 0.0;
    let mut seed_sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        let tr = if i == 0 {
            bar.high - bar.low
        } else {
            bar.true_range(bars[i - 1].close)
        };

        let valid = if i < period - 1 {
            seed_sum += tr;
            false
        } else if i == period - 1 {
            seed_sum += tr;
            atr = seed_sum / period as f64;
            true
        } else {
            atr = (atr * (period - 1) as f64 + tr) / period as f64;
            true
        };

        values.push(IndicatorPoint {
            timestamp: bar.timestamp,
            valid,
            value: IndicatorValue::Simple(if valid { atr } else { 0.0 }),
        });
    }

    Ok(IndicatorSeries {
        indicator_type,
        values,
    })
}
