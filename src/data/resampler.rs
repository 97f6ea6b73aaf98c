use chrono::{DateTime, Utc};

use crate::data::{
    candle::{Candle, CandleSeries},
    domain::Timeframe,
};

/// Floor a timestamp to the opening time of its bucket.
///
/// Flooring against the Unix epoch yields standard calendar alignment:
/// 1D buckets open at 00:00 UTC, intra-day buckets at minute 0 of the hour
/// with 5/15/30/60/240 offsets.
pub fn bucket_open(ts: DateTime<Utc>, timeframe: Timeframe) -> DateTime<Utc> {
    let width = timeframe.bucket_secs();
    let secs = ts.timestamp();
    let floored = secs - secs.rem_euclid(width);
    DateTime::<Utc>::from_timestamp(floored, 0).unwrap_or(ts)
}

/// Aggregate a 1m series into `timeframe` buckets.
///
/// Per bucket: open = first, high = max, low = min, close = last,
/// volume = sum. Empty buckets are dropped; the 1m timeframe is returned
/// unchanged. Deterministic and order-preserving.
pub fn resample(series: &CandleSeries, timeframe: Timeframe) -> CandleSeries {
    if timeframe.is_base() {
        return series.clone();
    }

    let mut out: Vec<Candle> = Vec::new();
    let mut current: Option<Candle> = None;

    for bar in series.iter() {
        let open_time = bucket_open(bar.time, timeframe);
        match current.as_mut() {
            Some(agg) if agg.time == open_time => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
            _ => {
                if let Some(done) = current.take() {
                    out.push(done);
                }
                current = Some(Candle {
                    time: open_time,
                    open: bar.open,
                    high: bar.high,
                    low: bar.low,
                    close: bar.close,
                    volume: bar.volume,
                });
            }
        }
    }
    if let Some(done) = current.take() {
        out.push(done);
    }

    tracing::debug!(
        timeframe = %timeframe,
        input_bars = series.len(),
        output_bars = out.len(),
        "resampled series"
    );

    CandleSeries::from_raw(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::domain::Price;
    use chrono::TimeZone;

    fn ts(minute: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(minute * 60, 0).unwrap()
    }

    fn candle(minute: i64, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Candle {
        Candle {
            time: ts(minute),
            open: Price(open),
            high: Price(high),
            low: Price(low),
            close: Price(close),
            volume,
        }
    }

    #[test]
    fn base_timeframe_is_returned_unchanged() {
        let series = CandleSeries::new(vec![
            candle(0, 100.0, 101.0, 99.0, 100.5, 10),
            candle(1, 100.5, 102.0, 100.0, 101.0, 20),
        ])
        .unwrap();

        let out = resample(&series, Timeframe::M1);
        assert_eq!(out, series);
    }

    #[test]
    fn aggregates_first_max_min_last_sum() {
        // Five 1m bars spanning one 5m bucket
        let series = CandleSeries::new(vec![
            candle(0, 100.0, 101.0, 99.5, 100.5, 10),
            candle(1, 100.5, 103.0, 100.0, 102.0, 10),
            candle(2, 102.0, 102.5, 98.0, 99.0, 10),
            candle(3, 99.0, 100.0, 98.5, 99.5, 10),
            candle(4, 99.5, 100.5, 99.0, 100.0, 10),
        ])
        .unwrap();

        let out = resample(&series, Timeframe::M5);
        assert_eq!(out.len(), 1, "one bucket expected");
        let bar = out[0];
        assert_eq!(bar.time, ts(0), "bucket opens at minute 0");
        assert_eq!(bar.open, Price(100.0), "open = first");
        assert_eq!(bar.high, Price(103.0), "high = max");
        assert_eq!(bar.low, Price(98.0), "low = min");
        assert_eq!(bar.close, Price(100.0), "close = last");
        assert_eq!(bar.volume, 50, "volume = sum");
    }

    #[test]
    fn buckets_align_to_calendar_offsets() {
        // Bars at minutes 3, 4 and 5: the first two land in the [0, 5)
        // bucket, the third opens the [5, 10) bucket.
        let series = CandleSeries::new(vec![
            candle(3, 100.0, 101.0, 99.0, 100.5, 1),
            candle(4, 100.5, 101.5, 100.0, 101.0, 1),
            candle(5, 101.0, 102.0, 100.5, 101.5, 1),
        ])
        .unwrap();

        let out = resample(&series, Timeframe::M5);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].time, ts(0));
        assert_eq!(out[1].time, ts(5));
    }

    #[test]
    fn empty_buckets_are_dropped() {
        // A gap between minute 4 and minute 16 leaves the [5, 10) and
        // [10, 15) buckets empty; they must not appear in the output.
        let series = CandleSeries::new(vec![
            candle(4, 100.0, 101.0, 99.0, 100.0, 1),
            candle(16, 100.0, 101.0, 99.0, 100.0, 1),
        ])
        .unwrap();

        let out = resample(&series, Timeframe::M5);
        assert_eq!(out.len(), 2, "empty buckets dropped");
        assert_eq!(out[0].time, ts(0));
        assert_eq!(out[1].time, ts(15));
    }

    #[test]
    fn daily_bucket_opens_at_midnight_utc() {
        let series = CandleSeries::new(vec![
            candle(8 * 60, 100.0, 101.0, 99.0, 100.0, 1),
            candle(20 * 60, 100.0, 105.0, 98.0, 104.0, 1),
        ])
        .unwrap();

        let out = resample(&series, Timeframe::D1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].time, ts(0), "1D bucket opens at 00:00 UTC");
        assert_eq!(out[0].high, Price(105.0));
        assert_eq!(out[0].low, Price(98.0));
    }
}
