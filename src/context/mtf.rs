//! Multi-timeframe context manager.
//!
//! Initialization runs the full concept pipeline once per configured
//! timeframe and freezes the resulting tables. Every query afterwards is a
//! pure, time-gated lookup: artifacts created after the query timestamp do
//! not exist from the caller's point of view. Gating is a
//! `partition_point` scan over arrays that are already sorted by creation
//! order, so visibility only ever grows as the clock advances.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use itertools::Itertools;

use crate::{
    concepts::{
        breakers::{Breaker, detect_breakers},
        fvg::{Fvg, FvgLifecycle, detect_fvgs, track_lifecycle},
        liquidity::{
            LiquidityLevel, SessionLevel, detect_equal_levels, detect_session_levels,
        },
        orderblocks::{OrderBlock, detect_orderblocks},
        poi::{Poi, PoiInputs, build_pois},
        structure::{StructureEvent, detect_structure},
        swings::{SwingPoint, detect_swings},
    },
    config::Config,
    data::{
        candle::{Candle, CandleSeries},
        domain::Timeframe,
        resampler::resample,
    },
    error::{ConfigError, ZonalResult},
};

/// All pre-computed concept tables for one timeframe.
#[derive(Debug, Clone)]
pub struct TimeframeData {
    pub candles: CandleSeries,
    pub swing_points: Vec<SwingPoint>,
    pub structure: Vec<StructureEvent>,
    pub fvgs: Vec<Fvg>,
    pub fvg_lifecycle: Vec<FvgLifecycle>,
    pub liquidity: Vec<LiquidityLevel>,
    pub session_levels: Vec<SessionLevel>,
    pub orderblocks: Vec<OrderBlock>,
    pub breakers: Vec<Breaker>,
    /// Score-descending POI table with creation timestamps attached.
    pub pois: Vec<Poi>,
    pub swing_length: usize,
}

/// Pre-computes per-timeframe tables and serves time-gated views.
#[derive(Debug)]
pub struct MtfContext {
    data: BTreeMap<Timeframe, TimeframeData>,
    boundaries: BTreeMap<Timeframe, BTreeSet<DateTime<Utc>>>,
}

impl MtfContext {
    /// Resample and run the detector pipeline for every configured
    /// timeframe.
    pub fn initialize(config: &Config, series_1m: &CandleSeries) -> ZonalResult<Self> {
        let mut data = BTreeMap::new();
        let mut boundaries = BTreeMap::new();

        for &tf in &config.data.timeframes {
            if data.contains_key(&tf) {
                continue;
            }
            let candles = resample(series_1m, tf);
            let tf_data = compute_timeframe(config, tf, candles);

            boundaries.insert(
                tf,
                tf_data.candles.iter().map(|c| c.time).collect::<BTreeSet<_>>(),
            );
            data.insert(tf, tf_data);
        }

        tracing::info!(
            timeframes = data.len(),
            base_bars = series_1m.len(),
            "multi-timeframe context initialized"
        );

        Ok(Self { data, boundaries })
    }

    pub fn timeframes(&self) -> impl Iterator<Item = Timeframe> + '_ {
        self.data.keys().copied()
    }

    pub fn timeframe_data(&self, tf: Timeframe) -> ZonalResult<&TimeframeData> {
        self.data
            .get(&tf)
            .ok_or_else(|| ConfigError::UnknownTimeframe(tf.to_string()).into())
    }

    /// Most recent candle of `tf` whose bucket opened at or before `ts`.
    pub fn candle_at(&self, tf: Timeframe, ts: DateTime<Utc>) -> ZonalResult<Option<&Candle>> {
        let td = self.timeframe_data(tf)?;
        Ok(td.candles.index_at(ts).map(|i| &td.candles.as_slice()[i]))
    }

    /// POIs of `tf` created at or before `ts`, score order preserved.
    pub fn pois_at(&self, tf: Timeframe, ts: DateTime<Utc>) -> ZonalResult<Vec<&Poi>> {
        let td = self.timeframe_data(tf)?;
        Ok(td
            .pois
            .iter()
            .filter(|poi| poi.creation_time <= ts)
            .collect())
    }

    /// Structure events whose break bar opened at or before `ts`.
    pub fn structure_at(&self, tf: Timeframe, ts: DateTime<Utc>) -> ZonalResult<&[StructureEvent]> {
        let td = self.timeframe_data(tf)?;
        let candles = td.candles.as_slice();
        // Break indices are emitted in bar order: the visible events form
        // a prefix.
        let visible = td.structure.partition_point(|e| {
            candles
                .get(e.broken_index)
                .map(|bar| bar.time <= ts)
                .unwrap_or(false)
        });
        Ok(&td.structure[..visible])
    }

    /// FVGs whose third (creation) candle opened at or before `ts`.
    pub fn fvgs_at(&self, tf: Timeframe, ts: DateTime<Utc>) -> ZonalResult<&[Fvg]> {
        let td = self.timeframe_data(tf)?;
        let candles = td.candles.as_slice();
        let visible = td.fvgs.partition_point(|f| {
            candles
                .get(f.creation_index)
                .map(|bar| bar.time <= ts)
                .unwrap_or(false)
        });
        Ok(&td.fvgs[..visible])
    }

    /// Swing points confirmed (`index + swing_length`) at or before `ts`.
    pub fn swings_at(&self, tf: Timeframe, ts: DateTime<Utc>) -> ZonalResult<&[SwingPoint]> {
        let td = self.timeframe_data(tf)?;
        let candles = td.candles.as_slice();
        let visible = td.swing_points.partition_point(|p| {
            candles
                .get(p.confirmed_at(td.swing_length))
                .map(|bar| bar.time <= ts)
                .unwrap_or(false)
        });
        Ok(&td.swing_points[..visible])
    }

    /// Liquidity levels whose latest contributing swing has confirmed.
    pub fn liquidity_at(
        &self,
        tf: Timeframe,
        ts: DateTime<Utc>,
    ) -> ZonalResult<Vec<&LiquidityLevel>> {
        let td = self.timeframe_data(tf)?;
        let candles = td.candles.as_slice();
        Ok(td
            .liquidity
            .iter()
            .filter(|level| {
                candles
                    .get(level.confirmed_at(td.swing_length))
                    .map(|bar| bar.time <= ts)
                    .unwrap_or(false)
            })
            .collect())
    }

    /// Union of `pois_at` across all timeframes, score descending.
    pub fn all_active_pois(&self, ts: DateTime<Utc>) -> Vec<(Timeframe, &Poi)> {
        self.data
            .iter()
            .flat_map(|(&tf, td)| {
                td.pois
                    .iter()
                    .filter(move |poi| poi.creation_time <= ts)
                    .map(move |poi| (tf, poi))
            })
            .sorted_by(|a, b| {
                b.1.score
                    .partial_cmp(&a.1.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .collect()
    }

    /// True at the last 1m bar of every bucket of `tf`: for 1m always, for
    /// higher timeframes iff `ts + 1 minute` opens a bucket.
    pub fn tf_just_closed(&self, tf: Timeframe, ts: DateTime<Utc>) -> ZonalResult<bool> {
        if tf.is_base() {
            return Ok(true);
        }
        let boundaries = self
            .boundaries
            .get(&tf)
            .ok_or_else(|| ConfigError::UnknownTimeframe(tf.to_string()))?;
        Ok(boundaries.contains(&(ts + Duration::minutes(1))))
    }
}

fn compute_timeframe(config: &Config, tf: Timeframe, candles: CandleSeries) -> TimeframeData {
    let swing_length = config.concepts.swing_length_for(tf);
    let bars = candles.as_slice();

    let swing_points = detect_swings(bars, swing_length);
    let structure = detect_structure(
        bars,
        &swing_points,
        swing_length,
        config.concepts.structure.break_mode,
    );

    let fvgs = detect_fvgs(
        bars,
        config.concepts.fvg.min_gap_pct,
        config.concepts.fvg.join_consecutive,
    );
    let fvg_lifecycle = track_lifecycle(
        bars,
        &fvgs,
        config.concepts.fvg.mitigation_mode,
        config.concepts.fvg.max_age_bars,
    );

    let liquidity = detect_equal_levels(
        &swing_points,
        config.concepts.liquidity.range_percent,
        config.concepts.liquidity.min_touches,
    );
    let session_levels = detect_session_levels(bars);

    let orderblocks = detect_orderblocks(bars, &structure);
    let breakers = detect_breakers(&orderblocks);

    let pois = build_pois(
        bars,
        &PoiInputs {
            fvgs: &fvgs,
            fvg_lifecycle: &fvg_lifecycle,
            orderblocks: &orderblocks,
            breakers: &breakers,
            liquidity: &liquidity,
            session_levels: &session_levels,
        },
        config.concepts.overlap_tolerance,
        tf,
    );

    tracing::debug!(
        timeframe = %tf,
        bars = bars.len(),
        swings = swing_points.len(),
        structure_events = structure.len(),
        fvgs = fvgs.len(),
        pois = pois.len(),
        "timeframe pipeline complete"
    );

    TimeframeData {
        candles,
        swing_points,
        structure,
        fvgs,
        fvg_lifecycle,
        liquidity,
        session_levels,
        orderblocks,
        breakers,
        pois,
        swing_length,
    }
}
