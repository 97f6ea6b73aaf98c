//! The main replay loop.
//!
//! Per bar, in order: higher-timeframe boundary work (new POIs, bias and
//! sync refresh), state-machine tick, exits, entries, add-ons, then
//! mark-to-market. Exits run before entries so a slot freed this bar can
//! be refilled the same bar. The whole loop is a sequential fold; nothing
//! in it suspends or consults the wall clock.

use chrono::{DateTime, NaiveTime, Utc};
use serde_json::json;

use crate::{
    concepts::poi::Poi,
    config::Config,
    context::{
        bias::{Bias, determine_bias_at},
        machine::{ConceptView, StateMachineManager},
        mtf::MtfContext,
        sync::{SyncMode, check_sync},
    },
    data::{
        candle::{Candle, CandleSeries},
        domain::Timeframe,
    },
    engine::{
        events::{Event, EventKind, EventLog},
        portfolio::Portfolio,
        trade_log::TradeRecord,
    },
    error::{DataError, EngineError, ZonalResult},
    report::metrics::{MetricsReport, compute_metrics},
    strategy::{
        ExitReason, Signal, SignalKind,
        addons::{evaluate_addon, find_addon_candidates},
        entries::evaluate_entry,
        exits::{evaluate_exit, select_target},
        fta::{classify_distance, detect_fta},
    },
};

const BIAS_LOOKBACK: usize = 10;

/// Complete output of a run.
#[derive(Debug)]
pub struct BacktestResult {
    pub trades: Vec<TradeRecord>,
    /// One slot per filtered bar; NaN before the first mark-to-market.
    pub equity_curve: Vec<f64>,
    pub metrics: MetricsReport,
    pub signals: Vec<Signal>,
    pub events: Vec<Event>,
    pub config: Config,
    pub timestamps: Vec<DateTime<Utc>>,
}

/// Orchestrates one deterministic replay over a 1m series.
#[derive(Debug)]
pub struct Backtester {
    config: Config,
}

impl Backtester {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn run(&self, series_1m: &CandleSeries) -> ZonalResult<BacktestResult> {
        self.config.validate()?;

        let start = DateTime::from_naive_utc_and_offset(
            self.config.backtest.start_date.and_time(NaiveTime::MIN),
            Utc,
        );
        let end = DateTime::from_naive_utc_and_offset(
            self.config.backtest.end_date.and_time(NaiveTime::MIN),
            Utc,
        );
        let series = series_1m.filter_range(start, end);
        let n_bars = series.len();
        if n_bars == 0 {
            return Err(DataError::EmptySeries(format!(
                "no bars between {} and {}",
                self.config.backtest.start_date, self.config.backtest.end_date
            ))
            .into());
        }

        tracing::info!(
            bars = n_bars,
            start = %self.config.backtest.start_date,
            end = %self.config.backtest.end_date,
            "starting replay"
        );

        let ctx = MtfContext::initialize(&self.config, &series)?;
        let mut run = Run {
            config: &self.config,
            ctx: &ctx,
            sm: StateMachineManager::new(self.config.strategy.confirmations.clone()),
            portfolio: Portfolio::new(
                self.config.backtest.clone(),
                self.config.strategy.risk.clone(),
                n_bars,
            ),
            events: EventLog::new(),
            signals: Vec::new(),
            htf_bias: Bias::Undefined,
            ltf_bias: Bias::Undefined,
            sync_mode: SyncMode::Undefined,
        };

        let first_ts = series.first().map(|c| c.time).unwrap_or(start);
        run.register_new_pois(first_ts)?;
        run.update_bias_sync(first_ts)?;

        for bar_index in 0..n_bars {
            let bar = series[bar_index];
            run.process_bar(&bar, bar_index).map_err(|e| {
                EngineError::BarProcessing {
                    bar_index,
                    timeframe: Timeframe::M1.to_string(),
                    component: "bar_loop".to_string(),
                    msg: e.to_string(),
                }
            })?;
        }

        // End of data: flatten whatever is still open at the last close.
        let last_bar = series[n_bars - 1];
        for poi_id in run.portfolio.open_poi_ids() {
            run.portfolio.close_position(
                &poi_id,
                last_bar.close.0,
                ExitReason::EndOfData,
                last_bar.time,
                n_bars - 1,
                &mut run.events,
            )?;
            run.sm.close(&poi_id)?;
        }

        let timestamps: Vec<DateTime<Utc>> = series.iter().map(|c| c.time).collect();
        let (trades, equity_curve) = run.portfolio.into_parts();
        let metrics = compute_metrics(
            &trades,
            &equity_curve,
            &timestamps,
            self.config.backtest.initial_capital,
            self.config.backtest.bars_per_year,
        );

        tracing::info!(
            trades = trades.len(),
            signals = run.signals.len(),
            final_equity = metrics.final_equity,
            "replay complete"
        );

        Ok(BacktestResult {
            trades,
            equity_curve,
            metrics,
            signals: run.signals,
            events: run.events.into_events(),
            config: self.config.clone(),
            timestamps,
        })
    }
}

/// Mutable state of one run, threaded through the bar loop.
struct Run<'a> {
    config: &'a Config,
    ctx: &'a MtfContext,
    sm: StateMachineManager,
    portfolio: Portfolio,
    events: EventLog,
    signals: Vec<Signal>,
    htf_bias: Bias,
    ltf_bias: Bias,
    sync_mode: SyncMode,
}

impl Run<'_> {
    fn process_bar(&mut self, bar: &Candle, bar_index: usize) -> ZonalResult<()> {
        let ts = bar.time;

        // a. Higher-timeframe boundary check, once per bar.
        for tf in self.ctx.timeframes() {
            if tf.is_base() {
                continue;
            }
            if self.ctx.tf_just_closed(tf, ts)? {
                self.register_new_pois(ts)?;
                self.update_bias_sync(ts)?;
                break;
            }
        }

        // b. Time-gated view of the base-timeframe concept tables.
        let view = ConceptView {
            fvgs: self.ctx.fvgs_at(Timeframe::M1, ts)?,
            fvg_lifecycle: &self.ctx.timeframe_data(Timeframe::M1)?.fvg_lifecycle,
            liquidity: self.ctx.liquidity_at(Timeframe::M1, ts)?,
            structure: self.ctx.structure_at(Timeframe::M1, ts)?,
        };

        // c. Tick the collecting state machines.
        let tapped = self.sm.tick(bar, bar_index, ts, &view);
        for poi_id in tapped {
            self.events
                .emit(EventKind::PoiTapped, ts, poi_id, serde_json::Map::new());
        }

        // d. Exits first, freeing capacity for this bar's entries.
        self.handle_exits(bar, bar_index, &view)?;

        // e. Entries.
        self.handle_entries(bar, bar_index, &view)?;

        // f. Add-ons.
        self.handle_addons(bar, bar_index, &view)?;

        // g. Mark to market.
        self.portfolio
            .mark_to_market(bar_index, bar.high.0, bar.low.0, bar.close.0)?;

        Ok(())
    }

    /// Register every visible POI of every timeframe; the manager's
    /// fingerprint set drops the ones already known.
    fn register_new_pois(&mut self, ts: DateTime<Utc>) -> ZonalResult<()> {
        for tf in self.ctx.timeframes() {
            let pois: Vec<Poi> = self
                .ctx
                .pois_at(tf, ts)?
                .into_iter()
                .cloned()
                .collect();
            for poi in pois {
                let direction = poi.direction;
                if let Some(poi_id) = self.sm.register_poi(poi, tf, ts) {
                    let mut details = serde_json::Map::new();
                    details.insert("timeframe".into(), json!(tf.to_string()));
                    details.insert("direction".into(), json!(direction.as_str()));
                    self.events
                        .emit(EventKind::PoiRegistered, ts, poi_id, details);
                }
            }
        }
        Ok(())
    }

    /// HTF bias from the highest configured timeframe, LTF bias from the
    /// lowest non-1m one; sync mode from their alignment.
    fn update_bias_sync(&mut self, ts: DateTime<Utc>) -> ZonalResult<()> {
        let htf = self
            .ctx
            .timeframes()
            .filter(|tf| !tf.is_base())
            .max()
            .unwrap_or(Timeframe::M1);
        let ltf = self
            .ctx
            .timeframes()
            .filter(|tf| !tf.is_base())
            .min()
            .unwrap_or(Timeframe::M1);

        let htf_data = self.ctx.timeframe_data(htf)?;
        self.htf_bias = determine_bias_at(
            htf_data.candles.as_slice(),
            &htf_data.structure,
            ts,
            BIAS_LOOKBACK,
        );
        let ltf_data = self.ctx.timeframe_data(ltf)?;
        self.ltf_bias = determine_bias_at(
            ltf_data.candles.as_slice(),
            &ltf_data.structure,
            ts,
            BIAS_LOOKBACK,
        );
        self.sync_mode = check_sync(self.htf_bias, self.ltf_bias);

        let mut details = serde_json::Map::new();
        details.insert("htf_bias".into(), json!(self.htf_bias.to_string()));
        details.insert("ltf_bias".into(), json!(self.ltf_bias.to_string()));
        self.events.emit(EventKind::BiasUpdated, ts, "", details);

        let mut details = serde_json::Map::new();
        details.insert("sync_mode".into(), json!(self.sync_mode.to_string()));
        self.events.emit(EventKind::SyncUpdated, ts, "", details);

        Ok(())
    }

    /// Swing points used for target selection: primary timeframes when
    /// SYNC, local ones otherwise, falling back to the base timeframe.
    fn target_swing_timeframe(&self) -> Timeframe {
        let preferences = if self.sync_mode == SyncMode::Sync {
            &self.config.strategy.targets.primary_tf
        } else {
            &self.config.strategy.targets.local_tf
        };
        preferences
            .iter()
            .copied()
            .find(|tf| self.ctx.timeframe_data(*tf).is_ok())
            .unwrap_or(Timeframe::M1)
    }

    fn handle_exits(
        &mut self,
        bar: &Candle,
        bar_index: usize,
        view: &ConceptView<'_>,
    ) -> ZonalResult<()> {
        let ts = bar.time;
        let positioned: Vec<String> = self
            .sm
            .positioned_states()
            .iter()
            .map(|s| s.poi_id.clone())
            .collect();

        for poi_id in positioned {
            let state = self.sm.state(&poi_id)?.clone();

            let fta = state.target.and_then(|target| {
                let active = self.ctx.all_active_pois(ts);
                detect_fta(bar.close.0, target, state.poi.direction, &active)
            });

            let Some(signal) = evaluate_exit(
                &state,
                bar.high.0,
                bar.low.0,
                bar.close.0,
                bar_index,
                ts,
                fta.as_ref(),
                view.structure,
                &self.config.strategy,
                self.config.backtest.commission_pct,
            ) else {
                continue;
            };

            self.signals.push(signal.clone());

            match signal.kind {
                SignalKind::Exit => {
                    let reason = signal
                        .reason
                        .parse::<ExitReason>()
                        .unwrap_or(ExitReason::EndOfData);
                    self.portfolio.close_position(
                        &poi_id,
                        signal.price,
                        reason,
                        ts,
                        bar_index,
                        &mut self.events,
                    )?;
                    self.sm.close(&poi_id)?;
                }
                SignalKind::MoveToBe => {
                    self.sm.move_to_breakeven(&poi_id, signal.price)?;
                    self.portfolio.modify_stop_loss(&poi_id, signal.price)?;
                    let mut details = serde_json::Map::new();
                    details.insert("be_level".into(), json!(signal.price));
                    self.events.emit(EventKind::BeMoved, ts, poi_id, details);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_entries(
        &mut self,
        bar: &Candle,
        bar_index: usize,
        view: &ConceptView<'_>,
    ) -> ZonalResult<()> {
        let ts = bar.time;
        let ready: Vec<String> = self
            .sm
            .ready_states()
            .iter()
            .map(|s| s.poi_id.clone())
            .collect();

        for poi_id in ready {
            if self.portfolio.has_position_for(&poi_id) {
                continue;
            }
            if !self.portfolio.can_open_position() {
                let mut details = serde_json::Map::new();
                details.insert("reason".into(), json!("max_positions_reached"));
                self.events
                    .emit(EventKind::PositionRejected, ts, poi_id, details);
                continue;
            }

            let state = self.sm.state(&poi_id)?.clone();
            let active = self.ctx.all_active_pois(ts);
            let swing_tf = self.target_swing_timeframe();
            let swings = self.ctx.swings_at(swing_tf, ts)?;

            let target = select_target(state.poi.direction, bar.close.0, &active, swings);

            let fta = detect_fta(bar.close.0, target, state.poi.direction, &active);
            let fta_class = fta.as_ref().map(|f| {
                classify_distance(
                    f,
                    bar.close.0,
                    target,
                    self.config.strategy.fta.close_threshold_pct,
                )
            });

            let Some(mut signal) = evaluate_entry(
                &state,
                bar,
                bar_index,
                ts,
                fta_class,
                self.sync_mode,
                view.fvgs,
                &view.liquidity,
                &self.config.strategy,
            ) else {
                continue;
            };

            // The rough validation target gives way to the selected one.
            signal.target = target;
            self.signals.push(signal.clone());

            let trade_id = self.portfolio.open_position(
                &signal,
                self.sync_mode,
                bar_index,
                Some(state.timeframe),
                state.confirmations.len(),
                false,
                None,
                &mut self.events,
            );

            if let Some(trade_id) = trade_id {
                // The state machine records the actual post-slippage fill.
                let fill_price = self.portfolio.trade_log().trade(trade_id)?.entry_price;
                self.sm
                    .set_positioned(&poi_id, fill_price, signal.stop_loss, signal.target)?;
            }
        }
        Ok(())
    }

    fn handle_addons(
        &mut self,
        bar: &Candle,
        bar_index: usize,
        view: &ConceptView<'_>,
    ) -> ZonalResult<()> {
        let ts = bar.time;
        let addon_tf = self
            .config
            .strategy
            .targets
            .local_tf
            .iter()
            .copied()
            .find(|tf| self.ctx.timeframe_data(*tf).is_ok())
            .unwrap_or(Timeframe::M1);

        let positioned: Vec<String> = self
            .sm
            .positioned_states()
            .iter()
            .map(|s| s.poi_id.clone())
            .collect();

        for poi_id in positioned {
            let state = self.sm.state(&poi_id)?.clone();
            let Some(target) = state.target else {
                continue;
            };

            let local_pois = self.ctx.pois_at(addon_tf, ts)?;
            let candidates = find_addon_candidates(
                state.poi.direction,
                bar.close.0,
                target,
                &local_pois,
            );

            let Some(candidate) = candidates.first() else {
                continue;
            };
            let Some(signal) =
                evaluate_addon(&state, candidate, bar, bar_index, ts, view.structure)
            else {
                continue;
            };

            self.signals.push(signal.clone());

            let parent_id = self
                .portfolio
                .positions_for(&poi_id)
                .first()
                .map(|p| p.trade_id);

            self.portfolio.open_position(
                &signal,
                self.sync_mode,
                bar_index,
                Some(state.timeframe),
                state.confirmations.len(),
                true,
                parent_id,
                &mut self.events,
            );
        }
        Ok(())
    }
}

/// Convenience entry point: validate, replay, summarize.
pub fn run_backtest(config: Config, series_1m: &CandleSeries) -> ZonalResult<BacktestResult> {
    Backtester::new(config).run(series_1m)
}
