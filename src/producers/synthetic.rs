//! Synthetic sample generator for the demonstration binary.
//!
//! A scaled-down, single-instrument version of the reference server's
//! `SyntheticBuilder`: a sine or random-walk price model, rolling-mean
//! indicators over configurable windows, periodic OHLC bars, and an
//! occasional strategy signal/marker/pnl trio. Builds one finite `Vec` up
//! front; the playback driver is what actually paces delivery into the run.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::feed::sample::{Payload, Side};
use crate::feed::SampleInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceModel {
    Sine,
    RandomWalk,
}

pub struct SyntheticConfig {
    pub instrument: String,
    pub tick_dt_ms: i64,
    pub price_model: PriceModel,
    pub base_price: f64,
    pub sine_period_ms: f64,
    pub sine_amp: f64,
    pub sine_noise: f64,
    pub rw_drift: f64,
    pub rw_vol: f64,
    pub indicator_windows: Vec<usize>,
    pub bar_interval_ms: i64,
    pub strategy_id: String,
    pub strategy_rate_per_min: f64,
    pub strategy_hold_bars: i64,
    pub seed: Option<u64>,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            instrument: "DEMO".to_string(),
            tick_dt_ms: 100,
            price_model: PriceModel::Sine,
            base_price: 100.0,
            sine_period_ms: 60_000.0,
            sine_amp: 2.0,
            sine_noise: 0.05,
            rw_drift: 0.0,
            rw_vol: 0.05,
            indicator_windows: vec![10, 30],
            bar_interval_ms: 5_000,
            strategy_id: "alpha".to_string(),
            strategy_rate_per_min: 4.0,
            strategy_hold_bars: 2,
            seed: None,
        }
    }
}

struct OpenTrade {
    side: Side,
    qty: i64,
    entry_px: f64,
    exit_t: i64,
}

/// Builds `n_ticks` worth of synthetic samples starting at `start_ms`.
pub fn build(cfg: &SyntheticConfig, n_ticks: usize, start_ms: i64) -> Vec<SampleInput> {
    let mut rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut samples = Vec::with_capacity(n_ticks * 2);
    let mut price = cfg.base_price;
    let mut rw_initialized = false;
    let mut indicator_buffers: Vec<VecDeque<f64>> =
        cfg.indicator_windows.iter().map(|&w| VecDeque::with_capacity(w)).collect();
    let mut next_bar_close = ((start_ms / cfg.bar_interval_ms) + 1) * cfg.bar_interval_ms;
    let mut open_trades: Vec<OpenTrade> = Vec::new();
    let mut pnl_cum = 0.0_f64;
    let mut last_signal_ms: Option<i64> = None;

    let tick_hz = 1000.0 / cfg.tick_dt_ms as f64;

    for i in 0..n_ticks {
        let t_ms = start_ms + i as i64 * cfg.tick_dt_ms;

        price = next_price(cfg, &mut rng, t_ms, start_ms, price, &mut rw_initialized);
        let volume = (rng.gen::<f64>() * 2.0).max(1.0);

        samples.push(SampleInput {
            series_id: format!("{}:ticks", cfg.instrument),
            t_ms,
            payload: Payload::Tick { price: round5(price), volume: round3(volume) },
        });

        for (w, buf) in cfg.indicator_windows.iter().zip(indicator_buffers.iter_mut()) {
            buf.push_back(price);
            if buf.len() > *w {
                buf.pop_front();
            }
            let value = if buf.len() < *w { None } else { Some(round5(buf.iter().sum::<f64>() / buf.len() as f64)) };
            samples.push(SampleInput {
                series_id: format!("{}:sma_{}", cfg.instrument, w),
                t_ms,
                payload: Payload::Scalar { value },
            });
        }

        if t_ms >= next_bar_close {
            let (o, h, l, c) = synthesize_bar(&mut rng, price);
            samples.push(SampleInput {
                series_id: format!("{}:ohlc_time:{}", cfg.instrument, cfg.bar_interval_ms),
                t_ms: next_bar_close,
                payload: Payload::Ohlc { o, h, l, c },
            });
            next_bar_close += cfg.bar_interval_ms;
        }

        process_exits(cfg, &mut open_trades, &mut pnl_cum, t_ms, price, &mut samples);
        maybe_emit_strategy(
            cfg,
            &mut rng,
            &mut open_trades,
            &mut last_signal_ms,
            t_ms,
            price,
            tick_hz,
            &mut samples,
        );
    }

    samples
}

fn next_price(cfg: &SyntheticConfig, rng: &mut StdRng, t_ms: i64, start_ms: i64, price: f64, rw_initialized: &mut bool) -> f64 {
    match cfg.price_model {
        PriceModel::Sine => {
            let phase = (t_ms - start_ms) as f64 * (2.0 * std::f64::consts::PI / cfg.sine_period_ms);
            let noise = if cfg.sine_noise > 0.0 { rng.gen_range(-cfg.sine_noise..=cfg.sine_noise) } else { 0.0 };
            cfg.base_price + cfg.sine_amp * phase.sin() + noise
        }
        PriceModel::RandomWalk => {
            if !*rw_initialized {
                *rw_initialized = true;
                return cfg.base_price;
            }
            // Box-Muller for an approximately gaussian step.
            let u1: f64 = rng.gen_range(1e-12..1.0);
            let u2: f64 = rng.gen_range(0.0..1.0);
            let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
            price + cfg.rw_drift + cfg.rw_vol * z
        }
    }
}

fn synthesize_bar(rng: &mut StdRng, price: f64) -> (f64, f64, f64, f64) {
    let c = round5(price + rng.gen_range(-0.02..=0.02));
    let o = round5(c + rng.gen_range(-0.05..=0.05));
    let h = round5(o.max(c) + rng.gen_range(0.01..=0.06));
    let l = round5(o.min(c) - rng.gen_range(0.01..=0.06));
    (o, h, l, c)
}

fn process_exits(cfg: &SyntheticConfig, open: &mut Vec<OpenTrade>, pnl_cum: &mut f64, t_ms: i64, price: f64, out: &mut Vec<SampleInput>) {
    let mut still_open = Vec::with_capacity(open.len());
    for tr in open.drain(..) {
        if t_ms >= tr.exit_t {
            out.push(SampleInput {
                series_id: format!("{}:strategy:{}:markers", cfg.instrument, cfg.strategy_id),
                t_ms: tr.exit_t,
                payload: Payload::Marker {
                    strategy: cfg.strategy_id.clone(),
                    side: tr.side,
                    tag: "exit".to_string(),
                    price: round5(price),
                    qty: tr.qty,
                },
            });
            let mult = if matches!(tr.side, Side::Long) { 1.0 } else { -1.0 };
            let realized = (price - tr.entry_px) * mult * tr.qty as f64;
            *pnl_cum += realized;
            out.push(SampleInput {
                series_id: format!("{}:strategy:{}:pnl", cfg.instrument, cfg.strategy_id),
                t_ms: tr.exit_t,
                payload: Payload::Scalar { value: Some(round2(*pnl_cum)) },
            });
        } else {
            still_open.push(tr);
        }
    }
    *open = still_open;
}

#[allow(clippy::too_many_arguments)]
fn maybe_emit_strategy(
    cfg: &SyntheticConfig,
    rng: &mut StdRng,
    open: &mut Vec<OpenTrade>,
    last_signal_ms: &mut Option<i64>,
    t_ms: i64,
    price: f64,
    tick_hz: f64,
    out: &mut Vec<SampleInput>,
) {
    if cfg.strategy_rate_per_min <= 0.0 || tick_hz <= 0.0 {
        return;
    }
    let max_open = 3;
    if open.len() >= max_open {
        return;
    }
    let target_interval_ms = 60_000.0 / cfg.strategy_rate_per_min.max(0.1);
    let min_gap_ms = (target_interval_ms * 0.5).max(1000.0);
    if let Some(last) = *last_signal_ms {
        if (t_ms - last) as f64 <= min_gap_ms {
            return;
        }
    }
    let p = (cfg.strategy_rate_per_min / 60.0) / tick_hz;
    if rng.gen::<f64>() >= p {
        return;
    }

    let side = if rng.gen_bool(0.5) { Side::Long } else { Side::Short };
    let qty = 1;
    let entry_px = price;

    out.push(SampleInput {
        series_id: format!("{}:strategy:{}:signals", cfg.instrument, cfg.strategy_id),
        t_ms,
        payload: Payload::Signal {
            strategy: cfg.strategy_id.clone(),
            side,
            desired_qty: qty,
            price: round5(entry_px),
            reason: "synthetic".to_string(),
        },
    });
    out.push(SampleInput {
        series_id: format!("{}:strategy:{}:markers", cfg.instrument, cfg.strategy_id),
        t_ms,
        payload: Payload::Marker {
            strategy: cfg.strategy_id.clone(),
            side,
            tag: "entry".to_string(),
            price: round5(entry_px),
            qty,
        },
    });

    let iv = cfg.bar_interval_ms;
    let exit_at = ((t_ms / iv) + 1) * iv + (cfg.strategy_hold_bars - 1).max(0) * iv;
    open.push(OpenTrade { side, qty, entry_px, exit_t: exit_at });
    *last_signal_ms = Some(t_ms);
}

fn round5(v: f64) -> f64 {
    (v * 100_000.0).round() / 100_000.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
