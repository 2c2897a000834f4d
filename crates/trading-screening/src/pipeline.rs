//! Ordered, short-circuiting screening of a universe.

use tracing::debug;
use trading_core::types::{closes, Candle, Direction, Instrument, Signal};
use trading_indicators::trend_strength;

use crate::{ExecutionValidator, MarketContext, RegimeFilter, ScreeningConfig, TechnicalScreen};

/// Instrument under evaluation.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub instrument: &'a Instrument,
    /// Recent candles, oldest first, open candle last when present
    pub candles: &'a [Candle],
    /// Own trend strength in percent
    pub trend: f64,
    pub direction: Direction,
    /// Set by the layer that prices the trade
    pub signal: Option<Signal>,
}

impl Candidate<'_> {
    /// Finalized candles only.
    pub fn completed(&self) -> Vec<Candle> {
        self.candles.iter().filter(|c| c.complete).copied().collect()
    }
}

/// One screening layer. Returning `Err` rejects the candidate with a reason.
pub trait ScreeningLayer: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, candidate: &mut Candidate<'_>, ctx: &MarketContext) -> Result<(), String>;
}

/// Why an instrument produced no signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub symbol: String,
    pub layer: &'static str,
    pub reason: String,
}

/// Result of one screening pass.
#[derive(Debug, Clone, Default)]
pub struct ScreeningReport {
    /// Accepted signals, best first
    pub signals: Vec<Signal>,
    pub rejections: Vec<Rejection>,
    pub evaluated: usize,
    /// Instruments skipped because a position is already open
    pub held: usize,
}

pub struct ScreeningPipeline {
    config: ScreeningConfig,
    layers: Vec<Box<dyn ScreeningLayer>>,
    entry_check: ExecutionValidator,
}

impl ScreeningPipeline {
    /// Pipeline with the regime, technical and execution layers.
    pub fn new(config: ScreeningConfig) -> Self {
        let layers: Vec<Box<dyn ScreeningLayer>> = vec![
            Box::new(RegimeFilter::new(config.clone())),
            Box::new(TechnicalScreen::new(config.clone())),
            Box::new(ExecutionValidator::new(config.clone())),
        ];
        Self::with_layers(config, layers)
    }

    pub fn with_layers(config: ScreeningConfig, layers: Vec<Box<dyn ScreeningLayer>>) -> Self {
        let entry_check = ExecutionValidator::new(config.clone());
        Self {
            config,
            layers,
            entry_check,
        }
    }

    pub fn config(&self) -> &ScreeningConfig {
        &self.config
    }

    pub fn layer_names(&self) -> Vec<&'static str> {
        self.layers.iter().map(|l| l.name()).collect()
    }

    /// Run the execution checks again for `signal` against `ctx`, which
    /// should be built at the moment of entry. Returns the signal re-priced
    /// at the current price.
    pub fn revalidate(&self, signal: &Signal, instrument: &Instrument, ctx: &MarketContext) -> Result<Signal, String> {
        let candles = ctx.candles(&instrument.symbol);
        let trend = trend_strength(&closes(candles), self.config.fast_ema, self.config.slow_ema)
            .ok_or_else(|| "no trend".to_string())?;
        if Direction::from_trend(trend) != Some(signal.direction) {
            return Err(format!("trend {:.2}% no longer supports {}", trend, signal.direction));
        }

        let mut candidate = Candidate {
            instrument,
            candles,
            trend,
            direction: signal.direction,
            signal: Some(signal.clone()),
        };
        self.entry_check.apply(&mut candidate, ctx)?;
        candidate.signal.ok_or_else(|| "no signal to validate".to_string())
    }

    /// Screen `universe` and return the best signals.
    pub fn screen(&self, universe: &[Instrument], ctx: &MarketContext) -> Vec<Signal> {
        self.screen_detailed(universe, ctx).signals
    }

    /// Screen `universe`, keeping the reason every instrument was rejected.
    pub fn screen_detailed(&self, universe: &[Instrument], ctx: &MarketContext) -> ScreeningReport {
        let mut report = ScreeningReport::default();

        'instruments: for instrument in universe {
            if self.config.reference_symbol.as_deref() == Some(instrument.symbol.as_str()) {
                continue;
            }
            if ctx.is_held(&instrument.symbol) {
                report.held += 1;
                continue;
            }
            report.evaluated += 1;

            let reject = |layer: &'static str, reason: String| Rejection {
                symbol: instrument.symbol.clone(),
                layer,
                reason,
            };

            let candles = ctx.candles(&instrument.symbol);
            if candles.len() < self.config.warmup_candles() {
                report.rejections.push(reject(
                    "data",
                    format!("{} candles, need {}", candles.len(), self.config.warmup_candles()),
                ));
                continue;
            }

            let trend = trend_strength(&closes(candles), self.config.fast_ema, self.config.slow_ema);
            let Some((trend, direction)) = trend.and_then(|t| Direction::from_trend(t).map(|d| (t, d)))
            else {
                report.rejections.push(reject("data", "no trend".to_string()));
                continue;
            };
            if direction == Direction::Short && !self.config.allow_short {
                report.rejections.push(reject("data", "short signals disabled".to_string()));
                continue;
            }

            let mut candidate = Candidate {
                instrument,
                candles,
                trend,
                direction,
                signal: None,
            };

            for layer in &self.layers {
                if let Err(reason) = layer.apply(&mut candidate, ctx) {
                    debug!(symbol = %instrument.symbol, layer = layer.name(), %reason, "Candidate rejected");
                    report.rejections.push(reject(layer.name(), reason));
                    continue 'instruments;
                }
            }

            match candidate.signal {
                Some(signal) => report.signals.push(signal),
                None => report
                    .rejections
                    .push(reject("pipeline", "no layer produced a signal".to_string())),
            }
        }

        report
            .signals
            .sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.symbol.cmp(&b.symbol)));
        report.signals.truncate(self.config.max_candidates);

        debug!(
            evaluated = report.evaluated,
            accepted = report.signals.len(),
            rejected = report.rejections.len(),
            "Screening pass complete"
        );
        report
    }
}
