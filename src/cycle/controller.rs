//! The duty-cycle controller.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{ControlContext, CyclePhase};
use crate::acquisition::AcquisitionError;
use crate::config::{defaults, CycleConfig, DetectionMode, MonitorConfig};
use crate::detection::{DetectionState, EnergyDetector, TrendDetector};
use crate::notify::StatusMessage;
use crate::processing::{dominant_bin, SpectralExtractor};
use crate::statistics::{temperature_slope, BaselineStatistics};
use crate::storage::{self, keys};
use crate::types::CycleRecord;

pub struct CycleController {
    config: CycleConfig,
    phase: CyclePhase,
    trend: TrendDetector,
    energy: EnergyDetector,
    stats: BaselineStatistics,
    extractor: SpectralExtractor,
    /// Temperatures collected this cycle
    temperatures: Vec<f64>,
    last_temperature_at: Option<Duration>,
    last_temperature: Option<f64>,
    last_frequency_hz: Option<f64>,
    windows: u32,
    cycles_completed: u64,
}

impl CycleController {
    /// Build a controller, restoring detector baselines, statistics and the
    /// cycle counter from the context's store.
    pub fn new(config: &MonitorConfig, ctx: &ControlContext) -> Self {
        let store = ctx.store.as_ref();
        let now = ctx.clock.now();

        let cycles_completed = storage::load_json::<u64>(store, keys::CYCLE_COUNTER)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Cycle counter unreadable, starting from zero");
                None
            })
            .unwrap_or(0);

        info!(
            cycles_completed,
            mode = ?config.cycle.detection_mode,
            source = ctx.sampler.source_name(),
            store = store.backend_name(),
            "Cycle controller ready"
        );

        Self {
            config: config.cycle.clone(),
            phase: CyclePhase::Idle,
            trend: TrendDetector::new(&config.trend_detector, store, now),
            energy: EnergyDetector::new(&config.energy_detector, store, now),
            stats: BaselineStatistics::load(store, &config.statistics),
            extractor: SpectralExtractor::new(&config.spectral),
            temperatures: Vec::with_capacity(config.cycle.min_temperature_samples),
            last_temperature_at: None,
            last_temperature: None,
            last_frequency_hz: None,
            windows: 0,
            cycles_completed,
        }
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    pub fn trend(&self) -> &TrendDetector {
        &self.trend
    }

    pub fn energy(&self) -> &EnergyDetector {
        &self.energy
    }

    pub fn stats(&self) -> &BaselineStatistics {
        &self.stats
    }

    pub fn temperatures_collected(&self) -> usize {
        self.temperatures.len()
    }

    pub fn windows_in_cycle(&self) -> u32 {
        self.windows
    }

    /// ON/OFF decision of the detectors under the configured mode.
    pub fn combined_state(&self) -> DetectionState {
        let trend_on = self.trend.state() == DetectionState::On;
        let energy_on = self.energy.state() == DetectionState::On;
        let on = match self.config.detection_mode {
            DetectionMode::Temperature => trend_on,
            DetectionMode::All => trend_on && energy_on,
            DetectionMode::Any => trend_on || energy_on,
        };
        if on {
            DetectionState::On
        } else {
            DetectionState::Off
        }
    }

    /// Perform one tick and return the delay before the next.
    pub fn step(&mut self, ctx: &mut ControlContext) -> Duration {
        match self.phase {
            CyclePhase::Idle => {
                let captured = self.observe_detectors(ctx);
                if self.combined_state() == DetectionState::On {
                    info!(cycle = self.cycles_completed, "🟢 Compressor started, collecting");
                    ctx.enqueue(StatusMessage::update_message("collecting"));
                    self.enter(CyclePhase::Collecting);
                }
                self.trend.read_interval().saturating_sub(captured)
            }
            CyclePhase::Collecting => {
                self.collect(ctx);
                if self.temperatures.len() >= self.config.min_temperature_samples {
                    self.enter(CyclePhase::Analyzing);
                }
                Duration::from_millis(self.config.collect_tick_ms)
            }
            CyclePhase::Analyzing => {
                self.analyze(ctx);
                self.enter(CyclePhase::Resting);
                Duration::ZERO
            }
            CyclePhase::Resting => {
                let captured = self.observe_detectors(ctx);
                if self.combined_state() == DetectionState::Off {
                    info!("⚪ Compressor stopped, idle");
                    self.enter(CyclePhase::Idle);
                }
                self.trend.read_interval().saturating_sub(captured)
            }
        }
    }

    fn enter(&mut self, phase: CyclePhase) {
        debug!(from = %self.phase, to = %phase, "Cycle phase change");
        self.phase = phase;
    }

    /// One trend reading and one energy window. Both detectors are observed
    /// in every mode; the mode only decides which of them gates the phase.
    /// Returns the device time spent capturing the piezo window, which the
    /// clock has already been advanced by.
    fn observe_detectors(&mut self, ctx: &mut ControlContext) -> Duration {
        let store = Arc::clone(&ctx.store);
        let now = ctx.clock.now();

        match ctx.sampler.read_temperature() {
            Ok(t) => {
                self.last_temperature = Some(t);
                self.trend.observe(t, store.as_ref(), now);
            }
            Err(e) => {
                if handle_read_error(ctx, &e) {
                    return Duration::ZERO;
                }
            }
        }

        match ctx.sampler.read_vibration_window(self.energy.window_samples()) {
            Ok(window) => {
                let captured = self.energy.window_duration();
                ctx.clock.advance(captured);
                self.energy.observe(&window, store.as_ref(), ctx.clock.now());
                captured
            }
            Err(e) => {
                handle_read_error(ctx, &e);
                Duration::ZERO
            }
        }
    }

    fn collect(&mut self, ctx: &mut ControlContext) {
        let now = ctx.clock.now();
        let interval = Duration::from_millis(self.config.temperature_interval_ms);
        let due = self
            .last_temperature_at
            .map_or(true, |at| now.saturating_sub(at) >= interval);

        if due {
            self.last_temperature_at = Some(now);
            match ctx.sampler.read_temperature() {
                Ok(t) => {
                    self.temperatures.push(t);
                    self.last_temperature = Some(t);
                }
                Err(e) => {
                    if handle_read_error(ctx, &e) {
                        return;
                    }
                }
            }
        }

        match ctx.sampler.read_vibration() {
            Ok(v) => {
                if self.extractor.accumulate(v) {
                    self.finish_window(ctx);
                }
            }
            Err(e) => {
                handle_read_error(ctx, &e);
            }
        }
    }

    fn finish_window(&mut self, ctx: &mut ControlContext) {
        let store = Arc::clone(&ctx.store);
        let spectrum = match self.extractor.transform() {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Vibration window transform failed");
                return;
            }
        };
        self.windows += 1;
        self.last_frequency_hz = dominant_bin(&spectrum).map(|bin| self.extractor.frequency_of(bin));

        let temperature_text = self
            .last_temperature
            .map_or_else(|| "-- °F".to_string(), |t| format!("{t:.1}°F"));
        let vibration_text = self
            .last_frequency_hz
            .map_or_else(|| "-- Hz".to_string(), |hz| format!("{hz:.2}Hz"));
        ctx.enqueue(StatusMessage::update_data(temperature_text, vibration_text));

        if let Err(e) = self.stats.record_spectrum(&spectrum, store.as_ref()) {
            warn!(error = %e, "Failed to persist spectrum");
        }

        if self.stats.has_spectral_baseline() {
            if let Some(score) = self.stats.score_window(&spectrum, store.as_ref()) {
                debug!(score, window = self.windows, "Vibration window scored");
            }
        } else {
            self.stats.ensure_spectral_baseline(store.as_ref());
        }
    }

    fn analyze(&mut self, ctx: &mut ControlContext) {
        let store = Arc::clone(&ctx.store);
        let store = store.as_ref();

        let slope = match temperature_slope(&self.temperatures, defaults::SLOPE_ENDPOINT_SAMPLES) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(error = %e, "Cycle temperature slope unavailable");
                None
            }
        };

        // Scored against the history as it stood before this cycle
        let temperature_z = slope.and_then(|s| match self.stats.temperature_z(s) {
            Ok(z) => Some(z),
            Err(e) => {
                debug!(reason = %e, "Temperature z-score skipped");
                None
            }
        });
        if let Some(s) = slope {
            self.stats.record_slope(s, store);
        }
        let vibration_score = self.stats.finish_cycle_vibration();

        let index = self.cycles_completed;
        if let Err(e) = storage::save_json(store, &keys::temperature_series(index), &self.temperatures) {
            warn!(error = %e, "Failed to persist temperature series");
        }
        self.cycles_completed += 1;
        if let Err(e) = storage::save_json(store, keys::CYCLE_COUNTER, &self.cycles_completed) {
            warn!(error = %e, "Failed to persist cycle counter");
        }

        let record = CycleRecord {
            cycle: index,
            completed_at: ctx.clock.wall(),
            dominant_frequency_hz: self.last_frequency_hz,
            temperature_slope: slope,
            temperature_z,
            vibration_score,
            windows: self.windows,
            temperature_samples: self.temperatures.len(),
        };
        if let Err(e) = storage::append_json_line(store, keys::CYCLE_JOURNAL, &record) {
            warn!(error = %e, "Failed to append cycle journal");
        }

        info!(
            cycle = index,
            slope = ?slope,
            temperature_z = ?temperature_z,
            vibration_score = ?vibration_score,
            windows = self.windows,
            "📊 Cycle analysed"
        );

        ctx.enqueue(StatusMessage::status_check(temperature_z, vibration_score));
        ctx.enqueue(StatusMessage::update_message("resting"));
        ctx.enqueue(StatusMessage::check_inbox());

        self.temperatures.clear();
        self.extractor.clear();
        self.last_temperature_at = None;
        self.windows = 0;
    }
}

/// Log a failed read. Returns true when the source is exhausted, which also
/// flags the context.
fn handle_read_error(ctx: &mut ControlContext, error: &AcquisitionError) -> bool {
    if let AcquisitionError::Exhausted(channel) = error {
        if !ctx.exhausted {
            info!(%channel, "Sensor source exhausted");
        }
        ctx.exhausted = true;
        return true;
    }
    warn!(error = %error, "Sensor read failed, skipping this tick");
    false
}
