//! Simulated duty-cycling compressor.
//!
//! Models the two proxies the monitor watches:
//! - surface temperature: first-order heating toward `hot_f` while running,
//!   fast cool-down toward `ambient_f` while stopped, plus probe noise and
//!   the occasional `-127` disconnected-probe glitch
//! - piezo: ADC mid-scale plus a motor hum while running, noise otherwise
//!
//! State is derived from the shared `Clock`, so the simulation follows the
//! control loop's virtual time exactly.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use rand::prelude::*;
use rand_distr::StandardNormal;

use super::{AcquisitionError, SensorSource};
use crate::cycle::Clock;
use crate::types::Channel;

/// Reading reported by a disconnected one-wire temperature probe.
const PROBE_DISCONNECTED: f64 = -127.0;

/// Physical parameters of the simulated unit.
#[derive(Debug, Clone)]
pub struct SimulationProfile {
    pub off_secs: f64,
    pub on_secs: f64,
    pub ambient_f: f64,
    pub hot_f: f64,
    pub heating_tau_secs: f64,
    pub cooling_tau_secs: f64,
    pub temperature_noise_f: f64,
    pub glitch_probability: f64,
    /// Motor hum frequency (Hz, below the 100 Hz Nyquist of the 200 Hz capture)
    pub hum_hz: f64,
    pub vibration_midscale: f64,
    pub hum_amplitude: f64,
    pub vibration_noise_on: f64,
    pub vibration_noise_off: f64,
    /// Spacing of back-to-back piezo reads within one tick
    pub burst_step: Duration,
}

impl Default for SimulationProfile {
    fn default() -> Self {
        Self {
            off_secs: 900.0,
            on_secs: 1_080.0,
            ambient_f: 68.0,
            hot_f: 140.0,
            heating_tau_secs: 400.0,
            cooling_tau_secs: 30.0,
            temperature_noise_f: 0.05,
            glitch_probability: 0.002,
            hum_hz: 30.0,
            vibration_midscale: 512.0,
            hum_amplitude: 120.0,
            vibration_noise_on: 15.0,
            vibration_noise_off: 4.0,
            burst_step: Duration::from_millis(1),
        }
    }
}

pub struct SimulatedCompressor {
    profile: SimulationProfile,
    clock: Arc<dyn Clock>,
    rng: StdRng,
    temperature_f: f64,
    last_temperature_at: Duration,
    last_vibration_clock: Duration,
    vibration_at: Duration,
}

impl SimulatedCompressor {
    pub fn new(profile: SimulationProfile, clock: Arc<dyn Clock>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        let now = clock.now();
        Self {
            temperature_f: profile.ambient_f,
            profile,
            clock,
            rng,
            last_temperature_at: now,
            last_vibration_clock: now,
            vibration_at: now,
        }
    }

    /// Whether the simulated motor is running at time `t`.
    pub fn is_running(&self, t: Duration) -> bool {
        let period = self.profile.off_secs + self.profile.on_secs;
        if period <= 0.0 {
            return false;
        }
        t.as_secs_f64() % period >= self.profile.off_secs
    }

    fn noise(&mut self, std_dev: f64) -> f64 {
        self.rng.sample::<f64, _>(StandardNormal) * std_dev
    }

    fn read_temperature(&mut self) -> f64 {
        let now = self.clock.now();
        let dt = now.saturating_sub(self.last_temperature_at).as_secs_f64();
        self.last_temperature_at = now;

        let (target, tau) = if self.is_running(now) {
            (self.profile.hot_f, self.profile.heating_tau_secs)
        } else {
            (self.profile.ambient_f, self.profile.cooling_tau_secs)
        };
        if tau > 0.0 {
            self.temperature_f += (target - self.temperature_f) * (1.0 - (-dt / tau).exp());
        } else {
            self.temperature_f = target;
        }

        if self.rng.gen_bool(self.profile.glitch_probability.clamp(0.0, 1.0)) {
            return PROBE_DISCONNECTED;
        }
        let noise = self.noise(self.profile.temperature_noise_f);
        self.temperature_f + noise
    }

    fn read_vibration(&mut self) -> f64 {
        let now = self.clock.now();
        self.vibration_at = if now > self.last_vibration_clock {
            now
        } else {
            self.vibration_at + self.profile.burst_step
        };
        self.last_vibration_clock = now;

        let t = self.vibration_at;
        let mut value = self.profile.vibration_midscale;
        if self.is_running(t) {
            value += self.profile.hum_amplitude * (2.0 * PI * self.profile.hum_hz * t.as_secs_f64()).sin();
            value += self.noise(self.profile.vibration_noise_on);
        } else {
            value += self.noise(self.profile.vibration_noise_off);
        }
        value.round().clamp(0.0, 4095.0)
    }
}

impl SensorSource for SimulatedCompressor {
    fn read(&mut self, channel: Channel) -> Result<f64, AcquisitionError> {
        Ok(match channel {
            Channel::Temperature => self.read_temperature(),
            Channel::Vibration => self.read_vibration(),
        })
    }

    fn source_name(&self) -> &str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle::TickClock;

    fn quiet_profile() -> SimulationProfile {
        SimulationProfile {
            glitch_probability: 0.0,
            ..SimulationProfile::default()
        }
    }

    #[test]
    fn test_duty_cycle_schedule() {
        let clock = Arc::new(TickClock::new());
        let sim = SimulatedCompressor::new(quiet_profile(), clock, Some(1));
        assert!(!sim.is_running(Duration::from_secs(0)));
        assert!(!sim.is_running(Duration::from_secs(899)));
        assert!(sim.is_running(Duration::from_secs(900)));
        assert!(sim.is_running(Duration::from_secs(1_979)));
        assert!(!sim.is_running(Duration::from_secs(1_980)));
    }

    #[test]
    fn test_temperature_rises_while_running() {
        let clock = Arc::new(TickClock::new());
        let mut sim = SimulatedCompressor::new(quiet_profile(), clock.clone(), Some(7));

        clock.advance(Duration::from_secs(890));
        let before = sim.read(Channel::Temperature).expect("read");
        clock.advance(Duration::from_secs(600));
        let after = sim.read(Channel::Temperature).expect("read");

        assert!((before - 68.0).abs() < 1.0, "idle temp {before}");
        assert!(after > before + 30.0, "running temp {after}");
    }

    #[test]
    fn test_vibration_energy_higher_while_running() {
        let clock = Arc::new(TickClock::new());
        let mut sim = SimulatedCompressor::new(quiet_profile(), clock.clone(), Some(3));

        let spread = |sim: &mut SimulatedCompressor| {
            let xs: Vec<f64> = (0..500)
                .map(|_| sim.read(Channel::Vibration).expect("read"))
                .collect();
            let mean = xs.iter().sum::<f64>() / xs.len() as f64;
            (xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
        };

        let off = spread(&mut sim);
        clock.advance(Duration::from_secs(1_000));
        let on = spread(&mut sim);
        assert!(on > 5.0 * off, "on {on} off {off}");
    }

    #[test]
    fn test_glitches_are_reported_as_disconnected_probe() {
        let clock = Arc::new(TickClock::new());
        let profile = SimulationProfile {
            glitch_probability: 1.0,
            ..SimulationProfile::default()
        };
        let mut sim = SimulatedCompressor::new(profile, clock, Some(9));
        assert!((sim.read(Channel::Temperature).expect("read") - PROBE_DISCONNECTED).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_seed_same_readings() {
        let a: Vec<f64> = {
            let mut sim = SimulatedCompressor::new(quiet_profile(), Arc::new(TickClock::new()), Some(42));
            (0..10).map(|_| sim.read(Channel::Vibration).expect("read")).collect()
        };
        let b: Vec<f64> = {
            let mut sim = SimulatedCompressor::new(quiet_profile(), Arc::new(TickClock::new()), Some(42));
            (0..10).map(|_| sim.read(Channel::Vibration).expect("read")).collect()
        };
        assert_eq!(a, b);
    }
}
