//! Async driver for the cycle controller.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{ControlContext, CycleController};
use crate::notify::BridgeHandle;

/// Below this a scaled delay is not worth a timer; the loop just yields.
const MIN_SLEEP: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Virtual seconds per real second. Non-finite or non-positive values
    /// run as fast as possible.
    pub speed: f64,
    /// Stop after this many completed cycles
    pub max_cycles: Option<u64>,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            speed: 1.0,
            max_cycles: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    SourceExhausted,
    /// The notification worker went away
    BridgeClosed,
    CycleLimit,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    pub cycles_completed: u64,
    pub messages_sent: u64,
    pub rejected_readings: u64,
    pub virtual_elapsed: Duration,
    pub stop_reason: StopReason,
}

fn scaled(delay: Duration, speed: f64) -> Duration {
    if speed.is_finite() && speed > 0.0 {
        delay.div_f64(speed)
    } else {
        Duration::ZERO
    }
}

/// Step `controller` until cancellation, source exhaustion, a closed bridge
/// or the cycle limit. Queued notifications are forwarded after every step.
pub async fn run_control_loop(
    mut controller: CycleController,
    mut ctx: ControlContext,
    bridge: BridgeHandle,
    settings: RunnerSettings,
    cancel: CancellationToken,
) -> RunSummary {
    let started_cycles = controller.cycles_completed();
    let mut ticks = 0u64;
    let mut messages_sent = 0u64;

    info!(
        source = ctx.sampler.source_name(),
        speed = settings.speed,
        "🚀 Control loop started"
    );

    let stop_reason = 'run: loop {
        if cancel.is_cancelled() {
            break StopReason::Cancelled;
        }

        let delay = controller.step(&mut ctx);
        ticks += 1;

        for message in ctx.drain_outbox() {
            tokio::select! {
                () = cancel.cancelled() => break 'run StopReason::Cancelled,
                sent = bridge.send(message) => {
                    if let Err(e) = sent {
                        warn!(error = %e, "Notification bridge closed");
                        break 'run StopReason::BridgeClosed;
                    }
                    messages_sent += 1;
                }
            }
        }

        if ctx.exhausted {
            break StopReason::SourceExhausted;
        }
        if let Some(limit) = settings.max_cycles {
            if controller.cycles_completed() - started_cycles >= limit {
                break StopReason::CycleLimit;
            }
        }

        ctx.clock.advance(delay);
        let wait = scaled(delay, settings.speed);
        if wait < MIN_SLEEP {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                () = cancel.cancelled() => break StopReason::Cancelled,
                () = tokio::time::sleep(wait) => {}
            }
        }
    };

    let summary = RunSummary {
        ticks,
        cycles_completed: controller.cycles_completed(),
        messages_sent,
        rejected_readings: ctx.sampler.rejected(),
        virtual_elapsed: ctx.clock.now(),
        stop_reason,
    };

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("📊 FINAL STATISTICS");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("   Stop reason:          {:?}", summary.stop_reason);
    info!("   Ticks:                {}", summary.ticks);
    info!("   Virtual time:         {:.1}s", summary.virtual_elapsed.as_secs_f64());
    info!("   Cycles completed:     {}", summary.cycles_completed);
    info!("   Spectra stored:       {}", controller.stats().spectra_stored());
    info!("   Slope history:        {}", controller.stats().slope_history().len());
    info!("   Messages queued:      {}", summary.messages_sent);
    info!("   Rejected readings:    {}", summary.rejected_readings);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::acquisition::{ReplaySource, Sampler};
    use crate::config::{MonitorConfig, SamplerConfig};
    use crate::cycle::TickClock;
    use crate::notify::notification_bridge;
    use crate::storage::MemoryStore;

    fn setup(temps: Vec<f64>) -> (CycleController, ControlContext) {
        let sampler = Sampler::new(
            Box::new(ReplaySource::scripted(temps, vec![512.0; 100_000])),
            &SamplerConfig::default(),
        );
        let ctx = ControlContext::new(sampler, Arc::new(MemoryStore::new()), Arc::new(TickClock::new()));
        let controller = CycleController::new(&MonitorConfig::default(), &ctx);
        (controller, ctx)
    }

    #[test]
    fn test_scaled_delay() {
        let d = Duration::from_secs(5);
        assert_eq!(scaled(d, 1.0), d);
        assert_eq!(scaled(d, 5.0), Duration::from_secs(1));
        assert_eq!(scaled(d, 0.0), Duration::ZERO);
        assert_eq!(scaled(d, f64::INFINITY), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_stops_when_replay_exhausted() {
        let (controller, ctx) = setup(vec![70.0; 8]);
        let (bridge, _rx) = notification_bridge(4);
        let settings = RunnerSettings {
            speed: 0.0,
            max_cycles: None,
        };
        let summary = run_control_loop(controller, ctx, bridge, settings, CancellationToken::new()).await;
        assert_eq!(summary.stop_reason, StopReason::SourceExhausted);
        assert_eq!(summary.ticks, 9);
        // eight idle ticks of five seconds each (window capture included)
        assert_eq!(summary.virtual_elapsed, Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let (controller, ctx) = setup(vec![70.0; 8]);
        let (bridge, _rx) = notification_bridge(4);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = run_control_loop(controller, ctx, bridge, RunnerSettings::default(), cancel).await;
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.ticks, 0);
    }

    #[tokio::test]
    async fn test_closed_bridge_stops_loop() {
        let mut temps = vec![70.0; 60];
        temps.extend((0..60).map(|i| 70.0 + 0.5 * f64::from(i)));
        let (controller, ctx) = setup(temps);
        let (bridge, rx) = notification_bridge(4);
        drop(rx);
        let settings = RunnerSettings {
            speed: 0.0,
            max_cycles: None,
        };
        let summary = run_control_loop(controller, ctx, bridge, settings, CancellationToken::new()).await;
        // the first queued unit is the "collecting" update
        assert_eq!(summary.stop_reason, StopReason::BridgeClosed);
        assert_eq!(summary.messages_sent, 0);
    }
}
