//! Pure derivation of `(state, window%, sampling period)` from temperature and prior state.
//!
//! Nothing in this module touches ports, channels, or wall-clock time beyond the `now`
//! passed in by the caller, so it is exercised directly by `#[test]`/`rstest` without any
//! async machinery.

use std::time::{Duration, Instant};

use kernel_messages::{Mode, ThermalState};

use crate::config::Config;

/// Inputs the state machine derives a new state from.
#[derive(Debug, Clone, Copy)]
pub struct Inputs {
    pub temperature: f64,
    pub now: Instant,
    pub prior_state: ThermalState,
    pub too_hot_start: Option<Instant>,
    pub mode: Mode,
    /// The window opening already in effect, used verbatim in `MANUAL` mode.
    pub manual_window_opening: f64,
}

/// Output of one evaluation: the derived state, window opening, sampling period, and the
/// (possibly unchanged, possibly cleared, possibly newly-set) too-hot timer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outputs {
    pub state: ThermalState,
    pub window_opening: f64,
    pub sampling_period_secs: u64,
    pub too_hot_start: Option<Instant>,
}

/// Evaluate the thermal state machine. Total and side-effect free.
pub fn evaluate(inputs: Inputs, config: &Config) -> Outputs {
    if inputs.prior_state == ThermalState::Alarm {
        return Outputs {
            state: ThermalState::Alarm,
            window_opening: Config::WINDOW_FULLY_OPEN,
            sampling_period_secs: config.f2_secs,
            too_hot_start: inputs.too_hot_start,
        };
    }

    if inputs.mode == Mode::Manual {
        return Outputs {
            state: inputs.prior_state,
            window_opening: inputs.manual_window_opening,
            sampling_period_secs: config.f1_secs,
            too_hot_start: None,
        };
    }

    let t = inputs.temperature;

    if t < config.t1 {
        return Outputs {
            state: ThermalState::Normal,
            window_opening: Config::WINDOW_CLOSED,
            sampling_period_secs: config.f1_secs,
            too_hot_start: None,
        };
    }

    if t <= config.t2 {
        let opening = if config.t2 > config.t1 {
            let raw = (t - config.t1) / (config.t2 - config.t1) * (Config::WINDOW_FULLY_OPEN - 0.01) + 0.01;
            raw.clamp(0.01, Config::WINDOW_FULLY_OPEN)
        } else if t <= config.t1 {
            0.01
        } else {
            Config::WINDOW_FULLY_OPEN
        };

        return Outputs {
            state: ThermalState::Hot,
            window_opening: opening,
            sampling_period_secs: config.f2_secs,
            too_hot_start: None,
        };
    }

    // t > T2: TOO_HOT, possibly latching into ALARM.
    let too_hot_start = inputs.too_hot_start.unwrap_or(inputs.now);
    let state = if inputs.too_hot_start.is_some() && inputs.now.saturating_duration_since(too_hot_start) >= Duration::from_secs(config.alarm_duration_secs) {
        ThermalState::Alarm
    } else {
        ThermalState::TooHot
    };

    Outputs {
        state,
        window_opening: Config::WINDOW_FULLY_OPEN,
        sampling_period_secs: config.f2_secs,
        too_hot_start: Some(too_hot_start),
    }
}
