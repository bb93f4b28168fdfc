//! Fixed tunable parameters for the control kernel.

/// Value-only record of the control tunables. Everything here is read once at process
/// startup and cloned into every component that needs it; nothing is computed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Lower threshold (°C) of the HOT band.
    pub t1: f64,
    /// Upper threshold (°C) of the HOT band. Must be `> t1` for the proportional branch;
    /// when `t2 <= t1` the state machine falls back to the binary behaviour of §4.5.
    pub t2: f64,
    /// Telemetry window capacity.
    pub n_last_measurements: usize,
    /// Seconds the system must remain in `TOO_HOT` before latching into `ALARM`.
    pub alarm_duration_secs: u64,
    /// "Slow" sampling period in seconds, used outside the hot band.
    pub f1_secs: u64,
    /// "Fast" sampling period in seconds, used inside the hot band.
    pub f2_secs: u64,
}

impl Config {
    pub const WINDOW_CLOSED: f64 = 0.0;
    pub const WINDOW_FULLY_OPEN: f64 = 1.0;
    pub const WINDOW_EPSILON: f64 = 0.001;

    pub const DEFAULT_T1: f64 = 20.0;
    pub const DEFAULT_T2: f64 = 27.0;
    pub const DEFAULT_N: usize = 10;
    pub const DEFAULT_ALARM_DURATION_SECS: u64 = 300;
    pub const DEFAULT_F1_SECS: u64 = 60;
    pub const DEFAULT_F2_SECS: u64 = 10;
}

impl Default for Config {
    fn default() -> Self {
        Self {
            t1: Self::DEFAULT_T1,
            t2: Self::DEFAULT_T2,
            n_last_measurements: Self::DEFAULT_N,
            alarm_duration_secs: Self::DEFAULT_ALARM_DURATION_SECS,
            f1_secs: Self::DEFAULT_F1_SECS,
            f2_secs: Self::DEFAULT_F2_SECS,
        }
    }
}
