// timing.rs — Scoped stage timer.
//
//   {
//       let _t = ScopedTimer::new("filter_time");
//       ... work ...
//   }   // logs "filter_time: 3.141 ms" here
//
// The elapsed time is logged at `info` when the guard drops, on every exit
// path including `?` early returns.

use std::time::{Duration, Instant};

/// Logs the elapsed wall time of a scope when dropped.
pub struct ScopedTimer {
    label: &'static str,
    start: Instant,
}

impl ScopedTimer {
    pub fn new(label: &'static str) -> Self {
        ScopedTimer {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for ScopedTimer {
    fn drop(&mut self) {
        log::info!("{}: {:.3} ms", self.label, millis(self.elapsed()));
    }
}

/// Duration as fractional milliseconds.
#[inline]
pub fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}
