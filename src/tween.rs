use std::f64::consts::PI;
use std::time::Duration;

/// Easing curves, with the usual tween.js shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Easing {
    #[default]
    Linear,
    QuadraticInOut,
    CubicInOut,
    ElasticInOut,
}

impl Easing {
    /// Map progress `k` in [0, 1] to an eased fraction. Elastic overshoots.
    pub fn apply(self, k: f64) -> f64 {
        match self {
            Easing::Linear => k,
            Easing::QuadraticInOut => {
                let k = k * 2.0;
                if k < 1.0 {
                    0.5 * k * k
                } else {
                    let k = k - 1.0;
                    -0.5 * (k * (k - 2.0) - 1.0)
                }
            }
            Easing::CubicInOut => {
                let k = k * 2.0;
                if k < 1.0 {
                    0.5 * k * k * k
                } else {
                    let k = k - 2.0;
                    0.5 * (k * k * k + 2.0)
                }
            }
            Easing::ElasticInOut => {
                if k <= 0.0 {
                    return 0.0;
                }
                if k >= 1.0 {
                    return 1.0;
                }
                let k = k * 2.0;
                let wave = ((k - 1.1) * 5.0 * PI).sin();
                if k < 1.0 {
                    -0.5 * 2f64.powf(10.0 * (k - 1.0)) * wave
                } else {
                    0.5 * 2f64.powf(-10.0 * (k - 1.0)) * wave + 1.0
                }
            }
        }
    }
}

/// A scalar interpolation advanced by frame time.
#[derive(Debug, Clone, PartialEq)]
pub struct Tween {
    from: f64,
    to: f64,
    duration: Duration,
    elapsed: Duration,
    easing: Easing,
}

impl Tween {
    pub fn new(from: f64, to: f64, duration: Duration, easing: Easing) -> Self {
        Self {
            from,
            to,
            duration,
            elapsed: Duration::ZERO,
            easing,
        }
    }

    /// Move forward by `dt` and return the new value.
    pub fn advance(&mut self, dt: Duration) -> f64 {
        self.elapsed = (self.elapsed + dt).min(self.duration);
        self.value()
    }

    /// Linear progress in [0, 1]. A zero duration is complete at once.
    pub fn progress(&self) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        self.elapsed.as_secs_f64() / self.duration.as_secs_f64()
    }

    /// Current eased value. Exactly `to` once finished.
    pub fn value(&self) -> f64 {
        if self.is_finished() {
            return self.to;
        }
        self.from + (self.to - self.from) * self.easing.apply(self.progress())
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.duration
    }

    pub fn target(&self) -> f64 {
        self.to
    }
}
