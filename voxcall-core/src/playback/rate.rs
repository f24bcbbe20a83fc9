//! Playback rate state with bounded-step convergence.
//!
//! `current` never jumps: each render cycle it moves toward its goal by at
//! most `step`. This is what keeps rate corrections free of audible pitch
//! artifacts.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimits {
    /// Nominal rate, slightly below 1.0 so the queue builds a small margin.
    pub base: f32,
    pub min: f32,
    /// Ceiling reachable only in catch-up mode.
    pub max: f32,
    /// Largest change of `current` per render cycle.
    pub step: f32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            base: 0.98,
            min: 0.90,
            max: 1.25,
            step: 0.002,
        }
    }
}

impl RateLimits {
    /// Repair inconsistent limits so `min <= base <= max` and `step > 0`.
    pub fn sanitized(mut self) -> Self {
        let finite_or = |v: f32, d: f32| if v.is_finite() && v > 0.0 { v } else { d };
        let d = Self::default();
        self.base = finite_or(self.base, d.base);
        self.min = finite_or(self.min, d.min).min(self.base);
        self.max = finite_or(self.max, d.max).max(self.base);
        self.step = finite_or(self.step, d.step);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RateController {
    limits: RateLimits,
    target: f32,
    current: f32,
}

impl RateController {
    pub fn new(limits: RateLimits) -> Self {
        let limits = limits.sanitized();
        Self {
            limits,
            target: limits.base,
            current: limits.base,
        }
    }

    pub fn limits(&self) -> RateLimits {
        self.limits
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Set the target rate. Clamped to `[min, base]`, or `[min, max]` when
    /// `allow_above_base` unlocks catch-up. Non-finite values are ignored.
    pub fn set_target(&mut self, value: f32, allow_above_base: bool) {
        if !value.is_finite() {
            return;
        }
        let upper = if allow_above_base {
            self.limits.max
        } else {
            self.limits.base
        };
        self.target = value.clamp(self.limits.min, upper);
    }

    /// Advance one render cycle. Under `low_water` the goal is capped at
    /// `base`, slowing playback down to rebuild margin.
    ///
    /// Returns the signed change applied.
    pub fn tick(&mut self, low_water: bool) -> f32 {
        let goal = if low_water {
            self.target.min(self.limits.base)
        } else {
            self.target
        };
        let gap = goal - self.current;
        let delta = gap.clamp(-self.limits.step, self.limits.step);
        self.current += delta;
        if (goal - self.current).abs() < 1e-6 {
            self.current = goal;
        }
        delta
    }

    /// Return both target and current to `base` immediately (queue flushed,
    /// nothing is playing so there is nothing to click).
    pub fn reset(&mut self) {
        self.target = self.limits.base;
        self.current = self.limits.base;
    }
}
