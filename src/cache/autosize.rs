//! Auto-resize controller (spec §4.1.7, §9 design note "Auto-resize as
//! an observer").
//!
//! A pure function of `{accesses, hits}` samples plus the current
//! `{max_size, min_clean_size}` and a `AutoResizeConfig`; it has no
//! inner knowledge of the cache and emits configuration deltas the
//! cache applies. This makes it trivial to unit-test in isolation.

use crate::config::{AutoResizeConfig, DecreaseMode, FlashIncreaseMode, IncreaseMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeStatus {
    InSpec,
    Increase,
    FlashIncrease,
    Decrease,
    AtMax,
    AtMin,
    IncreaseDisabled,
    DecreaseDisabled,
    NotFull,
}

#[derive(Debug, Clone, Copy)]
pub struct ResizeReport {
    pub status: ResizeStatus,
    pub old_max: usize,
    pub new_max: usize,
    pub old_min_clean: usize,
    pub new_min_clean: usize,
}

/// Epoch-sampled hit-rate state machine (spec §4.1.7).
pub struct AutoResizeController {
    config: AutoResizeConfig,
    accesses_since_sample: u64,
    hits_since_sample: u64,
}

impl AutoResizeController {
    pub fn new(config: AutoResizeConfig) -> Self {
        Self { config, accesses_since_sample: 0, hits_since_sample: 0 }
    }

    pub fn record_access(&mut self, hit: bool) {
        self.accesses_since_sample += 1;
        if hit {
            self.hits_since_sample += 1;
        }
    }

    pub fn due_for_sample(&self) -> bool {
        self.accesses_since_sample >= self.config.epoch_length
    }

    /// A single large insert that may warrant an immediate flash
    /// increase, independent of the epoch sampling cadence.
    pub fn consider_flash_increase(
        &self,
        current_max: usize,
        min_clean: usize,
        inserted_bytes: usize,
    ) -> Option<ResizeReport> {
        if let FlashIncreaseMode::AddSpace = self.config.flash_incr_mode {
            let threshold = (current_max as f64 * self.config.flash_threshold) as usize;
            if inserted_bytes > threshold {
                let new_max =
                    (current_max + inserted_bytes).min(self.config.max_size).max(current_max);
                return Some(ResizeReport {
                    status: ResizeStatus::FlashIncrease,
                    old_max: current_max,
                    new_max,
                    old_min_clean: min_clean,
                    new_min_clean: min_clean,
                });
            }
        }
        None
    }

    /// Sample-driven adjustment, called once `due_for_sample()` is true.
    /// Resets the epoch counters regardless of the outcome.
    pub fn sample(&mut self, current_max: usize, min_clean: usize) -> ResizeReport {
        let total = self.accesses_since_sample;
        let hits = self.hits_since_sample;
        self.accesses_since_sample = 0;
        self.hits_since_sample = 0;

        if total == 0 {
            return ResizeReport {
                status: ResizeStatus::NotFull,
                old_max: current_max,
                new_max: current_max,
                old_min_clean: min_clean,
                new_min_clean: min_clean,
            };
        }

        let hit_rate = hits as f64 / total as f64;

        if hit_rate < self.config.lower_hr {
            return self.increase(current_max, min_clean);
        }
        if hit_rate > self.config.upper_hr {
            return self.decrease(current_max, min_clean);
        }

        ResizeReport {
            status: ResizeStatus::InSpec,
            old_max: current_max,
            new_max: current_max,
            old_min_clean: min_clean,
            new_min_clean: min_clean,
        }
    }

    fn increase(&self, current_max: usize, min_clean: usize) -> ResizeReport {
        match self.config.increase_mode {
            IncreaseMode::Off => ResizeReport {
                status: ResizeStatus::IncreaseDisabled,
                old_max: current_max,
                new_max: current_max,
                old_min_clean: min_clean,
                new_min_clean: min_clean,
            },
            IncreaseMode::Threshold { increment } => {
                if current_max >= self.config.max_size {
                    return ResizeReport {
                        status: ResizeStatus::AtMax,
                        old_max: current_max,
                        new_max: current_max,
                        old_min_clean: min_clean,
                        new_min_clean: min_clean,
                    };
                }
                let new_max = ((current_max as f64 * increment) as usize).min(self.config.max_size);
                ResizeReport {
                    status: ResizeStatus::Increase,
                    old_max: current_max,
                    new_max,
                    old_min_clean: min_clean,
                    new_min_clean: min_clean,
                }
            }
        }
    }

    fn decrease(&self, current_max: usize, min_clean: usize) -> ResizeReport {
        match self.config.decrease_mode {
            DecreaseMode::Off => ResizeReport {
                status: ResizeStatus::DecreaseDisabled,
                old_max: current_max,
                new_max: current_max,
                old_min_clean: min_clean,
                new_min_clean: min_clean,
            },
            DecreaseMode::Threshold { decrement } => {
                if current_max <= self.config.min_size {
                    return ResizeReport {
                        status: ResizeStatus::AtMin,
                        old_max: current_max,
                        new_max: current_max,
                        old_min_clean: min_clean,
                        new_min_clean: min_clean,
                    };
                }
                let new_max = ((current_max as f64 * decrement) as usize).max(self.config.min_size);
                ResizeReport {
                    status: ResizeStatus::Decrease,
                    old_max: current_max,
                    new_max,
                    old_min_clean: min_clean,
                    new_min_clean: min_clean,
                }
            }
            DecreaseMode::AgeOut { .. } | DecreaseMode::AgeOutWithThreshold { .. } => {
                // Age-out modes rely on per-entry access-age tracking the
                // cache itself performs; the controller here only signals
                // that a decrease is due and leaves victim selection to
                // MSIC's ordinary LRU walk.
                if current_max <= self.config.min_size {
                    return ResizeReport {
                        status: ResizeStatus::AtMin,
                        old_max: current_max,
                        new_max: current_max,
                        old_min_clean: min_clean,
                        new_min_clean: min_clean,
                    };
                }
                let new_max = ((current_max as f64 * 0.9) as usize).max(self.config.min_size);
                ResizeReport {
                    status: ResizeStatus::Decrease,
                    old_max: current_max,
                    new_max,
                    old_min_clean: min_clean,
                    new_min_clean: min_clean,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> AutoResizeConfig {
        AutoResizeConfig {
            lower_hr: 0.9,
            upper_hr: 0.999,
            increase_mode: IncreaseMode::Threshold { increment: 2.0 },
            decrease_mode: DecreaseMode::Threshold { decrement: 0.5 },
            min_size: 100,
            max_size: 10_000,
            flash_incr_mode: FlashIncreaseMode::AddSpace,
            flash_threshold: 0.25,
            epoch_length: 10,
        }
    }

    #[test]
    fn low_hit_rate_increases() {
        let mut ctl = AutoResizeController::new(cfg());
        for _ in 0..8 {
            ctl.record_access(false);
        }
        for _ in 0..2 {
            ctl.record_access(true);
        }
        let report = ctl.sample(1000, 100);
        assert_eq!(report.status, ResizeStatus::Increase);
        assert_eq!(report.new_max, 2000);
    }

    #[test]
    fn very_high_hit_rate_decreases() {
        let mut ctl = AutoResizeController::new(cfg());
        for _ in 0..10 {
            ctl.record_access(true);
        }
        let report = ctl.sample(1000, 100);
        assert_eq!(report.status, ResizeStatus::Decrease);
        assert_eq!(report.new_max, 500);
    }

    #[test]
    fn mid_hit_rate_is_in_spec() {
        let mut ctl = AutoResizeController::new(cfg());
        for _ in 0..9 {
            ctl.record_access(true);
        }
        ctl.record_access(false);
        let report = ctl.sample(1000, 100);
        assert_eq!(report.status, ResizeStatus::InSpec);
    }

    #[test]
    fn flash_increase_reacts_to_large_insert() {
        let ctl = AutoResizeController::new(cfg());
        let report = ctl.consider_flash_increase(1000, 100, 400);
        assert!(report.is_some());
        assert_eq!(report.unwrap().status, ResizeStatus::FlashIncrease);
    }
}
