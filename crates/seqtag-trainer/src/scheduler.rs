//! Learning-rate reduction when the validation loss stops improving.

use crate::config::PlateauConfig;

/// `ReduceLROnPlateau` in `min` mode with a relative threshold.
#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    config: PlateauConfig,
    best: f64,
    num_bad_epochs: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(config: PlateauConfig) -> Self {
        Self {
            config,
            best: f64::INFINITY,
            num_bad_epochs: 0,
        }
    }

    /// Feed one epoch's metric. Returns the new learning rate when it should
    /// change, `None` otherwise.
    pub fn step(&mut self, metric: f64, current_lr: f64) -> Option<f64> {
        if metric < self.best * (1.0 - self.config.threshold) {
            self.best = metric;
            self.num_bad_epochs = 0;
        } else {
            self.num_bad_epochs += 1;
        }

        if self.num_bad_epochs <= self.config.patience {
            return None;
        }
        self.num_bad_epochs = 0;

        let reduced = (current_lr * self.config.factor).max(self.config.min_lr);
        (current_lr - reduced > self.config.eps).then_some(reduced)
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}
