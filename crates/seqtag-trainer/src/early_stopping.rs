/// Stops training once the monitored loss has not improved for `patience`
/// consecutive epochs.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<f64>,
    counter: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            counter: 0,
        }
    }

    /// Record one observation; returns `true` when training should stop.
    pub fn step(&mut self, value: f64) -> bool {
        match self.best {
            Some(best) if value >= best => {
                self.counter += 1;
                self.counter >= self.patience
            }
            _ => {
                self.best = Some(value);
                self.counter = 0;
                false
            }
        }
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn counter(&self) -> usize {
        self.counter
    }
}
