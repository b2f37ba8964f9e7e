/// Bounds the number of model round trips in one turn.
pub struct LoopController {
    max_iterations: u32,
    iterations: u32,
    failure_count: u32,
}

impl LoopController {
    pub fn new(max_iterations: u32) -> Self {
        Self {
            max_iterations,
            iterations: 0,
            failure_count: 0,
        }
    }

    /// Claims the next iteration. Returns false once the cap is spent.
    pub fn begin_iteration(&mut self) -> bool {
        if self.should_stop() {
            return false;
        }
        self.iterations += 1;
        true
    }

    pub fn should_stop(&self) -> bool {
        self.iterations >= self.max_iterations
    }

    pub fn record_failure(&mut self) {
        self.failure_count += 1;
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn failures(&self) -> u32 {
        self.failure_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }
}
