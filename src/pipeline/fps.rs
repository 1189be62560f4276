use std::time::Instant;

/// Instantaneous frame rate, measured between consecutive ticks.
#[derive(Debug, Default)]
pub struct FpsCounter {
    previous: Option<Instant>,
}

impl FpsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a frame at `now` and returns `1 / (now - previous tick)`.
    ///
    /// The first tick has nothing to measure against and reports 0, as does a
    /// tick with no measurable time since the last one.
    pub fn tick(&mut self, now: Instant) -> f64 {
        let fps = match self.previous {
            Some(prev) => {
                let elapsed = now.saturating_duration_since(prev).as_secs_f64();
                if elapsed > 0.0 { 1.0 / elapsed } else { 0.0 }
            }
            None => 0.0,
        };
        self.previous = Some(now);
        fps
    }
}
