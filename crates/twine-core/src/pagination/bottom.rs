/// Edge detector for the "scrolled to the end" load-more trigger.
#[derive(Debug, Clone, Copy, Default)]
pub struct BottomTracker {
    at_bottom: bool,
}

/// Everything the bottom trigger looks at, sampled on each scroll event.
#[derive(Debug, Clone, Copy)]
pub struct ScrollSample {
    pub at_bottom: bool,
    pub visible_count: usize,
    pub page_size: usize,
    pub load_more_automatically: bool,
    /// The older-direction lane is idle (not fetching and not in error)
    pub idle: bool,
}

impl BottomTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_bottom(&self) -> bool {
        self.at_bottom
    }

    /// Records the sample and returns true when a load-more should fire:
    /// only on the step from not-at-bottom to at-bottom, with automatic
    /// loading on, more than one page already listed, and the lane idle.
    pub fn observe(&mut self, sample: ScrollSample) -> bool {
        let was_at_bottom = std::mem::replace(&mut self.at_bottom, sample.at_bottom);
        sample.at_bottom
            && !was_at_bottom
            && sample.load_more_automatically
            && sample.visible_count > sample.page_size
            && sample.idle
    }

    pub fn reset(&mut self) {
        self.at_bottom = false;
    }
}
