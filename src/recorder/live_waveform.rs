// src/recorder/live_waveform.rs

use std::collections::VecDeque;

/// Scrolling history of input levels for the live recording display.
/// Oldest values fall off the left edge once `capacity` is reached.
pub struct LiveWaveform {
    capacity: usize,
    levels: VecDeque<f32>,
}

impl LiveWaveform {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            levels: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, level: f32) {
        if self.levels.len() == self.capacity {
            self.levels.pop_front();
        }
        self.levels.push_back(level.clamp(0.0, 1.0));
    }

    /// Snapshot for the UI, oldest first.
    pub fn snapshot(&self) -> Vec<f32> {
        self.levels.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.levels.clear();
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
