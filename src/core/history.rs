// Fixed-size rolling histories used to smooth per-device confidence and derive palm velocity

use nalgebra::Vector3;

use crate::models::NUM_JOINT_POSITIONS;

/// Ring buffer write cursor shared by the histories below
#[derive(Debug, Clone)]
struct RingCursor {
    capacity: usize,
    next: usize,
    len: usize,
}

impl RingCursor {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next: 0,
            len: 0,
        }
    }

    /// Slot to write, advancing the cursor
    fn advance(&mut self) -> usize {
        let slot = self.next;
        self.next = (self.next + 1) % self.capacity;
        self.len = (self.len + 1).min(self.capacity);
        slot
    }

    /// Slot holding the oldest sample, if any
    fn oldest(&self) -> Option<usize> {
        match self.len {
            0 => None,
            len if len < self.capacity => Some(0),
            _ => Some(self.next),
        }
    }

    fn clear(&mut self) {
        self.next = 0;
        self.len = 0;
    }
}

// ==============================================================================
// Palm Position History
// ==============================================================================

/// Timestamped palm positions for velocity estimation
#[derive(Debug, Clone)]
pub struct PositionHistory {
    samples: Vec<(Vector3<f32>, f64)>,
    cursor: RingCursor,
}

impl PositionHistory {
    pub fn new(capacity: usize) -> Self {
        let cursor = RingCursor::new(capacity);
        Self {
            samples: vec![(Vector3::zeros(), 0.0); cursor.capacity],
            cursor,
        }
    }

    pub fn add(&mut self, position: Vector3<f32>, time_seconds: f64) {
        let slot = self.cursor.advance();
        self.samples[slot] = (position, time_seconds);
    }

    /// Oldest retained `(position, time)`
    pub fn oldest(&self) -> Option<(Vector3<f32>, f64)> {
        self.cursor.oldest().map(|slot| self.samples[slot])
    }

    pub fn len(&self) -> usize {
        self.cursor.len
    }

    pub fn is_empty(&self) -> bool {
        self.cursor.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.cursor.len == self.cursor.capacity
    }

    pub fn clear(&mut self) {
        self.cursor.clear();
    }
}

// ==============================================================================
// Hand Confidence History
// ==============================================================================

#[derive(Debug, Clone)]
pub struct HandConfidenceHistory {
    values: Vec<f32>,
    cursor: RingCursor,
}

impl HandConfidenceHistory {
    pub fn new(capacity: usize) -> Self {
        let cursor = RingCursor::new(capacity);
        Self {
            values: vec![0.0; cursor.capacity],
            cursor,
        }
    }

    pub fn add(&mut self, confidence: f32) {
        let slot = self.cursor.advance();
        self.values[slot] = confidence;
    }

    /// Mean of the retained samples, 0 when empty
    pub fn average(&self) -> f32 {
        if self.cursor.len == 0 {
            return 0.0;
        }
        let total: f32 = self.values[..self.cursor.len].iter().sum();
        total / self.cursor.len as f32
    }

    pub fn len(&self) -> usize {
        self.cursor.len
    }

    pub fn clear(&mut self) {
        self.cursor.clear();
    }
}

// ==============================================================================
// Joint Confidence History
// ==============================================================================

pub type JointConfidences = [f32; NUM_JOINT_POSITIONS];

#[derive(Debug, Clone)]
pub struct JointConfidenceHistory {
    samples: Vec<JointConfidences>,
    cursor: RingCursor,
}

impl JointConfidenceHistory {
    pub fn new(capacity: usize) -> Self {
        let cursor = RingCursor::new(capacity);
        Self {
            samples: vec![[0.0; NUM_JOINT_POSITIONS]; cursor.capacity],
            cursor,
        }
    }

    pub fn add(&mut self, confidences: JointConfidences) {
        let slot = self.cursor.advance();
        self.samples[slot] = confidences;
    }

    /// Element-wise mean of the retained samples, all zeros when empty
    pub fn average(&self) -> JointConfidences {
        let mut mean = [0.0; NUM_JOINT_POSITIONS];
        if self.cursor.len == 0 {
            return mean;
        }
        for sample in &self.samples[..self.cursor.len] {
            for (total, value) in mean.iter_mut().zip(sample) {
                *total += value;
            }
        }
        for total in mean.iter_mut() {
            *total /= self.cursor.len as f32;
        }
        mean
    }

    pub fn clear(&mut self) {
        self.cursor.clear();
    }
}
