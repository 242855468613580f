use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub earned_points: u32,
    pub total_points: u32,
}

impl Score {
    pub fn percentage(&self) -> f64 {
        if self.total_points == 0 {
            0.0
        } else {
            (self.earned_points as f64 / self.total_points as f64) * 100.0
        }
    }
}
