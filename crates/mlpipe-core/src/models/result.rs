//! Decoded classification output.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A ranked label decoded from a model's output vector.
///
/// Holds plain values only; no tensor handle outlives the inference call
/// that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Human-readable class name.
    pub label: String,

    /// Index of the winning output.
    pub index: usize,

    /// Raw output value at `index`.
    pub confidence: f32,
}

impl ClassificationResult {
    /// Confidence expressed as a percentage.
    pub fn percent(&self) -> f32 {
        self.confidence * 100.0
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:.2}% confidence)", self.label, self.percent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let result = ClassificationResult {
            label: "Dog".to_string(),
            index: 0,
            confidence: 0.7,
        };
        assert_eq!(result.to_string(), "Dog (70.00% confidence)");
    }
}
