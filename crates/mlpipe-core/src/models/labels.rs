//! Mapping from output index to class name.

use serde::{Deserialize, Serialize};

/// How indices beyond the end of the label table are named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// Wrap around: index `i` maps to `labels[i % len]`.
    ///
    /// This is an approximation for demo label sets that are shorter than
    /// the model's class count; the names it produces are not meaningful.
    #[default]
    Approximate,

    /// Index `i` maps to `labels[i]`, or `class i` past the end.
    Exact,
}

/// Fixed, ordered class names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTable {
    labels: Vec<String>,
    mode: LabelMode,
}

impl LabelTable {
    /// Create a table with the given labels and mode.
    pub fn new<I, S>(labels: I, mode: LabelMode) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: labels.into_iter().map(Into::into).collect(),
            mode,
        }
    }

    /// Table with no names; every index renders as `class i`.
    pub fn unnamed() -> Self {
        Self {
            labels: Vec::new(),
            mode: LabelMode::Exact,
        }
    }

    /// The demo class names shipped with the image classifier.
    pub fn demo() -> Self {
        Self::new(DEMO_CLASSES.iter().copied(), LabelMode::Approximate)
    }

    /// Number of named classes.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Returns true if the table has no names.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Mapping mode.
    pub fn mode(&self) -> LabelMode {
        self.mode
    }

    /// Name for output index `index`.
    pub fn label(&self, index: usize) -> String {
        if self.labels.is_empty() {
            return format!("class {}", index);
        }
        match self.mode {
            LabelMode::Approximate => self.labels[index % self.labels.len()].clone(),
            LabelMode::Exact => self
                .labels
                .get(index)
                .cloned()
                .unwrap_or_else(|| format!("class {}", index)),
        }
    }
}

impl Default for LabelTable {
    fn default() -> Self {
        Self::demo()
    }
}

/// Placeholder class names; not an ImageNet mapping.
pub const DEMO_CLASSES: [&str; 10] = [
    "Dog", "Cat", "Car", "Bird", "Flower", "Tree", "Person", "Building", "Food", "Object",
];
