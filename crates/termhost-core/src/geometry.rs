//! Terminal geometry.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Dimensions of a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Dimensions {
    /// Number of rows
    pub rows: u16,
    /// Number of columns
    pub cols: u16,
}

impl Dimensions {
    /// Create new dimensions.
    pub fn new(rows: u16, cols: u16) -> Self {
        Self { rows, cols }
    }

    /// Half of the default size, used to force a full-screen program to
    /// repaint after a reattach.
    pub fn jiggle() -> Self {
        let dims = Self::default();
        Self::new(dims.rows / 2, dims.cols / 2)
    }

    /// Whether both dimensions are non-zero.
    pub fn is_valid(&self) -> bool {
        self.rows > 0 && self.cols > 0
    }

    /// Total cell count (rows * cols).
    pub fn cell_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }
}

impl Default for Dimensions {
    fn default() -> Self {
        Self::new(24, 80)
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dimensions_default() {
        let dims = Dimensions::default();
        assert_eq!(dims.rows, 24);
        assert_eq!(dims.cols, 80);
    }

    #[test]
    fn test_dimensions_jiggle_is_half_default() {
        let dims = Dimensions::jiggle();
        assert_eq!(dims, Dimensions::new(12, 40));
    }

    #[test]
    fn test_dimensions_validity() {
        assert!(Dimensions::new(1, 1).is_valid());
        assert!(!Dimensions::new(0, 80).is_valid());
        assert!(!Dimensions::new(24, 0).is_valid());
    }

    #[test]
    fn test_dimensions_display() {
        assert_eq!(Dimensions::new(24, 80).to_string(), "80x24");
        assert_eq!(Dimensions::new(24, 80).cell_count(), 1920);
    }
}
