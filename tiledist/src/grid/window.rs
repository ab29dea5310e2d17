//! Rectangular pixel windows within a parent grid.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A rectangular region of a parent grid, in pixel/line units.
///
/// The window spans columns `x_off..x_off + width` and rows
/// `y_off..y_off + height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Window {
    pub x_off: usize,
    pub y_off: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    /// Creates a new window.
    pub fn new(x_off: usize, y_off: usize, width: usize, height: usize) -> Self {
        Self {
            x_off,
            y_off,
            width,
            height,
        }
    }

    /// Window covering an entire `width × height` grid.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Exclusive right edge (first column past the window).
    pub fn right(&self) -> usize {
        self.x_off + self.width
    }

    /// Exclusive bottom edge (first row past the window).
    pub fn bottom(&self) -> usize {
        self.y_off + self.height
    }

    /// Number of cells in the window.
    pub fn area(&self) -> usize {
        self.width * self.height
    }

    /// Returns true if the window has no cells.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns true if the window lies fully inside a `width × height` grid.
    pub fn fits_within(&self, width: usize, height: usize) -> bool {
        self.right() <= width && self.bottom() <= height
    }

    /// Returns true if parent pixel `(x, y)` is inside the window.
    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x_off && x < self.right() && y >= self.y_off && y < self.bottom()
    }

    /// Overlapping region of two windows, if any.
    pub fn intersection(&self, other: &Window) -> Option<Window> {
        let x0 = self.x_off.max(other.x_off);
        let y0 = self.y_off.max(other.y_off);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        (x0 < x1 && y0 < y1).then(|| Window::new(x0, y0, x1 - x0, y1 - y0))
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}..{}, {}..{}]",
            self.x_off,
            self.right(),
            self.y_off,
            self.bottom()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edges_and_area() {
        let window = Window::new(2, 3, 4, 5);
        assert_eq!(window.right(), 6);
        assert_eq!(window.bottom(), 8);
        assert_eq!(window.area(), 20);
        assert!(!window.is_empty());
        assert!(Window::new(0, 0, 0, 3).is_empty());
    }

    #[test]
    fn test_fits_within() {
        let window = Window::new(2, 3, 4, 5);
        assert!(window.fits_within(6, 8));
        assert!(!window.fits_within(5, 8));
        assert!(!window.fits_within(6, 7));
    }

    #[test]
    fn test_contains() {
        let window = Window::new(1, 1, 2, 2);
        assert!(window.contains(1, 1));
        assert!(window.contains(2, 2));
        assert!(!window.contains(3, 1));
        assert!(!window.contains(0, 1));
    }

    #[test]
    fn test_intersection() {
        let a = Window::new(0, 0, 4, 4);
        let b = Window::new(2, 3, 4, 4);
        assert_eq!(a.intersection(&b), Some(Window::new(2, 3, 2, 1)));
        assert_eq!(a.intersection(&Window::new(4, 0, 2, 2)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Window::new(1, 2, 3, 4).to_string(), "[1..4, 2..6]");
    }
}
