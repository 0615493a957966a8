//! Window arithmetic
//!
//! Resolves a consumer's requested initial window against a known total so
//! that the window never reads past the end of the dataset.

use serde::Serialize;
use std::fmt;

/// A contiguous `[start, start + len)` slice of the predicate's row order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Window {
    pub start: usize,
    pub len: usize,
}

impl Window {
    pub fn new(start: usize, len: usize) -> Self {
        Window { start, len }
    }

    /// One past the last position, saturating at `usize::MAX`
    pub fn end(&self) -> usize {
        self.start.saturating_add(self.len)
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, position: usize) -> bool {
        position >= self.start && position < self.end()
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end())
    }
}

/// Resolve the first window to load for a dataset of `total` rows.
///
/// Without alignment the start is `clamp(requested_start, 0, total - size)`.
/// With `align = Some(page)` the start is first rounded down to a page
/// boundary and capped at the last page boundary from which a full window
/// can still begin. In both cases the length is `min(size, total - start)`.
pub fn resolve_initial(
    requested_start: usize,
    requested_size: usize,
    total: usize,
    align: Option<usize>,
) -> Window {
    if total == 0 {
        return Window::new(0, 0);
    }

    let last_full_start = total.saturating_sub(requested_size);
    let start = match align {
        Some(page) if page > 0 => {
            let aligned = requested_start / page * page;
            let last_page = last_full_start.div_ceil(page) * page;
            aligned.min(last_page)
        }
        _ => requested_start.min(last_full_start),
    };
    // A rounded-up last page can sit past the end for tiny datasets
    let start = start.min(total);

    Window::new(start, requested_size.min(total - start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_inside_dataset() {
        assert_eq!(resolve_initial(4, 5, 10, None), Window::new(4, 5));
    }

    #[test]
    fn test_start_clamped_to_last_full_window() {
        assert_eq!(resolve_initial(8, 5, 10, None), Window::new(5, 5));
        assert_eq!(resolve_initial(100, 5, 10, None), Window::new(5, 5));
    }

    #[test]
    fn test_size_bounded_by_total() {
        assert_eq!(resolve_initial(0, 50, 10, None), Window::new(0, 10));
        assert_eq!(resolve_initial(3, 50, 10, None), Window::new(0, 10));
    }

    #[test]
    fn test_empty_dataset() {
        assert_eq!(resolve_initial(7, 5, 0, None), Window::new(0, 0));
        assert_eq!(resolve_initial(7, 5, 0, Some(4)), Window::new(0, 0));
    }

    #[test]
    fn test_aligned_start() {
        // 13 rounds down to 10
        assert_eq!(resolve_initial(13, 10, 100, Some(10)), Window::new(10, 10));
        // last full start 90 is already on a page boundary
        assert_eq!(resolve_initial(97, 10, 100, Some(10)), Window::new(90, 10));
        assert_eq!(resolve_initial(99, 10, 103, Some(10)), Window::new(90, 10));
    }

    #[test]
    fn test_aligned_start_can_shorten_last_window() {
        // last full start 93 rounds up to 100, window is the 3-row tail
        assert_eq!(resolve_initial(100, 10, 103, Some(10)), Window::new(100, 3));
    }

    #[test]
    fn test_window_helpers() {
        let window = Window::new(4, 5);
        assert_eq!(window.end(), 9);
        assert!(window.contains(4));
        assert!(window.contains(8));
        assert!(!window.contains(9));
        assert_eq!(window.to_string(), "[4, 9)");
    }

    #[test]
    fn test_window_end_saturates() {
        let window = Window::new(usize::MAX - 2, 10);
        assert_eq!(window.end(), usize::MAX);
        assert!(window.contains(usize::MAX - 1));
        assert!(!window.contains(usize::MAX - 3));
        assert_eq!(window.to_string(), format!("[{}, {})", usize::MAX - 2, usize::MAX));
    }
}
