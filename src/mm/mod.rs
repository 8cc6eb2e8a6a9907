pub mod range;

/// A contiguous run of pages carved out of the address space.
///
/// While free it is owned by the [`RangeSpace`] free pool; once inserted it is
/// owned by exactly one allocation until it is handed back via
/// [`RangeSpace::remove`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// First page frame number of the run.
    pub start: u64,
    /// Length in pages.
    pub size: u64,
}

impl Extent {
    /// One past the last page frame number.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.size
    }
}

/// Tie-break for the range search when several holes fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsertMode {
    /// Lowest usable aligned address (bottom-up).
    #[default]
    BestFit,
    /// Highest usable aligned address, keeping low addresses free for
    /// scanout and other legacy placement constraints.
    TopDown,
}

/// Whether a span reported by [`RangeSpace::spans`] is free or allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanState {
    Free,
    Used,
}

// Re-export the range space for easy access
pub use range::RangeSpace;
