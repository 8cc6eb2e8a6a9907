use super::{Extent, InsertMode, SpanState};
use crate::utils::{align_down, align_up};
use std::collections::BTreeMap;

/// Address-ordered partition of `[0, total_pages)` into free and used extents.
///
/// Both sides of the partition are tracked in `BTreeMap`s keyed by start page,
/// so range-restricted searches walk holes in address order and the two maps
/// always tile the space exactly.
#[derive(Debug)]
pub struct RangeSpace {
    total: u64,

    // Start page -> size in pages. Holes available for allocation.
    free: BTreeMap<u64, u64>,
    // Start page -> size in pages. Extents currently handed out.
    used: BTreeMap<u64, u64>,
}

impl RangeSpace {
    #[must_use]
    pub fn new(total_pages: u64) -> Self {
        let mut free = BTreeMap::new();
        if total_pages > 0 {
            free.insert(0, total_pages);
        }
        Self {
            total: total_pages,
            free,
            used: BTreeMap::new(),
        }
    }

    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.total
    }

    /// Number of extents currently allocated out of this space.
    #[must_use]
    pub fn used_extents(&self) -> usize {
        self.used.len()
    }

    /// Find a free region of at least `size` pages aligned to `alignment`,
    /// fully contained in `[fpfn, lpfn)`, and convert it to a used extent.
    ///
    /// `lpfn == 0` means "no upper restriction". Returns `None` when no hole
    /// satisfies the constraints, which is a normal outcome under
    /// fragmentation rather than a fault.
    pub fn insert_in_range(
        &mut self,
        size: u64,
        alignment: u64,
        fpfn: u64,
        lpfn: u64,
        mode: InsertMode,
    ) -> Option<Extent> {
        if size == 0 {
            return None;
        }

        let lpfn = if lpfn == 0 {
            self.total
        } else {
            lpfn.min(self.total)
        };
        if fpfn >= lpfn || lpfn - fpfn < size {
            return None;
        }

        let start = match mode {
            InsertMode::BestFit => self
                .free
                .iter()
                .find_map(|(&hole, &len)| Self::fit_low(hole, len, size, alignment, fpfn, lpfn)),
            InsertMode::TopDown => self
                .free
                .iter()
                .rev()
                .find_map(|(&hole, &len)| Self::fit_high(hole, len, size, alignment, fpfn, lpfn)),
        }?;

        self.carve(start, size);
        Some(Extent { start, size })
    }

    /// Return a used extent to the free pool, coalescing with free neighbors.
    ///
    /// Removing an extent that is not tracked is a caller bug; it is logged
    /// and ignored (the partition cannot be corrupted by it).
    pub fn remove(&mut self, extent: &Extent) {
        match self.used.remove(&extent.start) {
            Some(size) if size == extent.size => {}
            Some(size) => {
                // Never splits a used extent, so a size mismatch means the
                // caller handed back something it never owned.
                log::error!(
                    "remove of extent {:#x}+{:#x} does not match tracked size {size:#x}",
                    extent.start,
                    extent.size
                );
                self.used.insert(extent.start, size);
                return;
            }
            None => {
                log::error!(
                    "tried to remove extent {:#x}+{:#x} which was not tracked",
                    extent.start,
                    extent.size
                );
                return;
            }
        }

        let mut start = extent.start;
        let mut size = extent.size;

        // Merge with the free predecessor if it ends exactly at us.
        let prev = self.free.range(..start).next_back().map(|(&s, &l)| (s, l));
        if let Some((prev_start, prev_size)) = prev {
            if prev_start + prev_size == start {
                self.free.remove(&prev_start);
                start = prev_start;
                size += prev_size;
            }
        }

        // Merge with the free successor if it begins exactly after us.
        if let Some(next_size) = self.free.remove(&extent.end()) {
            size += next_size;
        }

        self.free.insert(start, size);
    }

    /// Every extent, free and used, in address order. Read-only introspection
    /// for the debug dump and invariant checks.
    #[must_use]
    pub fn spans(&self) -> Vec<(Extent, SpanState)> {
        let mut spans: Vec<(Extent, SpanState)> = self
            .free
            .iter()
            .map(|(&start, &size)| (Extent { start, size }, SpanState::Free))
            .chain(
                self.used
                    .iter()
                    .map(|(&start, &size)| (Extent { start, size }, SpanState::Used)),
            )
            .collect();
        spans.sort_by_key(|(e, _)| e.start);
        spans
    }

    // =======================================================================
    // Search helpers
    // =======================================================================

    /// Lowest aligned start inside the hole `[hole, hole + len)` that keeps
    /// `size` pages within `[fpfn, lpfn)`.
    fn fit_low(hole: u64, len: u64, size: u64, alignment: u64, fpfn: u64, lpfn: u64) -> Option<u64> {
        let lo = hole.max(fpfn);
        let hi = (hole + len).min(lpfn);
        let start = align_up(lo, alignment);
        if start < hi && hi - start >= size {
            Some(start)
        } else {
            None
        }
    }

    /// Highest aligned start inside the hole that keeps `size` pages within
    /// `[fpfn, lpfn)`.
    fn fit_high(hole: u64, len: u64, size: u64, alignment: u64, fpfn: u64, lpfn: u64) -> Option<u64> {
        let lo = hole.max(fpfn);
        let hi = (hole + len).min(lpfn);
        if hi < lo || hi - lo < size {
            return None;
        }
        let start = align_down(hi - size, alignment);
        if start >= lo { Some(start) } else { None }
    }

    /// Carve `[start, start + size)` out of the containing free hole and move
    /// it to the used map. The caller guarantees the range fits.
    fn carve(&mut self, start: u64, size: u64) {
        let (&hole_start, &hole_size) = self
            .free
            .range(..=start)
            .next_back()
            .filter(|&(&hs, &hl)| start >= hs && start + size <= hs + hl)
            .unwrap_or_else(|| unreachable!("carve target {start:#x}+{size:#x} not in a free hole"));

        self.free.remove(&hole_start);
        if start > hole_start {
            self.free.insert(hole_start, start - hole_start);
        }
        let tail = hole_start + hole_size - (start + size);
        if tail > 0 {
            self.free.insert(start + size, tail);
        }

        self.used.insert(start, size);
    }
}
