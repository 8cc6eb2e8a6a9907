use crate::error::{VramError, VramResult};
use crate::mm::{Extent, InsertMode, RangeSpace, SpanState};
use crate::utils::{bytes_to_pages, pages_to_bytes, prev_power_of_two};
use crate::vram::{DEFAULT_PAGES_PER_EXTENT, Placement, RangeManager, VramAllocation, VramConfig};
use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// VRAM range manager for one device.
///
/// Owns the range space behind a single lock plus two atomic byte counters:
/// total usage and usage inside the CPU-visible window. The counters are
/// updated outside the lock and read lock-free, so they are eventually
/// consistent with the range space under concurrent mutation but never torn.
#[derive(Debug)]
pub struct VramManager {
    mm: Mutex<RangeSpace>,
    usage: AtomicU64,
    vis_usage: AtomicU64,

    total_size: u64,
    visible_size: u64,
}

impl VramManager {
    /// Initialize the manager over `[0, total_size)` bytes of device memory.
    #[must_use]
    pub fn new(config: VramConfig) -> Self {
        Self {
            mm: Mutex::new(RangeSpace::new(bytes_to_pages(config.total_size))),
            usage: AtomicU64::new(0),
            vis_usage: AtomicU64::new(0),
            total_size: config.total_size,
            visible_size: config.visible_size,
        }
    }

    /// Total device memory in bytes.
    #[must_use]
    pub const fn total_size(&self) -> u64 {
        self.total_size
    }

    /// CPU-visible device memory in bytes.
    #[must_use]
    pub const fn visible_total(&self) -> u64 {
        self.visible_size
    }

    /// Bytes currently allocated. Lock-free read; see the struct docs for the
    /// consistency model.
    #[must_use]
    pub fn usage(&self) -> u64 {
        self.usage.load(Ordering::Relaxed)
    }

    /// Bytes currently allocated inside the CPU-visible window.
    #[must_use]
    pub fn vis_usage(&self) -> u64 {
        self.vis_usage.load(Ordering::Relaxed)
    }

    /// Allocate backing store for `num_pages` under the given placement.
    ///
    /// Returns `Ok(None)` when the optimistic capacity pre-check fails: a
    /// soft "no space" outcome the caller answers with eviction or a fallback
    /// domain, not an error.
    ///
    /// # Errors
    /// [`VramError::NoSpace`] when the pre-check passed but the range search
    /// could not satisfy the request (fragmentation). Every extent placed for
    /// this request is rolled back and both counters are restored first.
    pub fn alloc(
        &self,
        num_pages: u64,
        place: &Placement,
    ) -> VramResult<Option<VramAllocation>> {
        if num_pages == 0 {
            return Ok(None);
        }

        // Optimistic pre-check: bail out quickly if there is likely not
        // enough VRAM for this request. Runs outside the lock, so it can
        // race a concurrent free into a spurious soft-fail; that is an
        // accepted trade against lock contention on the hot path.
        let mem_bytes = pages_to_bytes(num_pages);
        if self.usage.fetch_add(mem_bytes, Ordering::Relaxed) + mem_bytes > self.total_size {
            self.usage.fetch_sub(mem_bytes, Ordering::Relaxed);
            log::trace!("soft no-space for {mem_bytes} bytes");
            return Ok(None);
        }

        // Contiguous requests become one extent of the full size; everything
        // else is chunked at huge-page granularity (or the requested
        // alignment when that is coarser).
        let pages_per_extent = if place.contiguous {
            u64::MAX
        } else {
            DEFAULT_PAGES_PER_EXTENT.max(place.alignment)
        };

        let mode = if place.top_down {
            InsertMode::TopDown
        } else {
            InsertMode::BestFit
        };

        let mut extents: Vec<Extent> =
            Vec::with_capacity(num_pages.div_ceil(pages_per_extent.max(1)).max(1) as usize);
        let mut vis = 0u64;
        let mut start = 0u64;
        let mut pages_left = num_pages;

        let mut mm = match self.mm.lock() {
            Ok(guard) => guard,
            Err(_) => {
                self.usage.fetch_sub(mem_bytes, Ordering::Relaxed);
                return Err(VramError::LockPoisoned);
            }
        };

        // Greedy phase: grab the largest power-of-two run that still fits,
        // preferring big contiguous blocks while they are available.
        while pages_left >= pages_per_extent {
            let pages = prev_power_of_two(pages_left);
            let Some(ext) =
                mm.insert_in_range(pages, pages_per_extent, place.fpfn, place.lpfn, mode)
            else {
                break;
            };

            vis += self.vis_size_of(&ext);
            start = Self::conservative_start(start, &ext, num_pages);
            pages_left -= pages;
            extents.push(ext);
        }

        // Fixed-chunk phase for whatever the greedy phase left behind. Full
        // chunks keep the chunk-size alignment so huge-page mappings stay
        // possible; the tail falls back to the request alignment.
        while pages_left > 0 {
            let pages = pages_left.min(pages_per_extent);
            let alignment = if pages == pages_per_extent {
                pages_per_extent
            } else {
                place.alignment
            };

            let Some(ext) = mm.insert_in_range(pages, alignment, place.fpfn, place.lpfn, mode)
            else {
                // Hard failure: undo every extent placed for this request
                // before reporting, so the range space reads as if the call
                // never happened.
                for ext in &extents {
                    mm.remove(ext);
                }
                drop(mm);
                self.usage.fetch_sub(mem_bytes, Ordering::Relaxed);
                log::warn!(
                    "allocation of {num_pages} pages failed with {} pages placed",
                    num_pages - pages_left
                );
                return Err(VramError::NoSpace);
            };

            vis += self.vis_size_of(&ext);
            start = Self::conservative_start(start, &ext, num_pages);
            pages_left -= pages;
            extents.push(ext);
        }
        drop(mm);

        self.vis_usage.fetch_add(vis, Ordering::Relaxed);

        Ok(Some(VramAllocation {
            extents,
            pages: num_pages,
            start,
        }))
    }

    /// Free an allocation's extents and settle both counters.
    ///
    /// An allocation with no extents is a no-op.
    ///
    /// # Errors
    /// [`VramError::LockPoisoned`] if a peer panicked inside the lock.
    pub fn free(&self, alloc: VramAllocation) -> VramResult<()> {
        if alloc.extents.is_empty() {
            return Ok(());
        }

        let mut usage = 0u64;
        let mut vis = 0u64;

        let mut mm = self.mm.lock().map_err(|_| VramError::LockPoisoned)?;
        for ext in &alloc.extents {
            mm.remove(ext);
            usage += pages_to_bytes(ext.size);
            vis += self.vis_size_of(ext);
        }
        drop(mm);

        self.usage.fetch_sub(usage, Ordering::Relaxed);
        self.vis_usage.fetch_sub(vis, Ordering::Relaxed);
        Ok(())
    }

    /// How many bytes of the allocation lie inside the CPU-visible window.
    #[must_use]
    pub fn visible_size(&self, alloc: &VramAllocation) -> u64 {
        // Fully visible VRAM: no per-extent walk needed.
        if self.visible_size == self.total_size {
            return alloc.size();
        }

        // Lowest extent already past the window: nothing can be visible.
        let lowest = alloc.extents.iter().map(|e| e.start).min().unwrap_or(0);
        if pages_to_bytes(lowest) >= self.visible_size {
            return 0;
        }

        alloc.extents.iter().map(|e| self.vis_size_of(e)).sum()
    }

    /// Tear the manager down. The range space must be empty.
    ///
    /// # Errors
    /// [`VramError::Busy`] when extents are still allocated: a caller
    /// lifecycle bug, reported loudly rather than discarded.
    pub fn fini(self) -> VramResult<()> {
        let mm = self.mm.into_inner().map_err(|_| VramError::LockPoisoned)?;
        let live_extents = mm.used_extents();
        if live_extents != 0 {
            log::error!("manager torn down with {live_extents} extent(s) still allocated");
            return Err(VramError::Busy { live_extents });
        }
        Ok(())
    }

    /// Dump every free/used extent in address order plus the running totals.
    ///
    /// # Errors
    /// Forwards the writer's error; a poisoned lock also surfaces as
    /// [`fmt::Error`].
    pub fn debug(&self, w: &mut impl fmt::Write) -> fmt::Result {
        let mm = self.mm.lock().map_err(|_| fmt::Error)?;
        for (ext, state) in mm.spans() {
            writeln!(
                w,
                "{:#018x}-{:#018x}: {:>8}: {}",
                ext.start,
                ext.end(),
                ext.size,
                match state {
                    SpanState::Free => "free",
                    SpanState::Used => "used",
                }
            )?;
        }
        let total_pages = mm.total_pages();
        drop(mm);

        writeln!(
            w,
            "man size:{} pages, ram usage:{}MB, vis usage:{}MB",
            total_pages,
            self.usage() >> 20,
            self.vis_usage() >> 20
        )
    }

    // =======================================================================
    // Internal helpers
    // =======================================================================

    /// Bytes of the extent that fall inside the CPU-visible window.
    fn vis_size_of(&self, ext: &Extent) -> u64 {
        let start = pages_to_bytes(ext.start);
        let end = pages_to_bytes(ext.end());
        if start >= self.visible_size {
            return 0;
        }
        end.min(self.visible_size) - start
    }

    /// Fold one placed extent into the conservative start: the lowest page
    /// from which the whole allocation could be treated as contiguous.
    fn conservative_start(current: u64, ext: &Extent, num_pages: u64) -> u64 {
        let end = ext.end();
        let start = if end > num_pages { end - num_pages } else { 0 };
        current.max(start)
    }
}

impl RangeManager for VramManager {
    fn get_node(&self, num_pages: u64, place: &Placement) -> VramResult<Option<VramAllocation>> {
        self.alloc(num_pages, place)
    }

    fn put_node(&self, alloc: VramAllocation) -> VramResult<()> {
        self.free(alloc)
    }

    fn usage(&self) -> u64 {
        self.usage()
    }

    fn vis_usage(&self) -> u64 {
        self.vis_usage()
    }
}
