pub mod manager;

use crate::error::VramResult;
use crate::mm::Extent;
use crate::utils::{PAGE_SIZE, pages_to_bytes};

/// Immutable device-memory geometry, fixed when the manager is created.
///
/// `visible_size` is the prefix `[0, visible_size)` of VRAM reachable through
/// the host BAR aperture; it is clamped to `total_size`.
#[derive(Debug, Clone, Copy)]
pub struct VramConfig {
    pub total_size: u64,
    pub visible_size: u64,
}

impl VramConfig {
    #[must_use]
    pub fn new(total_size: u64, visible_size: u64) -> Self {
        Self {
            total_size,
            visible_size: visible_size.min(total_size),
        }
    }
}

/// Placement constraints for one allocation request.
///
/// Built with consuming setters, e.g.
/// `Placement::new().contiguous().top_down().range(fpfn, lpfn)`.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default)]
pub struct Placement {
    /// First usable page frame number.
    pub fpfn: u64,
    /// One past the last usable page frame number; 0 means unrestricted.
    pub lpfn: u64,
    /// Required start alignment in pages.
    pub alignment: u64,
    /// The allocation must be satisfied by exactly one extent.
    pub contiguous: bool,
    /// Search from high addresses down instead of bottom-up.
    pub top_down: bool,
}

impl Placement {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn contiguous(mut self) -> Self {
        self.contiguous = true;
        self
    }

    #[must_use]
    pub const fn top_down(mut self) -> Self {
        self.top_down = true;
        self
    }

    #[must_use]
    pub const fn range(mut self, fpfn: u64, lpfn: u64) -> Self {
        self.fpfn = fpfn;
        self.lpfn = lpfn;
        self
    }

    #[must_use]
    pub const fn alignment(mut self, pages: u64) -> Self {
        self.alignment = pages;
        self
    }
}

/// One logical buffer's backing store: an ordered list of extents.
#[derive(Debug, Clone)]
pub struct VramAllocation {
    pub(crate) extents: Vec<Extent>,
    pub(crate) pages: u64,
    // Conservative start: the lowest page from which the whole allocation
    // could be treated as one contiguous block for range checks.
    pub(crate) start: u64,
}

impl VramAllocation {
    #[must_use]
    pub fn extents(&self) -> &[Extent] {
        &self.extents
    }

    /// Total size in pages.
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.pages
    }

    /// Total size in bytes.
    #[must_use]
    pub const fn size(&self) -> u64 {
        pages_to_bytes(self.pages)
    }

    /// Conservative start page for downstream "is it all below X" checks.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }
}

/// The four-operation contract the external placement framework drives the
/// allocator through. `init` and `fini` map to [`manager::VramManager::new`]
/// and the consuming [`manager::VramManager::fini`].
pub trait RangeManager {
    /// Allocate backing store for `num_pages`. `Ok(None)` is the soft
    /// "no space" outcome: not an error, the caller should evict or fall
    /// back to another memory domain and retry.
    fn get_node(&self, num_pages: u64, place: &Placement) -> VramResult<Option<VramAllocation>>;

    /// Free previously allocated backing store.
    fn put_node(&self, alloc: VramAllocation) -> VramResult<()>;

    /// Bytes currently allocated.
    fn usage(&self) -> u64;

    /// Bytes currently allocated inside the CPU-visible window.
    fn vis_usage(&self) -> u64;
}

/// Default extent granularity for scattered allocations: 2 MiB, the
/// transparent-huge-page size, expressed in pages.
pub const DEFAULT_PAGES_PER_EXTENT: u64 = (2 * 1024 * 1024) / PAGE_SIZE;

// Re-export the main manager for easy access
pub use manager::VramManager;
