use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VramError {
    /// The range search could not satisfy the request (fragmentation).
    /// Distinct from the soft "no space" outcome, which is not an error.
    #[error("out of VRAM")]
    NoSpace,

    /// Manager torn down while extents are still allocated inside it.
    #[error("VRAM manager still holds {live_extents} allocated extent(s)")]
    Busy { live_extents: usize },

    /// The range-space lock was poisoned by a panicking peer.
    #[error("range space lock poisoned")]
    LockPoisoned,
}

impl VramError {
    /// The POSIX errno a C-facing driver shim would report for this error.
    #[must_use]
    pub const fn errno(&self) -> i32 {
        match self {
            Self::NoSpace => libc::ENOSPC,
            Self::Busy { .. } => libc::EBUSY,
            Self::LockPoisoned => libc::EIO,
        }
    }
}

// A convenient alias
pub type VramResult<T> = Result<T, VramError>;
