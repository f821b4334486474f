//! Capability mask
//!
//! Features are disabled by clearing bits from an all-set mask, never by
//! building a mask up from zero.

use super::constants::capability;

/// Set of negotiated capability flags
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilityMask(u32);

impl CapabilityMask {
    /// Every modeled flag set
    pub const fn all() -> Self {
        Self(capability::ALL_MODELED)
    }

    /// Empty mask
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Wrap raw flags
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Assemble from the two 16-bit halves carried in the greeting
    pub const fn from_halves(lower: u16, upper: u16) -> Self {
        Self((lower as u32) | ((upper as u32) << 16))
    }

    /// Raw flags
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Lower 16 bits
    pub const fn lower(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Upper 16 bits
    pub const fn upper(self) -> u16 {
        (self.0 >> 16) as u16
    }

    /// Copy with `flags` cleared
    #[must_use]
    pub const fn without(self, flags: u32) -> Self {
        Self(self.0 & !flags)
    }

    /// Copy with `flags` set
    #[must_use]
    pub const fn with(self, flags: u32) -> Self {
        Self(self.0 | flags)
    }

    /// Copy with `flags` set when `cond` holds
    #[must_use]
    pub const fn with_if(self, flags: u32, cond: bool) -> Self {
        if cond {
            self.with(flags)
        } else {
            self
        }
    }

    /// True when every bit of `flags` is set
    pub const fn contains(self, flags: u32) -> bool {
        self.0 & flags == flags
    }

    /// Flags present in both masks
    #[must_use]
    pub const fn intersect(self, other: CapabilityMask) -> Self {
        Self(self.0 & other.0)
    }
}

impl std::fmt::Debug for CapabilityMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CapabilityMask({:#010x})", self.0)
    }
}

impl From<u32> for CapabilityMask {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}
