//! Deciding which devices need software cache maintenance.
//!
//! Two signals take part: what the platform declares about the device, and
//! the CPU model. R10000 and R12000 may speculatively refill cache lines under
//! an ongoing transfer even when the platform claims coherent I/O, so their
//! caches are maintained by software regardless.

use crate::{Device, Platform};

const PRID_COMP_MASK: u32 = 0xff_0000;
const PRID_IMP_MASK: u32 = 0x00_ff00;

const PRID_COMP_LEGACY: u32 = 0x00_0000;
const PRID_COMP_MIPS: u32 = 0x01_0000;

const PRID_IMP_R4000: u32 = 0x0400;
const PRID_IMP_R10000: u32 = 0x0900;
const PRID_IMP_R12000: u32 = 0x0e00;
const PRID_IMP_R5000: u32 = 0x2300;

const PRID_IMP_4KC: u32 = 0x8000;
const PRID_IMP_24K: u32 = 0x9300;
const PRID_IMP_34K: u32 = 0x9500;
const PRID_IMP_74K: u32 = 0x9700;
const PRID_IMP_1004K: u32 = 0x9900;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CpuType {
    R4000,
    R5000,
    R10000,
    R12000,
    Mips4K,
    Mips24K,
    Mips34K,
    Mips74K,
    Mips1004K,
    Unknown(u32),
}

impl CpuType {
    /// Decode the value of the CP0 PRId register.
    pub fn from_prid(prid: u32) -> Self {
        match (prid & PRID_COMP_MASK, prid & PRID_IMP_MASK) {
            (PRID_COMP_LEGACY, PRID_IMP_R4000) => CpuType::R4000,
            (PRID_COMP_LEGACY, PRID_IMP_R5000) => CpuType::R5000,
            (PRID_COMP_LEGACY, PRID_IMP_R10000) => CpuType::R10000,
            (PRID_COMP_LEGACY, PRID_IMP_R12000) => CpuType::R12000,
            (PRID_COMP_MIPS, PRID_IMP_4KC) => CpuType::Mips4K,
            (PRID_COMP_MIPS, PRID_IMP_24K) => CpuType::Mips24K,
            (PRID_COMP_MIPS, PRID_IMP_34K) => CpuType::Mips34K,
            (PRID_COMP_MIPS, PRID_IMP_74K) => CpuType::Mips74K,
            (PRID_COMP_MIPS, PRID_IMP_1004K) => CpuType::Mips1004K,
            _ => CpuType::Unknown(prid),
        }
    }

    /// Whether this CPU needs software cache maintenance even for devices
    /// declared coherent.
    pub fn has_coherency_erratum(self) -> bool {
        matches!(self, CpuType::R10000 | CpuType::R12000)
    }
}

/// Coherency decisions, fixed once the boot CPU is known.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Classifier {
    cpu: CpuType,
    erratum: bool,
}

impl Classifier {
    pub fn new(cpu: CpuType) -> Self {
        Classifier {
            cpu,
            erratum: cpu.has_coherency_erratum(),
        }
    }

    pub fn cpu(&self) -> CpuType {
        self.cpu
    }

    /// Whether the platform keeps the caches coherent with `dev`'s transfers.
    #[inline]
    pub fn is_coherent(&self, platform: &dyn Platform, dev: &Device) -> bool {
        platform.device_is_coherent(dev)
    }

    /// Whether `dev` is declared coherent but the CPU still needs software
    /// maintenance.
    #[inline]
    pub fn needs_erratum_workaround(&self, platform: &dyn Platform, dev: &Device) -> bool {
        self.erratum && self.is_coherent(platform, dev)
    }

    /// Whether transfers of `dev` need cache maintenance at all.
    #[inline]
    pub fn needs_sync(&self, platform: &dyn Platform, dev: &Device) -> bool {
        !self.is_coherent(platform, dev) || self.needs_erratum_workaround(platform, dev)
    }
}
