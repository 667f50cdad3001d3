use mips_paging::DmaMask;

/// What the DMA layer knows about a device, fixed at registration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Device {
    name: &'static str,
    coherent: Option<bool>,
    dma_mask: DmaMask,
    coherent_dma_mask: DmaMask,
}

impl Device {
    /// A device with 32-bit streaming and coherent masks and no declared
    /// coherency.
    pub const fn new(name: &'static str) -> Self {
        Device {
            name,
            coherent: None,
            dma_mask: DmaMask::bits(32),
            coherent_dma_mask: DmaMask::bits(32),
        }
    }

    pub const fn with_coherent(mut self, coherent: bool) -> Self {
        self.coherent = Some(coherent);
        self
    }

    pub const fn with_dma_mask(mut self, mask: DmaMask) -> Self {
        self.dma_mask = mask;
        self
    }

    pub const fn with_coherent_dma_mask(mut self, mask: DmaMask) -> Self {
        self.coherent_dma_mask = mask;
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Coherency declared by the platform for this device.
    pub const fn declared_coherent(&self) -> Option<bool> {
        self.coherent
    }

    /// Reach of streaming mappings.
    pub const fn dma_mask(&self) -> DmaMask {
        self.dma_mask
    }

    /// Reach of coherent allocations.
    pub const fn coherent_dma_mask(&self) -> DmaMask {
        self.coherent_dma_mask
    }
}
