use core::fmt;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// The page allocator could not satisfy the request.
    OutOfMemory,
    /// The allocated memory is out of the device's reach.
    Unaddressable,
    /// The scatter list entry at `index` could not be mapped. No entry of the
    /// list remains mapped.
    Unmappable { index: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of DMA memory"),
            Error::Unaddressable => write!(f, "memory out of the device's reach"),
            Error::Unmappable { index } => write!(f, "scatter entry {index} cannot be mapped"),
        }
    }
}
