/// The direction data moves in during a transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Bidirectional,
    /// The CPU produces, the device consumes.
    ToDevice,
    /// The device produces, the CPU consumes.
    FromDevice,
    /// Not a valid transfer direction. Passing it to any operation is a bug
    /// in the caller.
    None,
}

impl Direction {
    /// Whether the CPU may find new data in the buffer after the transfer.
    #[inline]
    pub fn from_device(self) -> bool {
        matches!(self, Direction::FromDevice | Direction::Bidirectional)
    }

    /// Whether the device reads data the CPU has written.
    #[inline]
    pub fn to_device(self) -> bool {
        matches!(self, Direction::ToDevice | Direction::Bidirectional)
    }

    #[track_caller]
    pub(crate) fn check(self) {
        assert!(self != Direction::None, "invalid DMA direction");
    }
}
