use core::fmt;
use core::num::NonZeroU32;

/// Compact, stable identifier for mesh entities.
///
/// - `u32` keeps DOF keys small (a `DofKey` fits in 8 bytes)
/// - `NonZero` enables `Option<Id>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(NonZeroU32);

impl Id {
    /// Largest index an `Id` can hold.
    pub const MAX_INDEX: u32 = u32::MAX - 1;

    /// `Id` for a 0-based storage position, or `None` past [`Id::MAX_INDEX`].
    pub fn try_from_index(index: usize) -> Option<Self> {
        u32::try_from(index)
            .ok()
            .and_then(|i| NonZeroU32::new(i.checked_add(1)?))
            .map(Self)
    }

    /// Create an Id from a 0-based index by storing index+1.
    pub fn from_index(index: u32) -> Self {
        // index+1 must be nonzero
        Self(NonZeroU32::new(index + 1).expect("index+1 is nonzero"))
    }

    /// Recover the 0-based index.
    pub fn index(self) -> u32 {
        self.0.get() - 1
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index())
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

/// Domain-specific ID aliases for clarity (no runtime cost).
pub type NodeId = Id;
pub type ElementId = Id;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_round_trip_index() {
        for i in [0_u32, 1, 2, 42, 10_000] {
            let id = Id::from_index(i);
            assert_eq!(id.index(), i);
        }
    }

    #[test]
    fn try_from_index_stops_at_max() {
        assert_eq!(Id::try_from_index(5), Some(Id::from_index(5)));
        let last = Id::MAX_INDEX as usize;
        assert_eq!(Id::try_from_index(last).map(Id::index), Some(Id::MAX_INDEX));
        assert_eq!(Id::try_from_index(last + 1), None);
        assert_eq!(Id::try_from_index(usize::MAX), None);
    }

    #[test]
    fn option_id_is_small() {
        assert_eq!(
            core::mem::size_of::<Id>(),
            core::mem::size_of::<Option<Id>>()
        );
    }

    #[test]
    fn ids_order_by_index() {
        let mut ids = vec![Id::from_index(7), Id::from_index(0), Id::from_index(3)];
        ids.sort();
        let idx: Vec<u32> = ids.iter().map(|id| id.index()).collect();
        assert_eq!(idx, vec![0, 3, 7]);
    }
}
