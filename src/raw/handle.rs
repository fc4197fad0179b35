use core::fmt;
use core::num::NonZero;

#[cfg(test)]
type Repr = u16;
#[cfg(not(test))]
type Repr = u32;

/// Slot address inside an [`Arena`](super::arena::Arena).
///
/// Stored as `index + 1` so that `Option<Handle>` costs nothing extra; the parent, `prev`
/// and `next` links of every node are optional handles.
#[derive(Clone, Copy, Eq, PartialEq, Hash)]
#[repr(transparent)]
pub(crate) struct Handle(NonZero<Repr>);

impl Handle {
    pub(crate) const MAX: usize = (Repr::MAX - 1) as usize;

    #[inline]
    pub(crate) const fn from_slot(slot: usize) -> Self {
        assert!(slot <= Self::MAX, "`Handle::from_slot()` - slot out of range!");
        #[allow(clippy::cast_possible_truncation)]
        let raw = (slot + 1) as Repr;
        match NonZero::new(raw) {
            Some(raw) => Self(raw),
            None => unreachable!(),
        }
    }

    #[inline]
    pub(crate) const fn slot(self) -> usize {
        (self.0.get() - 1) as usize
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.slot())
    }
}
