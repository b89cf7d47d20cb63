use std::fmt;

/// An id-map-assigned identifier. Shared globally across a [`crate::program::Program`]
/// so that result ids are unique across every function (§3 "IL Program").
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

pub const INVALID_ID: u32 = u32::MAX;

impl ValueId {
    pub const INVALID: ValueId = ValueId(INVALID_ID);

    pub fn is_valid(self) -> bool {
        self.0 != INVALID_ID
    }
}

impl Default for ValueId {
    fn default() -> Self {
        ValueId::INVALID
    }
}

impl fmt::Debug for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "%{}", self.0)
        } else {
            write!(f, "%invalid")
        }
    }
}

/// A basic block is addressed by the [`ValueId`] of its label.
pub type BlockId = ValueId;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl TypeId {
    pub const INVALID: TypeId = TypeId(INVALID_ID);

    pub fn is_valid(self) -> bool {
        self.0 != INVALID_ID
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConstantId(pub u32);

impl ConstantId {
    pub const INVALID: ConstantId = ConstantId(INVALID_ID);
}

impl fmt::Debug for ConstantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "const{}", self.0)
    }
}
