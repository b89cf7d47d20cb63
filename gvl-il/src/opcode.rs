/// Instruction opcodes the IL front-ends lower to and the instrumentation
/// passes pattern-match against. Deliberately flat rather than per-format:
/// every front-end normalizes into this one set, per §4.3's "minimal set the
/// instrumentation needs to reason about" plus the conversions a dialect
/// mismatch (combined image-sampler splitting, integer-width differences)
/// forces on a front-end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    Literal,
    Undef,

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,

    // Bitwise
    BitOr,
    BitAnd,
    BitShiftLeft,
    BitShiftRight,

    // Logical / comparison
    And,
    Or,
    Any,
    All,
    Equal,
    NotEqual,
    LessThan,
    LessThanEqual,
    GreaterThan,
    GreaterThanEqual,

    // Conversion (front-end-introduced; no direct spec counterpart, needed
    // to bridge dialect type-width and signedness mismatches)
    Bitcast,
    Trunc,
    Extend,

    // Memory
    Alloca,
    Load,
    Store,
    AddressChain,

    // Resource access -- the operations the bounds/race/descriptor passes
    // rewrite around.
    LoadBuffer,
    StoreBuffer,
    LoadTexture,
    StoreTexture,
    ResourceSize,

    // Device-scope atomics, introduced only by the data-race pass's own
    // rewrite (§4.5, §5 "Lock table in GPU memory"); no front-end lifts a
    // dialect record directly to these.
    AtomicCompareExchange,
    AtomicLoad,
    AtomicStore,

    // Control flow
    Branch,
    BranchConditional,
    Switch,
    Phi,
    Return,

    /// Layer-level "emit an error record"; inserted by instrumentation
    /// passes, never produced by a front-end.
    Export,

    /// An opcode the front-end didn't recognize; preserved verbatim (operand
    /// words become `immediates`) so round-trip emission can still reproduce
    /// it byte-exact.
    Unexposed(u32),
}

impl Opcode {
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Branch | Opcode::BranchConditional | Opcode::Switch | Opcode::Return
        )
    }

    pub fn has_result(self) -> bool {
        !matches!(
            self,
            Opcode::Store
                | Opcode::StoreBuffer
                | Opcode::StoreTexture
                | Opcode::AtomicStore
                | Opcode::Export
                | Opcode::Branch
                | Opcode::BranchConditional
                | Opcode::Switch
                | Opcode::Return
        )
    }

    /// Operations the descriptor-bounds / data-race passes match on when
    /// walking a function looking for sites to instrument.
    pub fn is_resource_access(self) -> bool {
        matches!(
            self,
            Opcode::LoadBuffer
                | Opcode::StoreBuffer
                | Opcode::LoadTexture
                | Opcode::StoreTexture
                | Opcode::ResourceSize
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_control_flow_exits_are_terminators() {
        assert!(Opcode::Return.is_terminator());
        assert!(Opcode::Switch.is_terminator());
        assert!(!Opcode::Add.is_terminator());
        assert!(!Opcode::Phi.is_terminator());
    }

    #[test]
    fn stores_and_exports_have_no_result_value() {
        assert!(!Opcode::Store.has_result());
        assert!(!Opcode::StoreBuffer.has_result());
        assert!(!Opcode::Export.has_result());
        assert!(Opcode::LoadBuffer.has_result());
    }

    #[test]
    fn resource_access_set_matches_the_four_typed_operations() {
        assert!(Opcode::LoadBuffer.is_resource_access());
        assert!(Opcode::StoreTexture.is_resource_access());
        assert!(!Opcode::Add.is_resource_access());
    }
}
