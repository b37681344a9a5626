//! Plain native enumerations.

interop_runtime::native_enum! {
    pub enum EnumZeroToFive as "EnumZeroToFive" {
        Zero = 0,
        One = 1,
        Two = 2,
        Three = 3,
        Four = 4,
        Five = 5,
    }
}

interop_runtime::native_enum! {
    /// Starts at one, so zero is not a variant.
    pub enum EnumOneToSix as "EnumOneToSix" {
        One = 1,
        Two = 2,
        Three = 3,
        Four = 4,
        Five = 5,
        Six = 6,
    }
}

interop_runtime::native_enum! {
    /// Sparse discriminants, declared out of order.
    pub enum EnumDisjoint as "EnumDisjoint" {
        Five = 5,
        One = 1,
        Twenty = 20,
        Four = 4,
        Seven = 7,
        Two = 2,
    }
}

interop_runtime::native_enum! {
    pub enum EnumSingle as "EnumSingle" {
        Single = 0,
    }
}
