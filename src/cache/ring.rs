//! Rings: the layering level used to linearize flush order (spec §4.1.4,
//! §3.1 "Ring").

/// Ring 0 is outermost (user data structures), higher numbers are more
/// inner. `flush` always serializes a ring fully before moving to the
/// next, more-inner one.
pub type Ring = u8;

/// Named rings matching spec §3.1's enum, expressed as indices into a
/// cache configured with at least 5 rings. A cache may be configured
/// with fewer or more; these constants are the conventional assignment
/// an object-header client would use.
pub mod named {
    use super::Ring;

    pub const USER: Ring = 0;
    pub const RDFSM: Ring = 1;
    pub const MDFSM: Ring = 2;
    pub const SBE: Ring = 3;
    pub const SB: Ring = 4;
}
