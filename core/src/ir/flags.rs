use std::fmt;

/// Scope-wide facts accumulated by visiting every live instruction once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ScopeFlags(u32);

impl ScopeFlags {
    pub const NONE: ScopeFlags = ScopeFlags(0);
    pub const HAS_BREAK_INSTRS: ScopeFlags = ScopeFlags(1 << 0);
    pub const HAS_NONLOCAL_RETURNS: ScopeFlags = ScopeFlags(1 << 1);
    pub const CAN_RECEIVE_BREAKS: ScopeFlags = ScopeFlags(1 << 2);
    pub const CAN_RECEIVE_NONLOCAL_RETURNS: ScopeFlags = ScopeFlags(1 << 3);
    pub const BINDING_HAS_ESCAPED: ScopeFlags = ScopeFlags(1 << 4);
    pub const USES_EVAL: ScopeFlags = ScopeFlags(1 << 5);
    pub const USES_ZSUPER: ScopeFlags = ScopeFlags(1 << 6);
    pub const REQUIRES_FRAME: ScopeFlags = ScopeFlags(1 << 7);
    pub const REQUIRES_DYNSCOPE: ScopeFlags = ScopeFlags(1 << 8);
    pub const RECEIVES_CLOSURE_ARG: ScopeFlags = ScopeFlags(1 << 9);
    pub const RECEIVES_KEYWORD_ARGS: ScopeFlags = ScopeFlags(1 << 10);
    pub const CAN_CAPTURE_CALLERS_BINDING: ScopeFlags = ScopeFlags(1 << 11);
    pub const HAS_EXPLICIT_CALL_PROTOCOL: ScopeFlags = ScopeFlags(1 << 12);
    pub const USES_BACKREF_OR_LASTLINE: ScopeFlags = ScopeFlags(1 << 13);
    pub const ACCESS_PARENTS_LOCAL_VARIABLES: ScopeFlags = ScopeFlags(1 << 14);

    const NAMES: [(ScopeFlags, &'static str); 15] = [
        (ScopeFlags::HAS_BREAK_INSTRS, "HAS_BREAK_INSTRS"),
        (ScopeFlags::HAS_NONLOCAL_RETURNS, "HAS_NONLOCAL_RETURNS"),
        (ScopeFlags::CAN_RECEIVE_BREAKS, "CAN_RECEIVE_BREAKS"),
        (ScopeFlags::CAN_RECEIVE_NONLOCAL_RETURNS, "CAN_RECEIVE_NONLOCAL_RETURNS"),
        (ScopeFlags::BINDING_HAS_ESCAPED, "BINDING_HAS_ESCAPED"),
        (ScopeFlags::USES_EVAL, "USES_EVAL"),
        (ScopeFlags::USES_ZSUPER, "USES_ZSUPER"),
        (ScopeFlags::REQUIRES_FRAME, "REQUIRES_FRAME"),
        (ScopeFlags::REQUIRES_DYNSCOPE, "REQUIRES_DYNSCOPE"),
        (ScopeFlags::RECEIVES_CLOSURE_ARG, "RECEIVES_CLOSURE_ARG"),
        (ScopeFlags::RECEIVES_KEYWORD_ARGS, "RECEIVES_KEYWORD_ARGS"),
        (ScopeFlags::CAN_CAPTURE_CALLERS_BINDING, "CAN_CAPTURE_CALLERS_BINDING"),
        (ScopeFlags::HAS_EXPLICIT_CALL_PROTOCOL, "HAS_EXPLICIT_CALL_PROTOCOL"),
        (ScopeFlags::USES_BACKREF_OR_LASTLINE, "USES_BACKREF_OR_LASTLINE"),
        (ScopeFlags::ACCESS_PARENTS_LOCAL_VARIABLES, "ACCESS_PARENTS_LOCAL_VARIABLES"),
    ];

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> ScopeFlags {
        ScopeFlags(bits)
    }

    #[inline]
    pub const fn contains(self, other: ScopeFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub const fn intersects(self, other: ScopeFlags) -> bool {
        (self.0 & other.0) != 0
    }

    #[inline]
    pub const fn union(self, other: ScopeFlags) -> ScopeFlags {
        ScopeFlags(self.0 | other.0)
    }

    /// Adds `other`, reporting whether any bit was new.
    #[inline]
    pub fn insert(&mut self, other: ScopeFlags) -> bool {
        let before = self.0;
        self.0 |= other.0;
        self.0 != before
    }

    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl std::ops::BitOr for ScopeFlags {
    type Output = ScopeFlags;

    fn bitor(self, rhs: ScopeFlags) -> ScopeFlags {
        self.union(rhs)
    }
}

impl fmt::Display for ScopeFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("-");
        }
        f.write_str(&self.names().join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reports_change_once() {
        let mut flags = ScopeFlags::NONE;
        assert!(flags.insert(ScopeFlags::USES_EVAL));
        assert!(!flags.insert(ScopeFlags::USES_EVAL));
        assert!(flags.insert(ScopeFlags::USES_EVAL | ScopeFlags::REQUIRES_FRAME));
        assert_eq!(flags.to_string(), "USES_EVAL | REQUIRES_FRAME");
    }
}
