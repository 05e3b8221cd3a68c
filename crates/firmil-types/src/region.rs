//! Exception-handling regions

use serde::{Deserialize, Serialize};

/// Kind of handler attached to a protected region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ClauseKind {
    /// Typed catch handler
    Catch = 0,
    /// Filter expression deciding whether the handler runs
    Filter = 1,
    /// Always runs on exit
    Finally = 2,
    /// Runs only when the region exits by exception
    Fault = 4,
}

impl ClauseKind {
    /// Decode the clause kind
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Catch),
            1 => Some(Self::Filter),
            2 => Some(Self::Finally),
            4 => Some(Self::Fault),
            _ => None,
        }
    }
}

/// One try/handler tuple, offsets in bytes from the start of the body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRegion {
    /// Clause kind
    pub kind: ClauseKind,
    /// Start of the protected range
    pub try_offset: u32,
    /// Length of the protected range
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Catch type token for [`ClauseKind::Catch`], filter entry offset for
    /// [`ClauseKind::Filter`], zero otherwise
    pub class_or_filter: u32,
}

impl ExceptionRegion {
    /// End of the protected range (exclusive)
    #[inline]
    pub fn try_end(&self) -> u32 {
        self.try_offset + self.try_length
    }

    /// End of the handler (exclusive)
    #[inline]
    pub fn handler_end(&self) -> u32 {
        self.handler_offset + self.handler_length
    }

    /// Whether `offset` lies in the protected range
    #[inline]
    pub fn protects(&self, offset: u32) -> bool {
        offset >= self.try_offset && offset < self.try_end()
    }

    /// Whether this region's try range lies within `outer`'s try range
    pub fn is_nested_in(&self, outer: &ExceptionRegion) -> bool {
        self.try_offset >= outer.try_offset && self.try_end() <= outer.try_end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(try_offset: u32, try_length: u32) -> ExceptionRegion {
        ExceptionRegion {
            kind: ClauseKind::Finally,
            try_offset,
            try_length,
            handler_offset: try_offset + try_length,
            handler_length: 2,
            class_or_filter: 0,
        }
    }

    #[test]
    fn test_nesting() {
        let outer = region(0, 20);
        let inner = region(4, 6);
        assert!(inner.is_nested_in(&outer));
        assert!(!outer.is_nested_in(&inner));
        assert!(inner.protects(4));
        assert!(!inner.protects(10));
    }

    #[test]
    fn test_clause_kind_bytes() {
        assert_eq!(ClauseKind::from_byte(4), Some(ClauseKind::Fault));
        assert_eq!(ClauseKind::from_byte(3), None);
    }
}
