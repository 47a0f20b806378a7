//! Eviction priority of cached files

use serde::{Deserialize, Serialize};

/// How much a cached file is worth keeping
///
/// Ordered lowest first: prune deletes `Unspecified` before `Low` and so on.
/// `DoNotDelete` files are never pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    #[default]
    Unspecified,
    Low,
    Medium,
    High,
    DoNotDelete,
}

impl PriorityLevel {
    pub fn is_evictable(&self) -> bool {
        *self != PriorityLevel::DoNotDelete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(PriorityLevel::Unspecified < PriorityLevel::Low);
        assert!(PriorityLevel::Low < PriorityLevel::Medium);
        assert!(PriorityLevel::Medium < PriorityLevel::High);
        assert!(PriorityLevel::High < PriorityLevel::DoNotDelete);
        assert!(!PriorityLevel::DoNotDelete.is_evictable());
        assert_eq!(PriorityLevel::default(), PriorityLevel::Unspecified);
    }
}
