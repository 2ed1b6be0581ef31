//! Limits enforced while applying packet entities.

/// Engine limits guarding against corrupt or hostile captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineLimits {
    /// Highest entity index + 1.
    pub max_entities: usize,
    /// Maximum `updated_entries` of one packet-entities batch.
    pub max_updates_per_batch: usize,
    /// Maximum field paths decoded for one entity update.
    pub max_field_paths_per_update: usize,
    /// Maximum legacy field indices in one entity update.
    pub max_legacy_field_indices: usize,
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            max_entities: 1 << 14,
            max_updates_per_batch: 1 << 14,
            max_field_paths_per_update: 1 << 14,
            max_legacy_field_indices: 1 << 12,
        }
    }
}

impl EngineLimits {
    /// Creates limits suitable for testing with smaller values.
    #[must_use]
    pub const fn for_testing() -> Self {
        Self {
            max_entities: 64,
            max_updates_per_batch: 32,
            max_field_paths_per_update: 64,
            max_legacy_field_indices: 64,
        }
    }

    /// Creates limits with no restrictions (use with caution).
    #[must_use]
    pub const fn unlimited() -> Self {
        Self {
            max_entities: usize::MAX,
            max_updates_per_batch: usize::MAX,
            max_field_paths_per_update: usize::MAX,
            max_legacy_field_indices: usize::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_covers_edict_range() {
        let limits = EngineLimits::default();
        assert_eq!(limits.max_entities, 1 << 14);
        assert!(limits.max_field_paths_per_update >= 1024);
    }

    #[test]
    fn testing_limits_smaller() {
        let test_limits = EngineLimits::for_testing();
        let default_limits = EngineLimits::default();
        assert!(test_limits.max_entities < default_limits.max_entities);
        assert!(test_limits.max_updates_per_batch < default_limits.max_updates_per_batch);
    }

    #[test]
    fn unlimited_limits() {
        let limits = EngineLimits::unlimited();
        assert_eq!(limits.max_entities, usize::MAX);
        assert_eq!(limits.max_legacy_field_indices, usize::MAX);
    }
}
