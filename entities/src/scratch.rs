//! Reusable scratch buffers for entity updates.

use schema::FieldPath;

/// Scratch buffers reused across entity updates.
///
/// One update decodes its whole field list before reading any value, so the
/// list is staged here instead of being allocated per update.
#[derive(Debug, Default)]
pub struct UpdateScratch {
    paths: Vec<FieldPath>,
    indices: Vec<usize>,
}

impl UpdateScratch {
    /// Creates a new scratch buffer with no pre-allocated capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Field-path staging buffer.
    pub(crate) fn paths_mut(&mut self) -> &mut Vec<FieldPath> {
        &mut self.paths
    }

    /// Legacy property-index staging buffer.
    pub(crate) fn indices_mut(&mut self) -> &mut Vec<usize> {
        &mut self.indices
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_keep_capacity_across_updates() {
        let mut scratch = UpdateScratch::new();
        scratch.paths_mut().extend([FieldPath::new(); 16]);
        scratch.paths_mut().clear();
        assert!(scratch.paths_mut().capacity() >= 16);

        scratch.indices_mut().push(3);
        assert_eq!(scratch.indices_mut().as_slice(), [3]);
    }
}
