use kernel_vmem::WalkError;

/// Recoverable failures of the memory manager.
///
/// Everything else (reference count underflow, double free, bootstrap
/// exhaustion) is an invariant violation and panics.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MmError {
    /// The free list is empty.
    #[error("out of memory")]
    OutOfMemory,
    /// The caller passed something the manager refuses to act on.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

impl From<WalkError> for MmError {
    fn from(value: WalkError) -> Self {
        match value {
            WalkError::OutOfMemory => Self::OutOfMemory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_errors_become_out_of_memory() {
        assert_eq!(MmError::from(WalkError::OutOfMemory), MmError::OutOfMemory);
    }

    #[test]
    fn invalid_argument_carries_reason() {
        let e = MmError::InvalidArgument("segment size is not page aligned");
        assert_eq!(e.to_string(), "invalid argument: segment size is not page aligned");
    }
}
