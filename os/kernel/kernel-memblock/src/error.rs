/// Failures of the early memory tracker.
///
/// None of these can be recovered from during boot; the caller is expected
/// to halt. Operations report them before touching any region, so the
/// tracker state is still consistent when one is returned.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MemblockError {
    /// A region array is full and growing it has not been allowed yet.
    #[error("cannot resize the {name} array before resizing is allowed")]
    ResizeNotAllowed { name: &'static str },
    /// No free memory is left to hold a doubled region array.
    #[error("failed to double the {name} array from {from} to {to} entries")]
    ArrayExhausted {
        name: &'static str,
        from: usize,
        to: usize,
    },
    /// No free range satisfies an allocation request.
    #[error("no free range of {size:#x} bytes aligned to {align:#x}")]
    NoSpace { size: u64, align: u64 },
}
