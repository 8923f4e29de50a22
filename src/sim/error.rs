use thiserror::Error;

/// Failures the timing core can report. The engine never panics on bad
/// requests; callers map these onto floor latencies or I/O errors as they
/// see fit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("unsupported event kind {0}")]
    InvalidKind(u8),
    #[error("page state does not permit {op} at {location}")]
    PageState {
        op: &'static str,
        location: &'static str,
    },
    #[error("not enough empty pages to merge: {valid} valid into {empty} empty")]
    MergeSpace { valid: u32, empty: u32 },
    #[error("merge source and target are on different planes")]
    CrossPlaneMerge,
    #[error("channel {0} scheduling table saturated")]
    BusSaturated(u32),
    #[error("block has no erases remaining")]
    WornOut,
    #[error("logical page {0} beyond device capacity")]
    Range(u64),
}
