#![forbid(unsafe_code)]

/// Failure of an indexed sequence operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    /// The index is not occupied.
    IndexOutOfBounds { index: usize, len: usize },
}

impl std::fmt::Display for SequenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "index {index} out of bounds for sequence of length {len}")
            }
        }
    }
}

impl std::error::Error for SequenceError {}
