use thiserror::Error;

/// Errors produced while constructing or solving a puzzle.
///
/// `Line` and `Contradiction` are routine during speculative search: probing
/// and DFS catch them and turn them into branch failures. The other variants
/// terminate the solve.
#[derive(Debug, Error)]
pub enum SolveError {
    /// A single line cannot be refined without emptying a cell, or no
    /// completion of it matches the clue.
    #[error("line contradiction: {0}")]
    Line(String),

    /// A speculative board state proved infeasible. Only raised inside
    /// probing/DFS, never surfaced to callers.
    #[error("board contradiction: {0}")]
    Contradiction(String),

    /// Structural error in the clues themselves (bad token, unknown color,
    /// blocks that cannot fit).
    #[error("invalid description: {0}")]
    InvalidDescription(String),

    /// Both remaining candidates of some cell are contradictory at the root
    /// level; the puzzle has no solution.
    #[error("unsolvable puzzle: {0}")]
    Unsolvable(String),
}

impl SolveError {
    /// Whether the error only invalidates the current speculative branch.
    pub fn is_speculative(&self) -> bool {
        matches!(self, SolveError::Line(_) | SolveError::Contradiction(_))
    }

    /// Rewrap a line-level failure as a branch failure.
    pub fn into_contradiction(self) -> SolveError {
        match self {
            SolveError::Line(msg) => SolveError::Contradiction(msg),
            other => other,
        }
    }
}
