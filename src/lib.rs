//! A constraint solver for nonograms (griddlers, Picross), including
//! multi-color puzzles and "blotted" clues of unknown size.
//!
//! The pipeline: line solvers ([`machine`], [`dynamic`], [`push`], fronted
//! by [`line_solve`]) refine single rows and columns; the propagation
//! engine ([`propagate`]) runs them to a fixed point across the grid; the
//! search driver ([`search`]) layers contradiction probing and depth-first
//! search on top, for puzzles line solving can't finish.

pub mod board;
pub mod dynamic;
pub mod error;
pub mod formats;
pub mod line_solve;
pub mod machine;
pub mod propagate;
pub mod push;
pub mod puzzle;
pub mod search;
