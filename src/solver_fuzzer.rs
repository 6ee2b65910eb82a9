//! Randomized line-solver consistency test, registered as its own test
//! target. Generates solved lines, derives their clues, re-hides some
//! information, and checks every solver against the ground truth.
