//! Line solvers built on a finite automaton derived from the clue.
//!
//! The automaton's accepted language is exactly the set of valid complete
//! lines: optional spaces before each block, one transition per block cell,
//! and a mandatory space between same-colored neighbours.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock, Mutex};

use crate::error::SolveError;
use crate::line_solve::Cell;
use crate::puzzle::{BACKGROUND, Block, Color, Description, has_blots};

pub(crate) struct ClueAutomaton {
    transitions: HashMap<(usize, Color), usize>,
    final_state: usize,
}

const INITIAL_STATE: usize = 0;

impl ClueAutomaton {
    fn from_description(desc: &[Block]) -> ClueAutomaton {
        let mut transitions = HashMap::new();
        let mut state = INITIAL_STATE;

        let mut prev_color: Option<Color> = None;
        for block in desc {
            // A space is mandatory between same-colored blocks...
            if prev_color == Some(block.color) {
                transitions.insert((state, BACKGROUND), state + 1);
                state += 1;
            }
            // ...and optional before any block.
            transitions.insert((state, BACKGROUND), state);

            for _ in 0..block.fixed_len() {
                transitions.insert((state, block.color), state + 1);
                state += 1;
            }
            prev_color = Some(block.color);
        }

        // Trailing spaces.
        transitions.insert((state, BACKGROUND), state);

        ClueAutomaton {
            transitions,
            final_state: state,
        }
    }

    fn step(&self, state: usize, color: Color) -> Option<usize> {
        self.transitions.get(&(state, color)).copied()
    }

    /// Whether some completion of the partially-solved line is accepted.
    fn accepts_partial(&self, line: &[Cell]) -> bool {
        let mut states = HashSet::from([INITIAL_STATE]);

        for cell in line {
            let mut next_states = HashSet::new();
            for &state in &states {
                for color in cell.candidates() {
                    if let Some(next) = self.step(state, color) {
                        next_states.insert(next);
                    }
                }
            }
            if next_states.is_empty() {
                return false;
            }
            states = next_states;
        }

        states.contains(&self.final_state)
    }
}

// Automata only depend on the clue, and clues repeat constantly across
// probing, so they are cached process-wide.
static AUTOMATON_CACHE: LazyLock<Mutex<HashMap<Description, Arc<ClueAutomaton>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

const AUTOMATON_CACHE_LIMIT: usize = 1000;

pub(crate) fn automaton_for(desc: &[Block]) -> Arc<ClueAutomaton> {
    let mut cache = AUTOMATON_CACHE.lock().unwrap();
    if let Some(automaton) = cache.get(desc) {
        return Arc::clone(automaton);
    }

    if cache.len() >= AUTOMATON_CACHE_LIMIT {
        cache.clear();
    }
    let automaton = Arc::new(ClueAutomaton::from_description(desc));
    cache.insert(desc.to_vec(), Arc::clone(&automaton));
    automaton
}

/// Per-cell hypothesis testing: fix each candidate color in turn and keep it
/// iff the automaton still accepts some completion. Quadratic, but easy to
/// believe correct.
pub fn solve_partial_match(desc: &[Block], line: &[Cell]) -> Result<Vec<Cell>, SolveError> {
    debug_assert!(!has_blots(desc));
    let automaton = automaton_for(desc);

    if !automaton.accepts_partial(line) {
        return Err(SolveError::Line(format!(
            "no completion fits clue {:?}",
            desc
        )));
    }

    let mut solved = line.to_vec();
    for (i, cell) in line.iter().enumerate() {
        if cell.is_solved() {
            continue;
        }

        let mut surviving = Cell::empty();
        for color in cell.candidates() {
            let mut hypothetical = line.to_vec();
            hypothetical[i] = Cell::from_color(color);
            if automaton.accepts_partial(&hypothetical) {
                surviving.widen(color);
            }
        }

        if surviving.is_empty() {
            // Unreachable when the whole line was accepted above.
            return Err(SolveError::Line(format!(
                "cell {} has no surviving candidate for {:?}",
                i, desc
            )));
        }
        solved[i] = surviving;
    }

    Ok(solved)
}

/// Forward pass remembering, for every reachable `(position, state)`, the
/// `(previous state, color)` edges that led there; backward pass from the
/// final state unioning the colors on surviving edges. Linear in
/// line length times state count.
pub fn solve_reverse_tracking(desc: &[Block], line: &[Cell]) -> Result<Vec<Cell>, SolveError> {
    debug_assert!(!has_blots(desc));
    let automaton = automaton_for(desc);

    // transitions[i] maps a state reachable after reading i cells to its
    // incoming edges.
    let mut table: Vec<HashMap<usize, Vec<(usize, Color)>>> =
        Vec::with_capacity(line.len() + 1);
    table.push(HashMap::from([(INITIAL_STATE, vec![])]));

    for (i, cell) in line.iter().enumerate() {
        let mut next_row: HashMap<usize, Vec<(usize, Color)>> = HashMap::new();
        for &state in table[i].keys() {
            for color in cell.candidates() {
                if let Some(next) = automaton.step(state, color) {
                    next_row.entry(next).or_default().push((state, color));
                }
            }
        }
        if next_row.is_empty() {
            return Err(SolveError::Line(format!(
                "dead end at cell {} for clue {:?}",
                i, desc
            )));
        }
        table.push(next_row);
    }

    if !table[line.len()].contains_key(&automaton.final_state) {
        return Err(SolveError::Line(format!(
            "final state unreachable for clue {:?}",
            desc
        )));
    }

    let mut solved = vec![Cell::empty(); line.len()];
    let mut alive = HashSet::from([automaton.final_state]);
    for i in (0..line.len()).rev() {
        let mut previous = HashSet::new();
        for state in &alive {
            if let Some(edges) = table[i + 1].get(state) {
                for (prev_state, color) in edges {
                    solved[i].widen(*color);
                    previous.insert(*prev_state);
                }
            }
        }
        alive = previous;
    }

    Ok(solved)
}
