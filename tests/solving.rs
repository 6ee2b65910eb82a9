//! End-to-end solving scenarios: full boards through propagation and
//! search, plus the line-solver dispatch contract.

use crosshatch::board::Board;
use crosshatch::error::SolveError;
use crosshatch::line_solve::{Cell, LineCaches, Method, solve_line};
use crosshatch::propagate::{PropagateOptions, propagate};
use crosshatch::puzzle::{BACKGROUND, BOX, Block, Puzzle, bw_palette, palette_from_colors};
use crosshatch::search::{SolveOptions, solve};

fn bw_puzzle(cols: &[&str], rows: &[&str]) -> Puzzle {
    Puzzle::parse(cols, rows, bw_palette()).unwrap()
}

/// `-` space, `#` box, anything else unknown.
fn bw_line(spec: &str) -> Vec<Cell> {
    let both = Cell::from_colors(&[BACKGROUND, BOX]);
    spec.chars()
        .map(|ch| match ch {
            '-' => Cell::from_color(BACKGROUND),
            '#' => Cell::from_color(BOX),
            _ => both,
        })
        .collect()
}

fn wikipedia_w() -> Puzzle {
    bw_puzzle(
        &[
            "1", "1", "2", "4", "7", "9", "2 8", "1 8", "8", "1 9", "2 7", "3 4", "6 4", "8 5",
            "1 11", "1 7", "8", "1 4 8", "6 8", "4 7", "2 4", "1 4", "5", "1 4", "1 5", "7", "5",
            "3", "1", "1",
        ],
        &[
            "8 7 5 7", "5 4 3 3", "3 3 2 3", "4 3 2 2", "3 3 2 2", "3 4 2 2", "4 5 2", "3 5 1",
            "4 3 2", "3 4 2", "4 4 2", "3 6 2", "3 2 3 1", "4 3 4 2", "3 2 3 2", "6 5", "4 5",
            "3 3", "3 3", "1 1",
        ],
    )
}

#[test]
fn wikipedia_w_solves_by_propagation_alone() {
    let mut board = Board::new(wikipedia_w());
    propagate(
        &mut board,
        &mut LineCaches::new(),
        &PropagateOptions::default(),
    )
    .unwrap();

    assert!(board.is_solved_full());
    assert_eq!(board.solution_rate(), 1.0);
}

#[test]
fn wikipedia_w_all_method_chains_agree() {
    let chains: Vec<Vec<Method>> = vec![
        vec![Method::Bgu],
        vec![Method::Efficient],
        vec![Method::ReverseTracking],
        vec![Method::Simpson, Method::Bgu],
    ];

    let mut renders = vec![];
    for methods in chains {
        let mut board = Board::new(wikipedia_w());
        let options = PropagateOptions {
            methods,
            ..PropagateOptions::default()
        };
        propagate(&mut board, &mut LineCaches::new(), &options).unwrap();
        renders.push(board.render());
    }

    for render in &renders[1..] {
        assert_eq!(render, &renders[0]);
    }
}

#[test]
fn line_dispatch_agrees_on_the_1_1_5_case() {
    let desc = vec![Block::new(1, BOX), Block::new(1, BOX), Block::new(5, BOX)];
    let input = bw_line("---#--         -      # ");
    let expected = bw_line("---#--?????????-???####?");

    for method in [
        Method::PartialMatch,
        Method::ReverseTracking,
        Method::Bgu,
        Method::Efficient,
    ] {
        let mut caches = LineCaches::new();
        let mut lane = ndarray::Array1::from(input.clone());
        solve_line(&desc, &mut lane.view_mut(), method, &mut caches).unwrap();
        assert_eq!(lane.to_vec(), expected, "method {:?}", method);
    }
}

#[test]
fn line_dispatch_signals_contradictions() {
    let desc = vec![Block::new(4, BOX), Block::new(2, BOX)];
    let input = bw_line(" # -    ");

    for method in [
        Method::PartialMatch,
        Method::ReverseTracking,
        Method::Bgu,
        Method::Efficient,
        Method::Simpson,
    ] {
        let mut caches = LineCaches::new();
        let mut lane = ndarray::Array1::from(input.clone());
        let res = solve_line(&desc, &mut lane.view_mut(), method, &mut caches);
        assert!(
            matches!(res, Err(SolveError::Line(_))),
            "method {:?}",
            method
        );
    }
}

#[test]
fn ambiguous_puzzle_has_two_solutions() {
    let puzzle = bw_puzzle(
        &["3", "1", "2", "2", "1 1", "1 1"],
        &["1 2", "1", "1", "3", "2", "2"],
    );

    // Line solving alone gets nowhere on this one.
    let mut board = Board::new(puzzle.clone());
    propagate(
        &mut board,
        &mut LineCaches::new(),
        &PropagateOptions::default(),
    )
    .unwrap();
    assert_eq!(board.solution_rate(), 0.0);

    let mut board = Board::new(puzzle);
    let report = solve(&mut board, &SolveOptions::default()).unwrap();

    assert_eq!(report.solutions.len(), 2);
    assert_ne!(report.solutions[0], report.solutions[1]);
    for solution in &report.solutions {
        assert!(solution.iter().all(|cell| cell.is_solved()));
    }

    // What search proves along the way stays proven: 28 of the 36 cells.
    let expected_rate = 7.0 / 9.0;
    assert!(
        (report.solution_rate - expected_rate).abs() < 1e-6,
        "rate {} != {}",
        report.solution_rate,
        expected_rate
    );
}

#[test]
fn ambiguous_puzzle_respects_max_solutions() {
    let puzzle = bw_puzzle(
        &["3", "1", "2", "2", "1 1", "1 1"],
        &["1 2", "1", "1", "3", "2", "2"],
    );
    let mut board = Board::new(puzzle);
    let options = SolveOptions {
        max_solutions: Some(1),
        ..SolveOptions::default()
    };
    let report = solve(&mut board, &options).unwrap();
    assert_eq!(report.solutions.len(), 1);
}

#[test]
fn colored_puzzle_solves_fully() {
    let palette = palette_from_colors(&[
        ("r".to_string(), (255, 0, 0), 'r'),
        ("b".to_string(), (0, 0, 255), 'b'),
    ])
    .unwrap();
    let puzzle = Puzzle::parse(
        &["1r 1b", "1r 1b", "1r 1b"],
        &["3r", "0", "3b"],
        palette,
    )
    .unwrap();

    let mut board = Board::new(puzzle);
    let report = solve(&mut board, &SolveOptions::default()).unwrap();

    assert_eq!(report.solutions.len(), 1);
    assert_eq!(report.solution_rate, 1.0);
    assert_eq!(board.render(), "rrr\n   \nbbb\n");
}

#[test]
fn blotted_line_stays_open() {
    let desc = vec![Block::blotted(BOX)];
    let input = bw_line("?????");

    let mut caches = LineCaches::new();
    let mut lane = ndarray::Array1::from(input.clone());
    let refinement = solve_line(&desc, &mut lane.view_mut(), Method::Bgu, &mut caches).unwrap();

    // Completions of every length 1..=5 exist: no cell can be fixed.
    assert!(refinement.affected_cells.is_empty());
    assert_eq!(lane.to_vec(), input);
}

#[test]
fn blotted_board_solves() {
    // One blotted row: the column clues pin the blot's actual extent.
    let puzzle = Puzzle::new(
        vec![
            vec![Block::new(1, BOX)],
            vec![Block::new(1, BOX)],
            vec![],
        ],
        vec![vec![Block::blotted(BOX)], vec![]],
        bw_palette(),
    )
    .unwrap();

    let mut board = Board::new(puzzle);
    let report = solve(&mut board, &SolveOptions::default()).unwrap();
    assert_eq!(report.solutions.len(), 1);
    assert_eq!(board.render(), "## \n   \n");
}

#[test]
fn search_driver_solves_what_propagation_can() {
    // The search entry point on an easy board just reports the single
    // solution without any DFS.
    let mut board = Board::new(wikipedia_w());
    let report = solve(&mut board, &SolveOptions::default()).unwrap();
    assert_eq!(report.solutions.len(), 1);
    assert_eq!(report.depth_reached, 0);
    assert_eq!(report.contradictions_found, 0);
}
