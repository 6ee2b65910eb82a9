use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use crosshatch::board::Board;
use crosshatch::formats::{self, PuzzleFormat};
use crosshatch::line_solve::Method;
use crosshatch::search::{DEFAULT_MAX_DEPTH, SolveOptions, solve};

#[derive(clap::Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Puzzle file to solve; INI-style board or webpbn XML
    input_path: PathBuf,

    /// Format to expect the input to be in (inferred from the extension if
    /// omitted)
    #[arg(short, long, value_enum)]
    format: Option<PuzzleFormat>,

    /// Line-solving methods, each run to a fixed point per pass
    #[arg(short, long, value_enum, num_args = 1..)]
    methods: Vec<Method>,

    /// Stop the search after finding this many solutions
    #[arg(long)]
    max_solutions: Option<usize>,

    /// Wall-clock budget for the search phase, in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Ceiling on the depth-first search depth
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Explain the solve process line-by-line.
    #[arg(short, long, action = clap::ArgAction::SetTrue)]
    trace: bool,

    /// Show a spinner while solving
    #[arg(long, default_value_t)]
    progress: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let puzzle = formats::load_path(&args.input_path, args.format)?;
    let mut board = Board::new(puzzle);

    let methods = if args.methods.is_empty() {
        vec![Method::default()]
    } else {
        args.methods.clone()
    };
    let options = SolveOptions {
        max_solutions: args.max_solutions,
        timeout: args.timeout.map(Duration::from_secs),
        max_depth: args.max_depth,
        methods,
        display_progress: args.progress && !args.trace,
        trace_solve: args.trace,
        ..SolveOptions::default()
    };

    let report = match solve(&mut board, &options) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            std::process::exit(1);
        }
    };

    if report.solutions.is_empty() {
        print!("{}", board.render());
        eprintln!(
            "{} solved {:.1}% of the cells",
            "partial:".yellow().bold(),
            report.solution_rate * 100.0
        );
    } else {
        for (index, solution) in report.solutions.iter().enumerate() {
            if report.solutions.len() > 1 {
                println!("{} {}", "solution".green().bold(), index + 1);
            }
            print!("{}", board.render_snapshot(solution));
        }
        eprintln!(
            "{} {} solution(s); search depth {}; {} contradictions",
            "done:".green().bold(),
            report.solutions.len(),
            report.depth_reached,
            report.contradictions_found
        );
    }

    Ok(())
}
