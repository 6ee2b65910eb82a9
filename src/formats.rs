pub mod ini;
pub mod webpbn;

use std::path::Path;

use anyhow::Context;

use crate::puzzle::Puzzle;

#[derive(Clone, Copy, Debug, clap::ValueEnum, Default, PartialEq, Eq)]
pub enum PuzzleFormat {
    /// INI-style board file with a `[clues]` section (and optionally
    /// `[colors]`).
    #[default]
    Ini,
    /// The XML format associated with <https://webpbn.com>.
    Webpbn,
}

pub fn infer_format(path: &Path, format_arg: Option<PuzzleFormat>) -> PuzzleFormat {
    if let Some(format) = format_arg {
        return format;
    }

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("xml") | Some("pbn") => PuzzleFormat::Webpbn,
        _ => PuzzleFormat::Ini,
    }
}

pub fn load_path(path: &Path, format: Option<PuzzleFormat>) -> anyhow::Result<Puzzle> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read puzzle file {}", path.display()))?;

    match infer_format(path, format) {
        PuzzleFormat::Ini => ini::parse(&content)
            .with_context(|| format!("parsing {} as a board file", path.display())),
        PuzzleFormat::Webpbn => webpbn::parse(&content)
            .with_context(|| format!("parsing {} as webpbn XML", path.display())),
    }
}
