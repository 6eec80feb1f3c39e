use std::io::{self, BufWriter};

use anyhow::Result;
use clap::Parser;

use token_syntax::cli::{self, CliArgs};
use token_syntax::config::HighlighterConfig;

fn main() -> Result<()> {
    let args = CliArgs::parse();
    token_syntax::tracing::init();

    let config = HighlighterConfig::load();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    cli::run(args, &config, &mut out)
}
