//! Command-line interface
//!
//! Supports:
//! - Highlighting one file with a detected or explicit language
//! - Choosing the theme that assigns highlight ids
//! - Printing raw events, spans, or ANSI-colored source

use std::io::Write;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, ValueEnum};

use crate::config::HighlighterConfig;
use crate::syntax::{
    CancellationToken, HighlightThemeTable, Highlighter, LanguageRegistry, SyntaxHighlights,
};
use crate::theme::Theme;

/// Syntax-highlight a file with tree-sitter
#[derive(Parser, Debug)]
#[command(name = "token-syntax", version, about = "Syntax-highlight a file with tree-sitter")]
pub struct CliArgs {
    /// File to highlight
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Root language name or alias (detected from the extension by default)
    #[arg(short, long, value_name = "NAME")]
    pub language: Option<String>,

    /// Theme id (defaults to the configured theme)
    #[arg(short, long, value_name = "ID")]
    pub theme: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Spans)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One start/end event per line
    Events,
    /// One span per line with its qualified capture name
    Spans,
    /// The source with 24-bit terminal colors
    Ansi,
}

/// Run the tool, writing output to `out`
pub fn run(args: CliArgs, config: &HighlighterConfig, out: &mut impl Write) -> Result<()> {
    // Invalid UTF-8 is highlighted as-is; text lookups decode it lossily
    let source = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;

    let theme_id = args.theme.as_deref().unwrap_or(&config.theme);
    let theme = crate::theme::load_theme(theme_id).map_err(|e| anyhow!(e))?;
    let table = theme.highlight_table();

    let mut registry = LanguageRegistry::with_builtin_languages();
    config.apply_aliases(&mut registry);
    registry.set_theme(&table);

    let language = match &args.language {
        Some(name) => registry
            .resolve(name)
            .ok_or_else(|| anyhow!("Unknown language: {}", name))?,
        None => registry.language_for_path(&args.file).ok_or_else(|| {
            anyhow!(
                "Cannot detect the language of {}; pass --language",
                args.file.display()
            )
        })?,
    };

    let mut highlighter =
        Highlighter::new().with_cancellation_check_interval(config.cancellation_check_interval);
    let cancel = CancellationToken::new();

    match args.format {
        OutputFormat::Events => {
            let events = highlighter.highlight(language, source.as_slice(), &cancel, |name| {
                registry.resolve(name)
            })?;
            for event in events {
                let event = event?;
                match event.highlight {
                    Some(highlight) => writeln!(
                        out,
                        "start {} {}",
                        event.offset,
                        table.name(highlight).unwrap_or("?")
                    )?,
                    None => writeln!(out, "end {}", event.offset)?,
                }
            }
        }
        OutputFormat::Spans => {
            let highlights = highlighter.collect(
                language,
                source.as_slice(),
                &cancel,
                |name| registry.resolve(name),
                0,
            )?;
            write_spans(&highlights, &table, out)?;
        }
        OutputFormat::Ansi => {
            let highlights = highlighter.collect(
                language,
                source.as_slice(),
                &cancel,
                |name| registry.resolve(name),
                0,
            )?;
            write_ansi(&source, &highlights, &theme, &table, out)?;
        }
    }

    Ok(())
}

/// `start..end depth capture -> highlight` per span
pub fn write_spans(
    highlights: &SyntaxHighlights,
    table: &HighlightThemeTable,
    out: &mut impl Write,
) -> std::io::Result<()> {
    for span in &highlights.spans {
        writeln!(
            out,
            "{}..{} {} {} -> {}",
            span.range.start,
            span.range.end,
            span.depth,
            span.capture_name,
            table.name(span.highlight).unwrap_or("?")
        )?;
    }
    Ok(())
}

/// `source` with each highlighted segment wrapped in its theme color
pub fn write_ansi(
    source: &[u8],
    highlights: &SyntaxHighlights,
    theme: &Theme,
    table: &HighlightThemeTable,
    out: &mut impl Write,
) -> std::io::Result<()> {
    const RESET: &str = "\x1b[0m";
    let plain = theme.foreground.map(|color| color.ansi_fg());

    let mut position = 0;
    for (range, highlight) in highlights.segments() {
        let (Some(before), Some(text)) = (source.get(position..range.start), source.get(range.clone()))
        else {
            continue;
        };
        write_plain(out, before, plain.as_deref())?;

        let style = table.style(highlight);
        let mut prefix = String::new();
        if let Some(color) = style.color {
            prefix.push_str(&color.ansi_fg());
        }
        if style.bold {
            prefix.push_str("\x1b[1m");
        }
        if style.italic {
            prefix.push_str("\x1b[3m");
        }
        out.write_all(prefix.as_bytes())?;
        out.write_all(text)?;
        out.write_all(RESET.as_bytes())?;
        position = range.end;
    }
    write_plain(out, source.get(position..).unwrap_or_default(), plain.as_deref())?;
    out.flush()
}

fn write_plain(out: &mut impl Write, text: &[u8], color: Option<&str>) -> std::io::Result<()> {
    match color {
        Some(color) if !text.is_empty() => {
            out.write_all(color.as_bytes())?;
            out.write_all(text)?;
            out.write_all(b"\x1b[0m")
        }
        _ => out.write_all(text),
    }
}
