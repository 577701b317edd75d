use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use jp2_fits::jp2::Jp2Io;
use jp2_fits::pipeline::{self, BoxSummary, HeaderEdit};
use jp2_fits::{FileHeader, config};

#[derive(Parser, Debug)]
#[command(
    name = "jp2-fits",
    version,
    about = "Inspect and edit the FITS header embedded in JPEG 2000 files"
)]
struct Cli {
    /// JP2 files or directories to process
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Preview changes without writing to files
    #[arg(long)]
    dry_run: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Also list the box structure of each file
    #[arg(long)]
    boxes: bool,

    /// Set a header field (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Remove a header field (repeatable)
    #[arg(long = "remove", value_name = "KEY")]
    remove: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    let edit = HeaderEdit::parse(&cli.set, &cli.remove)?;

    let mut config = config::Config::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.output.dry_run = true;
    }

    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No JP2 files found in the specified paths.");
    }

    let io: Jp2Io = Jp2Io::from_config(&config);
    let total = images.len();

    if !edit.is_empty() {
        log::info!("Found {total} file(s) to edit");
        if config.output.dry_run {
            log::info!("DRY RUN — no files will be modified");
        }
    }

    let mut results = Vec::new();
    for (i, path) in images.iter().enumerate() {
        let mut result = if edit.is_empty() {
            pipeline::inspect_image(path, &io, cli.boxes)
        } else {
            log::info!("[{}/{}] Editing: {}", i + 1, total, path.display());
            pipeline::edit_image(path, &io, &edit, &config)
        };

        if cli.boxes && result.boxes.is_none() && result.error.is_none() {
            result.boxes = pipeline::inspect_image(path, &io, true).boxes;
        }

        if let Some(ref err) = result.error {
            log::error!("{}: {err}", path.display());
        } else if !cli.json {
            print_result(&result, config.output.dry_run && !edit.is_empty());
        }

        results.push(result);
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }

    let failed = results.iter().filter(|r| r.error.is_some()).count();
    if !edit.is_empty() {
        let changed = results.iter().filter(|r| !r.changed_keys.is_empty()).count();
        log::info!(
            "Done: {changed} changed, {} unchanged, {failed} failed out of {total} files",
            total.saturating_sub(changed + failed)
        );
    } else if failed > 0 {
        log::warn!("{failed} of {total} files could not be read");
    }

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (key column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print the header (and box list) of one file.
fn print_result(result: &pipeline::ProcessResult, preview: bool) {
    println!();
    println!("{BOLD}File:{RESET} {}", result.path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    if let Some(ref boxes) = result.boxes {
        println!("  {BOLD}Boxes{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        print_boxes(boxes, 0);
        println!();
    }

    if let Some(ref header) = result.header {
        println!("  {BOLD}Header{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        print_header(header, &result.changed_keys);
        if header.is_empty() {
            println!("  {DIM}(empty header){RESET}");
        }
        println!();
    }

    if !result.changed_keys.is_empty() {
        let verb = if preview { "Would change" } else { "Changed" };
        println!("  {GREEN}*{RESET} = {verb}: {}", result.changed_keys.join(", "));
        if let Some(ref backup) = result.backup_path {
            println!("  {DIM}Backup: {}{RESET}", backup.display());
        }
        println!();
    }
}

fn print_boxes(boxes: &[BoxSummary], depth: usize) {
    for b in boxes {
        let indent = "  ".repeat(depth);
        println!("  {indent}{:<6} {DIM}{} bytes{RESET}", b.box_type, b.length);
        print_boxes(&b.children, depth + 1);
    }
}

fn print_header(header: &FileHeader, changed: &[String]) {
    for (key, value) in header.iter() {
        let is_changed = changed.iter().any(|k| k == key);
        print_row(key, &value.to_string(), is_changed);
    }
}

/// Print a single key/value row; changed rows are green with a trailing `*`.
fn print_row(key: &str, val: &str, changed: bool) {
    let key_col = format!("{:<22}", key);
    let lines = wrap_text(val, VAL_WIDTH);
    let last = lines.len() - 1;
    for (i, line) in lines.iter().enumerate() {
        let mark = if changed && i == last { " *" } else { "" };
        let (start, end) = if changed { (GREEN, RESET) } else { ("", "") };
        if i == 0 {
            println!("  {start}{key_col} : {line}{mark}{end}");
        } else {
            println!("  {start}{INDENT}{line}{mark}{end}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
