//! chapterize - Export EPUB chapters to Markdown or plain text

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use chapterize::{Book, OutputFormat, PandocConverter, export_book, read_epub};

#[derive(Parser)]
#[command(name = "chapterize")]
#[command(version, about = "Export EPUB chapters to Markdown or plain text", long_about = None)]
#[command(after_help = "EXAMPLES:
    chapterize book.epub                   Export Markdown next to the book
    chapterize book.epub -o out -f plain   Export plain text into ./out
    chapterize -i book.epub                Show book structure")]
struct Cli {
    /// Input EPUB file
    #[arg(value_name = "EPUB")]
    input: PathBuf,

    /// Output directory (default: a folder named after the book)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, default_value = "markdown")]
    format: OutputFormat,

    /// Show book structure without exporting
    #[arg(short, long)]
    info: bool,

    /// Increase log verbosity (-v: info, -vv: debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    let _ = simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
}

fn run(cli: &Cli) -> chapterize::Result<()> {
    let book = read_epub(&cli.input)?;

    if cli.info {
        show_info(&cli.input, &book);
        return Ok(());
    }

    // Default output: a directory named after the book, next to it
    let out_dir = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension(""));

    let report = export_book(&book, &out_dir, cli.format, &PandocConverter::new())?;

    println!(
        "exported {} chapters and {} images to {}",
        report.chapters,
        report.images,
        out_dir.display()
    );
    if report.fallbacks > 0 {
        println!(
            "note: {} chapters were written as stripped plain text (converter failed)",
            report.fallbacks
        );
    }
    Ok(())
}

fn show_info(path: &std::path::Path, book: &Book) {
    let meta = &book.metadata;
    println!("File: {}", path.display());
    println!("Title: {}", meta.title);
    if !meta.authors.is_empty() {
        println!("Authors: {}", meta.authors.join(", "));
    }
    if !meta.language.is_empty() {
        println!("Language: {}", meta.language);
    }
    if let Some(ref publisher) = meta.publisher {
        println!("Publisher: {publisher}");
    }
    if let Some(ref desc) = meta.description {
        let desc = desc.trim();
        if desc.chars().count() > 200 {
            let truncated: String = desc.chars().take(200).collect();
            println!("Description: {truncated}...");
        } else {
            println!("Description: {desc}");
        }
    }
    println!("Spine items: {}", book.spine.len());
    println!("Documents: {}", book.documents().count());
    println!("Images: {}", book.images().count());

    println!("TOC:");
    print_toc(&book.toc, 1);
}

fn print_toc(entries: &[chapterize::TocEntry], depth: usize) {
    for entry in entries {
        println!("{}- {} -> {}", "  ".repeat(depth), entry.title, entry.href);
        print_toc(&entry.children, depth + 1);
    }
}
