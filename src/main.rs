//! rforge – command-line resume document → PDF/text exporter.
//!
//! Usage:
//!   rforge <document.json> [output.pdf] [--templates DIR] [--text out.txt] [--debug-html]
//!
//! If `output.pdf` is omitted the PDF is written next to the input file
//! with the same stem (e.g. `resume.json` → `resume.pdf`).

use std::{env, fs, path::PathBuf, process};

use resume_forge::engine::{Engine, EngineConfig};
use resume_forge::export::{Document, ExportConfig, Exporter};
use resume_forge::inline::{FontInliner, HttpFontFetcher};
use resume_forge::template::{load_template_dir, NoCustomTemplate, StaticProfileProvider};
use resume_forge::tree::Tree;

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    let mut input_path: Option<PathBuf> = None;
    let mut output_path: Option<PathBuf> = None;
    let mut templates_dir: Option<PathBuf> = None;
    let mut text_path: Option<PathBuf> = None;
    let mut debug_html = false;
    let mut positional = 0usize;

    let mut iter = args.iter().skip(1).peekable();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--templates" => match iter.next() {
                Some(v) => templates_dir = Some(PathBuf::from(v)),
                None => {
                    eprintln!("--templates requires a directory argument");
                    process::exit(1);
                }
            },
            "--text" => match iter.next() {
                Some(v) => text_path = Some(PathBuf::from(v)),
                None => {
                    eprintln!("--text requires a file argument");
                    process::exit(1);
                }
            },
            "--debug-html" => debug_html = true,
            "--help" | "-h" => {
                print_usage(&args[0]);
                process::exit(0);
            }
            other if other.starts_with('-') => {
                eprintln!("Unknown flag: {other}");
                print_usage(&args[0]);
                process::exit(1);
            }
            path => {
                if positional == 0 {
                    input_path = Some(PathBuf::from(path));
                } else if positional == 1 {
                    output_path = Some(PathBuf::from(path));
                } else {
                    eprintln!("Unexpected argument: {path}");
                    print_usage(&args[0]);
                    process::exit(1);
                }
                positional += 1;
            }
        }
    }

    let input = match input_path {
        Some(p) => p,
        None => {
            eprintln!("Error: no document file specified.");
            print_usage(&args[0]);
            process::exit(1);
        }
    };

    // Default output: same directory + same stem as input, but with .pdf
    let output = output_path.unwrap_or_else(|| {
        let mut o = input.clone();
        o.set_extension("pdf");
        o
    });

    let json = match fs::read_to_string(&input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading '{}': {e}", input.display());
            process::exit(1);
        }
    };
    let tree = match Tree::from_json(&json) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error parsing '{}': {e}", input.display());
            process::exit(1);
        }
    };

    let templates_dir = templates_dir.unwrap_or_else(|| PathBuf::from("templates"));
    let store = match load_template_dir(&templates_dir) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading templates from '{}': {e}", templates_dir.display());
            process::exit(1);
        }
    };

    let engine = match Engine::discover(EngineConfig::default()) {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let fetcher = match HttpFontFetcher::new() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Error starting runtime: {e}");
            process::exit(1);
        }
    };

    let mut exporter = Exporter::new(
        store,
        StaticProfileProvider::default(),
        engine,
        FontInliner::new(fetcher),
        ExportConfig {
            debug_html,
            debug_dir: None,
        },
    );

    let mut document = Document::new(tree);
    let result = runtime.block_on(exporter.export(&mut document, &mut NoCustomTemplate));

    match result {
        Ok(result) => {
            if let Err(e) = fs::write(&output, &result.pdf) {
                eprintln!("Error writing '{}': {e}", output.display());
                process::exit(1);
            }
            eprintln!("Wrote '{}' ({} bytes)", output.display(), result.pdf.len());
            if let Some(text_path) = text_path {
                if let Err(e) = fs::write(&text_path, &result.text) {
                    eprintln!("Error writing '{}': {e}", text_path.display());
                    process::exit(1);
                }
                eprintln!("Wrote '{}'", text_path.display());
            }
        }
        Err(e) => {
            eprintln!("Error exporting: {e}");
            process::exit(1);
        }
    }
}

fn print_usage(prog: &str) {
    eprintln!("rforge – resume document to PDF/text exporter (resume-forge)");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} <document.json> [output.pdf] [--templates DIR] [--text out.txt] [--debug-html]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <document.json>  Resume content tree (nested name/value/children form)");
    eprintln!("  [output.pdf]     Output path (default: same stem as input with .pdf)");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --templates DIR  Template directory with catalog.json (default: ./templates)");
    eprintln!("  --text FILE      Also write the plain-text rendition to FILE");
    eprintln!("  --debug-html     Write rendered HTML snapshots for troubleshooting");
    eprintln!("  --help           Print this message");
}
