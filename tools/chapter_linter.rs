/// Chapter Linter: validates chapter files and reports authoring problems.
///
/// Usage: chapter_linter <chapter_file_or_dir>
///
/// Structural errors (dangling references, duplicate ids, parse failures)
/// make the exit code non-zero. Lint warnings do not.
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::EnvFilter;
use vn_playback::core::graph::ScriptGraph;

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: chapter_linter <chapter_file_or_dir>");
        process::exit(0);
    }

    let root = Path::new(&args[1]);
    let files = if root.is_file() {
        vec![root.to_path_buf()]
    } else if root.is_dir() {
        let mut files = Vec::new();
        collect_chapter_files(root, &mut files);
        files.sort();
        files
    } else {
        eprintln!("ERROR: Path '{}' does not exist", root.display());
        process::exit(1);
    };

    let mut errors = 0;
    let mut warnings = 0;

    println!("=== Chapter Lint Report ===\n");

    for path in &files {
        match ScriptGraph::load_from_path(path) {
            Ok(graph) => {
                let lints = graph.lint();
                println!(
                    "{}: chapter '{}' ({} nodes, entry '{}')",
                    path.display(),
                    graph.chapter_id(),
                    graph.len(),
                    graph.entry()
                );
                for lint in &lints {
                    println!("  WARNING: {}", lint);
                }
                warnings += lints.len();
            }
            Err(e) => {
                println!("{}:", path.display());
                println!("  ERROR: {}", e);
                errors += 1;
            }
        }
    }

    if files.is_empty() {
        println!("No chapter files found.");
    }

    println!(
        "\nSummary: {} files, {} errors, {} warnings",
        files.len(),
        errors,
        warnings
    );

    if errors > 0 {
        process::exit(1);
    }
}

fn collect_chapter_files(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_chapter_files(&path, files);
            } else if matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("json") | Some("ron")
            ) {
                files.push(path);
            }
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
