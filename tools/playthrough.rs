/// Playthrough: headless terminal player for testing chapters.
///
/// Usage: playthrough <chapter_file> [--auto] [--interval-ms <n>] [--saves <dir>]
///
/// Commands:
/// <enter>    : advance (finish the line, or go to the next one)
/// <number>   : pick that option
/// auto       : toggle auto-play
/// history    : show the backlog
/// save <n>   : save to slot n
/// load <n>   : load slot n
/// help       : list commands
/// quit       : exit
use futures::future::{self, BoxFuture, FutureExt};
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vn_playback::core::cache::{AssetCache, AssetLoader};
use vn_playback::core::config::EngineConfig;
use vn_playback::core::engine::PlaybackEngine;
use vn_playback::core::events::EngineEvent;
use vn_playback::core::graph::ScriptGraph;
use vn_playback::core::store::{DirectoryStore, MemoryStore};
use vn_playback::schema::state::PlaybackState;
use vn_playback::schema::value::MetaValue;

/// Upper bound on simulated ticks between two prompts.
const MAX_TICKS: usize = 100_000;

/// Resolves every asset name to a text placeholder.
struct PlaceholderLoader;

impl AssetLoader for PlaceholderLoader {
    type Resource = String;

    fn load(&self, name: &str) -> BoxFuture<'static, Result<String, String>> {
        future::ready(Ok(format!("<{}>", name))).boxed()
    }
}

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let chapter_path = args[1].clone();
    let mut auto = false;
    let mut interval_ms: Option<u64> = None;
    let mut saves_dir: Option<String> = None;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--auto" => auto = true,
            "--interval-ms" if i + 1 < args.len() => {
                i += 1;
                interval_ms = args[i].parse().ok();
            }
            "--saves" if i + 1 < args.len() => {
                i += 1;
                saves_dir = Some(args[i].clone());
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    let graph = match ScriptGraph::load_from_path(Path::new(&chapter_path)) {
        Ok(graph) => graph,
        Err(e) => {
            eprintln!("ERROR: Failed to load chapter: {}", e);
            std::process::exit(1);
        }
    };

    let mut config = EngineConfig::default();
    if let Some(ms) = interval_ms {
        config = config.with_typing_interval(Duration::from_millis(ms));
    }
    let step = if config.typing_interval.is_zero() {
        Duration::from_millis(10)
    } else {
        config.typing_interval
    };

    let builder = PlaybackEngine::builder()
        .config(config)
        .graph(graph)
        .cache(AssetCache::new(PlaceholderLoader));
    let built = match saves_dir {
        Some(dir) => builder.store(DirectoryStore::new(dir)).build(),
        None => builder.store(MemoryStore::new()).build(),
    };
    let mut engine = match built {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(1);
        }
    };

    let log: Arc<Mutex<Vec<EngineEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&log);
    let _subscription = engine.subscribe(move |event, _| {
        if let Ok(mut events) = sink.lock() {
            events.push(event.clone());
        }
    });

    println!(
        "Chapter '{}' ({} nodes)",
        engine.graph().chapter_id(),
        engine.graph().len()
    );
    println!("Type 'help' for commands.\n");

    if let Err(e) = engine.start() {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
    if auto {
        engine.toggle_auto_play().ok();
    }
    settle(&mut engine, step);
    print_events(&engine, &log);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let started_at = std::time::Instant::now();

    loop {
        if engine.is_chapter_finished() {
            println!("-- end of chapter --");
            break;
        }
        print!("> ");
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let parts: Vec<&str> = line.split_whitespace().collect();

        let result = match parts.first().map(|s| s.to_lowercase()).as_deref() {
            None => engine.advance(),
            Some("quit") | Some("exit") | Some("q") => break,
            Some("help") | Some("h") | Some("?") => {
                print_help();
                Ok(())
            }
            Some("auto") => engine.toggle_auto_play(),
            Some("history") => {
                println!("\n--- History ---");
                for entry in engine.history().entries() {
                    println!("{}: {}", display_speaker(&entry.speaker), entry.content);
                }
                println!("--- End ---\n");
                Ok(())
            }
            Some("save") => match parts.get(1).and_then(|s| s.parse::<usize>().ok()) {
                Some(index) => {
                    let mut metadata = BTreeMap::new();
                    metadata.insert(
                        "play_seconds".to_string(),
                        MetaValue::from(started_at.elapsed().as_secs() as i64),
                    );
                    let result = engine.save_to(index, metadata);
                    if result.is_ok() {
                        println!("Saved to slot {}.", index);
                    }
                    result
                }
                None => {
                    println!("Usage: save <n>");
                    Ok(())
                }
            },
            Some("load") => match parts.get(1).and_then(|s| s.parse::<usize>().ok()) {
                Some(index) => engine.load_from(index),
                None => {
                    println!("Usage: load <n>");
                    Ok(())
                }
            },
            Some(other) => match other.parse::<usize>() {
                Ok(n) => choose_by_number(&mut engine, n),
                Err(_) => {
                    println!("Unknown command: {}", other);
                    Ok(())
                }
            },
        };

        if let Err(e) = result {
            println!("ERROR: {}", e);
        }
        settle(&mut engine, step);
        print_events(&engine, &log);
    }

    engine.dispose();
}

/// Run simulated time until the engine is waiting on the player.
fn settle(engine: &mut PlaybackEngine<PlaceholderLoader>, step: Duration) {
    for _ in 0..MAX_TICKS {
        let waiting_on_auto = engine.is_auto_play()
            && engine.state() == PlaybackState::Normal
            && !engine.is_chapter_finished()
            && engine.current_node().is_some_and(|node| !node.has_options());
        if engine.state() != PlaybackState::Typing && !waiting_on_auto {
            return;
        }
        engine.tick(step);
    }
}

fn choose_by_number(
    engine: &mut PlaybackEngine<PlaceholderLoader>,
    n: usize,
) -> Result<(), vn_playback::EngineError> {
    let option_id = engine
        .current_node()
        .and_then(|node| n.checked_sub(1).and_then(|i| node.options.get(i)))
        .map(|option| option.id.clone());
    match option_id {
        Some(id) => engine.choose(&id),
        None => {
            println!("No option {}.", n);
            Ok(())
        }
    }
}

fn print_events(engine: &PlaybackEngine<PlaceholderLoader>, log: &Mutex<Vec<EngineEvent>>) {
    let events = match log.lock() {
        Ok(mut events) => std::mem::take(&mut *events),
        Err(_) => return,
    };

    let mut last_text = String::new();
    for event in events {
        match event {
            EngineEvent::TextRevealed { text } => last_text = text,
            EngineEvent::RevealFinished { node_id, .. } => {
                let speaker = engine
                    .graph()
                    .node(&node_id)
                    .map(|node| node.speaker.clone())
                    .unwrap_or_default();
                println!("{}: {}", display_speaker(&speaker), last_text);
            }
            EngineEvent::StageChanged { slot, asset } => match asset {
                Some(name) => println!("  [{}] {}", slot.field_name(), name),
                None => println!("  [{}] cleared", slot.field_name()),
            },
            EngineEvent::ChoicesPresented { options, .. } => {
                for (i, option) in options.iter().enumerate() {
                    println!("  {}) {}", i + 1, option.text);
                }
            }
            EngineEvent::AssetFailed { slot, name, reason } => {
                println!("  [{}] failed to load '{}': {}", slot.field_name(), name, reason);
            }
            EngineEvent::MarkupFailed { reason, .. } => println!("  (markup error: {})", reason),
            EngineEvent::AutoPlayToggled { enabled } => {
                println!("Auto-play {}.", if enabled { "on" } else { "off" });
            }
            EngineEvent::Restored { node_id } => {
                println!("Restored at '{}'.", node_id);
                let speaker = engine
                    .graph()
                    .node(&node_id)
                    .map(|node| node.speaker.clone())
                    .unwrap_or_default();
                println!("{}: {}", display_speaker(&speaker), last_text);
            }
            _ => {}
        }
    }
}

fn display_speaker(speaker: &str) -> &str {
    if speaker.is_empty() {
        "(narration)"
    } else {
        speaker
    }
}

fn print_usage() {
    println!("Usage: playthrough <chapter_file> [--auto] [--interval-ms <n>] [--saves <dir>]");
}

fn print_help() {
    println!("Commands:");
    println!("  <enter>     advance");
    println!("  <number>    pick that option");
    println!("  auto        toggle auto-play");
    println!("  history     show the backlog");
    println!("  save <n>    save to slot n");
    println!("  load <n>    load slot n");
    println!("  quit        exit");
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
