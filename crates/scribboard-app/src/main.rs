//! Command-line entry point.

use clap::{Args, Parser, Subcommand};
use scribboard_app::{AppConfig, AppError, Whiteboard};
use scribboard_core::StrokeStore;
use scribboard_core::storage::{FileBackend, LocalStrokeStore, RemoteStrokeStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "scribboard", version, about = "Scribboard board tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Directory holding local boards
    #[arg(long, env = "SCRIBBOARD_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Relay server URL, e.g. ws://localhost:3030/ws (overrides --data-dir)
    #[arg(long, env = "SCRIBBOARD_SERVER")]
    server: Option<String>,

    /// Seconds to wait for the relay
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a board to a PNG file
    Export {
        board_id: String,
        /// Output file (defaults to <board-id>.png)
        #[arg(short, long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = 1280)]
        width: u32,
        #[arg(long, default_value_t = 800)]
        height: u32,
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Remove every stroke from a board
    Clear {
        board_id: String,
        #[command(flatten)]
        store: StoreArgs,
    },
}

fn open_store(args: &StoreArgs) -> Result<Arc<dyn StrokeStore>, AppError> {
    if let Some(url) = &args.server {
        log::info!("Using relay at {}", url);
        return Ok(Arc::new(RemoteStrokeStore::connect(url)?));
    }
    let backend = match &args.data_dir {
        Some(dir) => FileBackend::new(dir.clone())?,
        None => FileBackend::default_location()?,
    };
    log::info!("Using local boards in {}", backend.base_path().display());
    Ok(Arc::new(LocalStrokeStore::new(backend)))
}

/// Poll until the board has applied more than `seen` snapshots.
fn wait_for_snapshot(board: &mut Whiteboard, seen: usize, timeout: Duration) -> Result<(), AppError> {
    let deadline = Instant::now() + timeout;
    while board.snapshot_count() <= seen {
        if Instant::now() >= deadline {
            return Err(AppError::Timeout(board.board_id().to_string()));
        }
        thread::sleep(Duration::from_millis(20));
        board.poll();
    }
    Ok(())
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Command::Export {
            board_id,
            out,
            width,
            height,
            store,
        } => {
            let config = AppConfig::default().with_size(width, height);
            let mut board = Whiteboard::new(&board_id, open_store(&store)?, &config)?;
            wait_for_snapshot(&mut board, 0, Duration::from_secs(store.timeout))?;

            let png = board.export_png()?;
            let path = out.unwrap_or_else(|| PathBuf::from(format!("{}.png", board_id)));
            std::fs::write(&path, &png)?;
            log::info!("PNG export complete: {} bytes", png.len());
            println!(
                "Exported {} strokes to {}",
                board.strokes().len(),
                path.display()
            );
        }
        Command::Clear { board_id, store } => {
            let timeout = Duration::from_secs(store.timeout);
            let mut board = Whiteboard::new(&board_id, open_store(&store)?, &AppConfig::default())?;
            wait_for_snapshot(&mut board, 0, timeout)?;

            let seen = board.snapshot_count();
            board.clear_board();
            // The store answers a clear with a fresh snapshot.
            wait_for_snapshot(&mut board, seen, timeout)?;
            println!("Cleared board {}", board_id);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();
    log::info!("Starting Scribboard");

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
