//! Tsugi CLI - コマンドラインインターフェース
//!
//! 実行イベントのスクリプトをデバッガコアに流し込み、停止と状態を表示します。

mod replay;
mod script;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;
use tsugi_core::DebuggerConfig;

use crate::replay::Replayer;
use crate::script::parse_script;

pub type Result<T> = anyhow::Result<T>;

/// Tsugi - Execution-event debugger core
#[derive(Parser)]
#[command(name = "tsugi")]
#[command(version)]
#[command(about = "Replays execution-event scripts against the tsugi debugger core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: DebugCommand,
}

#[derive(Subcommand)]
enum DebugCommand {
    /// Replay an event script
    Replay {
        /// Path to the event script
        script: PathBuf,

        /// Trace every new line on new threads
        #[arg(long)]
        trace: bool,

        /// Enable debug logging
        #[arg(short, long)]
        verbose: bool,

        /// Start new threads with breakpoint matching disabled
        #[arg(long)]
        no_breakpoints: bool,

        /// Open a command prompt whenever a thread stops
        #[arg(short, long)]
        interactive: bool,
    },

    /// Check an event script without running it
    Check {
        /// Path to the event script
        script: PathBuf,
    },
}

/// ログ出力を初期化する
fn init_tracing(verbose: bool) {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(false)
        .without_time()
        .init();
}

fn read_script(path: &Path) -> Result<Vec<script::ScriptLine>> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;
    parse_script(&source)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        DebugCommand::Replay {
            script,
            trace,
            verbose,
            no_breakpoints,
            interactive,
        } => {
            init_tracing(verbose);

            let lines = read_script(&script)?;
            info!(script = %script.display(), directives = lines.len(), "replaying script");

            let config = DebuggerConfig {
                breakpoints_enabled: !no_breakpoints,
                trace_new_threads: trace,
            };
            let mut replayer = Replayer::new(config)?;
            if interactive {
                replayer = replayer.interactive()?;
            }
            replayer.run(&lines)?;
            println!(
                "{} stop(s), {} breakpoint(s)",
                replayer.stops().len(),
                replayer.debugger().breakpoints().len()
            );
        }
        DebugCommand::Check { script } => {
            init_tracing(false);
            let lines = read_script(&script)?;
            println!("{}: {} directive(s) OK", script.display(), lines.len());
        }
    }

    Ok(())
}
