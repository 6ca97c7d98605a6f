//! `epmem` – interactive shell for the episodic memory engine.
//!
//! 1. Loads `~/.epmem/config.toml` (writing the defaults on first run) and
//!    applies `EPMEM_*` overrides.
//! 2. Initialises tracing through `epmem-runtime`.
//! 3. Drops the user into a REPL over an in-process belief state.
//! 4. Intercepts **Ctrl-C** to leave the REPL cleanly.

mod config;
mod repl;

use colored::Colorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

use epmem_runtime::telemetry::init_tracing;

fn main() {
    let (cfg, notice) = match config::load() {
        Ok(Some(cfg)) => (cfg, format!("Config loaded from {}", config::config_path().display())),
        Ok(None) => first_run(),
        Err(e) => (config::Config::default(), format!("Config error: {e}; using defaults")),
    };

    let _tracing = init_tracing("epmem", cfg.log_format);

    print_banner();
    println!("  {}", notice.dimmed());

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "Ctrl-C received, leaving the shell …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let shell = match repl::Shell::new(&cfg) {
        Ok(shell) => shell,
        Err(e) => {
            eprintln!("{}: {}", "Cannot start episodic memory".red(), e);
            std::process::exit(1);
        }
    };
    info!(
        policy = %cfg.tunables.record_policy,
        min_store_size = cfg.tunables.min_store_size,
        "episodic memory ready"
    );

    println!();
    println!("  Type {} for a list of commands.\n", "help".bold().cyan());
    repl::run(shell, shutdown);
}

/// Write the default configuration so the user has a file to edit.
fn first_run() -> (config::Config, String) {
    let cfg = config::Config::default();
    let notice = match config::save(&cfg) {
        Ok(()) => format!("Wrote default config to {}", config::config_path().display()),
        Err(e) => format!("Could not write default config: {e}"),
    };
    (cfg, notice)
}

fn print_banner() {
    println!();
    println!("{}", r#"   ___ ___ __  __ ___ __  __ "#.bold().cyan());
    println!("{}", r#"  | __| _ \  \/  | __|  \/  |"#.bold().cyan());
    println!("{}", r#"  | _||  _/ |\/| | _|| |\/| |"#.bold().cyan());
    println!("{}", r#"  |___|_| |_|  |_|___|_|  |_|"#.bold().cyan());
    println!();
    println!("  {} {}", "epmem".bold(), format!("v{}", env!("CARGO_PKG_VERSION")).dimmed());
    println!("  Episodic memory for cognitive agents");
    println!();
}
