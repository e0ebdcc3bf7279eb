use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use pregen_common::CellCoord;
use pregen_kernel::{Scheduler, Server};
use pregen_persist::DirStore;
use pregen_stream::{SetupReport, schedule_setup};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pregen-cli", about = "Pre-generate chunks of configured worlds")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Write the default configuration file
    Init {
        /// Path of the configuration file
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print the area and cell count each configured world would get
    Plan {
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
        /// Spawn cell of every world, as X,Z
        #[arg(long, default_value = "0,0", value_parser = parse_cell)]
        spawn: CellCoord,
    },
    /// Run a pre-generation pass against worlds stored under a data directory
    Run {
        #[arg(short, long, default_value = "config.yml")]
        config: PathBuf,
        /// Directory holding one record store per world
        #[arg(short, long, default_value = "worlds")]
        data_dir: PathBuf,
        /// Spawn cell of every world, as X,Z
        #[arg(long, default_value = "0,0", value_parser = parse_cell)]
        spawn: CellCoord,
        /// Chunks the generation pipeline materializes per tick
        #[arg(long, default_value = "8")]
        generation_budget: usize,
        /// Stop after this many ticks even if worlds are unfinished
        #[arg(long, default_value = "1000000")]
        max_ticks: u64,
        /// Configured worlds to leave unloaded
        #[arg(long)]
        unloaded: Vec<String>,
    },
}

fn parse_cell(s: &str) -> Result<CellCoord, String> {
    let (x, z) = s
        .split_once(',')
        .ok_or_else(|| format!("expected X,Z, got '{s}'"))?;
    let x = x.trim().parse().map_err(|e| format!("invalid x '{x}': {e}"))?;
    let z = z.trim().parse().map_err(|e| format!("invalid z '{z}': {e}"))?;
    Ok(CellCoord::new(x, z))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("pregen-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("stream: {}", pregen_stream::crate_info());
            println!(
                "default max-concurrent-generation: {}",
                pregen_config::default_max_concurrent()
            );
        }
        Commands::Init { config, force } => {
            if config.exists() && !force {
                anyhow::bail!("{} already exists, pass --force to overwrite", config.display());
            }
            pregen_config::write_default(&config)
                .with_context(|| format!("writing {}", config.display()))?;
            println!("Wrote default configuration to {}", config.display());
        }
        Commands::Plan { config, spawn } => {
            let loaded = pregen_config::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let config = loaded.config;
            println!(
                "mode={}, max-concurrent-generation={}, tick-period={}",
                config.mode.kind(),
                config.throttle.max_concurrent,
                config.throttle.period
            );
            if config.worlds.is_empty() {
                println!("No worlds are specified");
            }
            let bounds = config.mode.bounds(spawn);
            let runs = bounds
                .cell_count()
                .div_ceil(config.throttle.max_concurrent.get() as u64);
            for world in &config.worlds {
                println!(
                    "{world}: {bounds}, {} chunks, {runs} runs ({} ticks)",
                    bounds.cell_count(),
                    runs * config.throttle.period.get()
                );
            }
        }
        Commands::Run {
            config,
            data_dir,
            spawn,
            generation_budget,
            max_ticks,
            unloaded,
        } => {
            let loaded = pregen_config::load(&config)
                .with_context(|| format!("loading {}", config.display()))?;
            let config = loaded.config;

            let mut server = Server::new(generation_budget);
            let mut stores = Vec::new();
            for world in config.worlds.iter().filter(|w| !unloaded.contains(w)) {
                let store = Rc::new(
                    DirStore::open(data_dir.join(world))
                        .with_context(|| format!("opening store for world {world}"))?,
                );
                server.add_region(world.clone(), spawn, store.clone())?;
                stores.push((world.clone(), store));
            }

            let report_slot: Rc<RefCell<Option<SetupReport>>> = Rc::new(RefCell::new(None));
            let sink = report_slot.clone();
            let mut scheduler = Scheduler::new();
            scheduler.with_context(&mut server, |cx| {
                schedule_setup(cx, config, move |report| {
                    *sink.borrow_mut() = Some(report);
                })
            });

            while !scheduler.is_idle() && scheduler.current_tick() < max_ticks {
                scheduler.tick(&mut server);
                server.step();
            }
            while server.pending_generation() > 0 {
                server.step();
            }

            let unfinished = scheduler.cancel_all();
            if unfinished > 0 {
                tracing::warn!(unfinished, "stopped after {max_ticks} ticks");
            }

            let report = report_slot.borrow_mut().take().unwrap_or_default();
            for (world, reason) in &report.skipped {
                println!("{world}: skipped ({reason})");
            }
            for (world, store) in &stores {
                let queued = report
                    .scheduled
                    .iter()
                    .find(|r| &r.name == world)
                    .map_or(0, |r| r.total);
                println!(
                    "{world}: {queued} chunks queued, {} chunks stored",
                    store.record_count()?
                );
            }
            println!(
                "Ticks: {}, generation requests: {}, chunks generated: {}",
                scheduler.current_tick(),
                server.requests().len(),
                server.generated()
            );
        }
    }

    Ok(())
}
