//! Headless Runner
//!
//! Runs the demo scene for a fixed number of ticks and prints a summary,
//! optionally dumping the event log as JSON.

use bevy_ecs::prelude::*;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process;

use stealth_sim::components::{AgentId, Behavior, Detection, SimClock};
use stealth_sim::config::Config;
use stealth_sim::events::EventLog;
use stealth_sim::{build_schedule, setup};

/// Command line arguments for the simulation
#[derive(Parser, Debug)]
#[command(name = "stealth_sim")]
#[command(about = "Headless stealth-AI perception and behavior simulation")]
struct Args {
    /// Random seed for reproducibility
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Number of fixed steps to simulate
    #[arg(long, default_value_t = 600)]
    ticks: u64,

    /// Fixed step duration in seconds
    #[arg(long, default_value_t = 0.1)]
    dt: f32,

    /// Tuning file path (built-in defaults are used when omitted)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the event log as JSON to this file
    #[arg(long)]
    events_out: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let cfg = match &args.config {
        Some(path) => match Config::load(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        None => Config::load_or_default(),
    };

    let mut world = World::new();
    setup::insert_core_resources(&mut world, cfg, args.seed, args.dt);
    setup::demo_scene(&mut world);

    println!("Stealth Simulation");
    println!("==================");
    println!("Seed: {}", args.seed);
    println!("Ticks: {} (dt {:.2}s)", args.ticks, args.dt);
    println!();

    let mut schedule = build_schedule();
    for _ in 0..args.ticks {
        schedule.run(&mut world);
    }

    let clock = *world.resource::<SimClock>();
    println!("Simulated {} ticks ({:.1}s).", clock.tick, clock.time);

    let mut query = world.query::<(&AgentId, &Behavior, &Detection)>();
    let mut agents: Vec<_> = query
        .iter(&world)
        .map(|(id, b, d)| (id.0.clone(), b.state, d.meter()))
        .collect();
    agents.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, state, meter) in agents {
        println!("  {id}: {state:?} (meter {meter:.2})");
    }

    let log = world.resource::<EventLog>();
    println!("{} events logged.", log.len());

    if let Some(path) = &args.events_out {
        let events: Vec<_> = log.iter().collect();
        match serde_json::to_string_pretty(&events) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    eprintln!("Warning: could not write event log: {e}");
                } else {
                    println!("Event log written to {}", path.display());
                }
            }
            Err(e) => eprintln!("Warning: could not serialize event log: {e}"),
        }
    }
}
