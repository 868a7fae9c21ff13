//! DMM Player
//!
//! Usage:
//!   dmm-player songs              - List songs and bridges of the profile
//!   dmm-player check              - Validate the profile
//!   dmm-player run [--song NAME]  - Drive the engine in real time from stdin

mod command;
mod host;

use std::io::BufRead;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dmm_ale::{AudioHost, MusicEngine, MusicProfile};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rtrb::{Consumer, Producer, RingBuffer};

use command::{COMMAND_QUEUE_SIZE, HELP, PlayerCommand};
use host::LoggingHost;

const DEMO_PROFILE: &str = include_str!("../profiles/demo.json");

#[derive(Parser)]
#[command(name = "dmm-player", about = "Adaptive layered music player")]
struct Cli {
    /// Profile JSON (built-in demo library when omitted)
    #[arg(short, long, global = true)]
    profile: Option<PathBuf>,

    /// Seed for mix randomisation
    #[arg(short, long, global = true)]
    seed: Option<u64>,

    /// Engine tick in milliseconds
    #[arg(long, default_value_t = 50, global = true)]
    tick_ms: u64,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List songs and bridges
    Songs,
    /// Validate the profile
    Check,
    /// Play interactively, reading commands from stdin
    Run {
        /// Song to start with
        #[arg(long)]
        song: Option<String>,
        /// Stop after this many milliseconds
        #[arg(long)]
        for_ms: Option<u64>,
        /// Simulate a host without volume ramps
        #[arg(long)]
        no_ramp: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let profile = load_profile(cli.profile.as_deref())?;

    match cli.command {
        Commands::Songs => list_songs(&profile),
        Commands::Check => check_profile(&profile),
        Commands::Run {
            song,
            for_ms,
            no_ramp,
        } => {
            let seed = cli.seed.unwrap_or_else(rand::random);
            log::info!("Mix seed {}", seed);
            let host = LoggingHost::new(!no_ramp);
            let mut engine = profile.build_engine(host, StdRng::seed_from_u64(seed));
            run(&mut engine, song.as_deref(), cli.tick_ms, for_ms)
        }
    }
}

fn load_profile(path: Option<&std::path::Path>) -> Result<MusicProfile> {
    match path {
        Some(path) => MusicProfile::from_file(path)
            .with_context(|| format!("Failed to load profile {}", path.display())),
        None => MusicProfile::from_json(DEMO_PROFILE).context("Built-in profile is invalid"),
    }
}

fn list_songs(profile: &MusicProfile) -> Result<()> {
    let catalog = profile.to_catalog();

    println!("Songs ({}):", catalog.len());
    for song in catalog.all_songs() {
        let kind = if song.is_tiered() {
            format!("tiers 1-{}", song.max_tier())
        } else {
            "ambient".to_string()
        };
        println!(
            "  {:<24} {:>2} layers  {:<10} {:>7.1}s  key {:<3} [{}]",
            song.name,
            song.layers.len(),
            kind,
            song.duration_ms as f64 / 1000.0,
            song.key,
            song.tags.join(", ")
        );
    }

    println!("Bridges ({}):", catalog.all_bridges().len());
    for bridge in catalog.all_bridges() {
        println!(
            "  {:<32} {} -> {}  {:>5.1}s",
            bridge.name,
            bridge.start_key,
            bridge.end_key(),
            bridge.duration_ms as f64 / 1000.0
        );
    }
    Ok(())
}

fn check_profile(profile: &MusicProfile) -> Result<()> {
    match profile.validate() {
        Ok(()) => {
            println!(
                "Profile OK: {} songs, {} bridges",
                profile.song_count(),
                profile.bridge_count()
            );
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                eprintln!("  - {}", e);
            }
            bail!("Profile has {} problem(s)", errors.len())
        }
    }
}

fn run<H: AudioHost>(
    engine: &mut MusicEngine<H, StdRng>,
    song: Option<&str>,
    tick_ms: u64,
    for_ms: Option<u64>,
) -> Result<()> {
    if let Some(name) = song {
        engine.play(name)?;
    }

    let (tx, mut rx) = RingBuffer::<PlayerCommand>::new(COMMAND_QUEUE_SIZE);
    thread::Builder::new()
        .name("dmm-stdin".to_string())
        .spawn(move || read_commands(tx))
        .context("Failed to spawn stdin reader")?;

    eprintln!("{}", HELP);

    let tick = Duration::from_millis(tick_ms.max(1));
    let started = Instant::now();
    let mut advanced_ms: u64 = 0;

    loop {
        thread::sleep(tick);

        if !drain_commands(engine, &mut rx) {
            break;
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        engine.advance(elapsed_ms - advanced_ms);
        advanced_ms = elapsed_ms;

        if for_ms.is_some_and(|limit| advanced_ms >= limit) {
            log::info!("Run time of {} ms reached", advanced_ms);
            break;
        }
    }

    engine.stop();
    Ok(())
}

fn read_commands(mut tx: Producer<PlayerCommand>) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("stdin: {}", e);
                break;
            }
        };

        match PlayerCommand::parse(&line) {
            Ok(Some(command)) => {
                let quit = command == PlayerCommand::Quit;
                if tx.push(command).is_err() {
                    log::warn!("Command queue full, dropping '{}'", line.trim());
                }
                if quit {
                    return;
                }
            }
            Ok(None) => {}
            Err(e) => eprintln!("{:#}", e),
        }
    }

    if tx.push(PlayerCommand::Quit).is_err() {
        log::warn!("Command queue full at end of input");
    }
}

/// Apply queued commands; returns false once the player should exit
fn drain_commands<H: AudioHost>(
    engine: &mut MusicEngine<H, StdRng>,
    rx: &mut Consumer<PlayerCommand>,
) -> bool {
    while let Ok(command) = rx.pop() {
        log::debug!("Command {:?}", command);
        let result = match command {
            PlayerCommand::Play(name) => engine.play(&name),
            PlayerCommand::Random => engine
                .play_random()
                .map(|name| log::info!("Random pick '{}'", name)),
            PlayerCommand::Stop => {
                engine.stop();
                Ok(())
            }
            PlayerCommand::Intensity(level) => {
                engine.set_intensity(level);
                Ok(())
            }
            PlayerCommand::CombatStart => engine
                .handle_event(dmm_ale::HostEvent::CombatStarted)
                .map(|outcome| log::info!("Combat start: {:?}", outcome)),
            PlayerCommand::CombatEnd => engine
                .handle_event(dmm_ale::HostEvent::CombatEnded)
                .map(|outcome| log::info!("Combat end: {:?}", outcome)),
            PlayerCommand::Round(round) => engine
                .handle_event(dmm_ale::HostEvent::CombatUpdated { round })
                .map(|outcome| log::debug!("Round update: {:?}", outcome)),
            PlayerCommand::NowPlaying => {
                match engine.now_playing() {
                    Some(now) => {
                        println!("{} (intensity {})", now.song_name, engine.intensity());
                        for layer in &now.layers {
                            println!(
                                "  {} {:<20} {:>3}%",
                                if layer.audible { "*" } else { " " },
                                layer.name,
                                layer.gain_percent
                            );
                        }
                    }
                    None => println!("Nothing playing"),
                }
                Ok(())
            }
            PlayerCommand::Help => {
                eprintln!("{}", HELP);
                Ok(())
            }
            PlayerCommand::Quit => return false,
        };

        if let Err(e) = result {
            log::error!("{}", e);
        }
    }
    true
}
