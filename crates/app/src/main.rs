use std::{
    fs::File,
    io::{self, Read},
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use aether_core::{
    AetherConfig, Band, BandAnalyzer, EventSink, EventSource, QueryClient, SmoothedLevels,
};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

const BAR_WIDTH: usize = 40;

fn main() -> aether_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AetherConfig::load(path)?,
        None => AetherConfig::default(),
    };

    match cli.command {
        Commands::Daemon { input } => run_daemon(&config, input.as_deref()),
        Commands::Query { band, json, bars } => run_query(&config, band.as_deref(), json, bars),
        Commands::Monitor { frames, policy } => run_monitor(&config, frames, policy),
    }
}

fn run_daemon(config: &AetherConfig, input: Option<&Path>) -> aether_core::Result<()> {
    let mut analyzer = BandAnalyzer::new(config.analysis.clone())?;
    let mut sink = EventSink::new(&config.channel);
    tracing::info!(
        sample_rate = analyzer.config().sample_rate,
        chunk_size = analyzer.frame_len(),
        shared = sink.is_shared(),
        path = %sink.active_path().display(),
        "daemon started"
    );

    let mut reader: Box<dyn Read> = match input {
        Some(path) => Box::new(File::open(path)?),
        None => Box::new(io::stdin().lock()),
    };

    let mut raw = vec![0u8; analyzer.frame_len() * 2];
    let mut frame = vec![0i16; analyzer.frame_len()];
    let mut published = 0u64;

    loop {
        match reader.read_exact(&mut raw) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(err.into()),
        }
        for (sample, bytes) in frame.iter_mut().zip(raw.chunks_exact(2)) {
            *sample = i16::from_ne_bytes([bytes[0], bytes[1]]);
        }

        if let Some(event) = analyzer.analyze(&frame)? {
            if sink.publish(&event) {
                published += 1;
            }
            tracing::trace!(
                total = event.total(),
                dominant = %event.dominant_band().0,
                "published"
            );
        }
    }

    tracing::info!(published, "end of audio stream");
    Ok(())
}

fn run_query(
    config: &AetherConfig,
    band: Option<&str>,
    json: bool,
    bars: bool,
) -> aether_core::Result<()> {
    let mut client = QueryClient::new(&config.channel);
    if !client.is_available() {
        tracing::warn!(
            path = %client.source().active_path().display(),
            "aether daemon not running, reading fallback file"
        );
    }

    if let Some(name) = band {
        println!("{:.3}", client.band(name));
        return Ok(());
    }

    let Some(levels) = client.bands() else {
        if json {
            println!("{{}}");
        } else {
            println!("No audio data available");
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&levels)?);
        return Ok(());
    }

    let rows = Band::ALL
        .into_iter()
        .map(|band| (band.as_str(), levels.get(band)))
        .chain(std::iter::once(("total", levels.total)));
    for (name, value) in rows {
        if bars {
            println!("{name:12}: {} {value:.3}", bar(value));
        } else {
            println!("{name}: {value:.3}");
        }
    }
    Ok(())
}

fn run_monitor(config: &AetherConfig, frames: Option<u64>, policy: Policy) -> aether_core::Result<()> {
    let mut source = EventSource::new(&config.channel);
    let mut levels = match policy {
        Policy::Visualizer => SmoothedLevels::visualizer(&config.smoothing),
        Policy::Lighting => SmoothedLevels::lighting(&config.smoothing),
    };
    let frame_time = Duration::from_secs_f64(1.0 / f64::from(config.smoothing.fps.max(1)));
    tracing::info!(
        ?policy,
        shared = source.is_available(),
        path = %source.active_path().display(),
        "monitoring"
    );

    let mut frame = 0u64;
    while frames.map_or(true, |limit| frame < limit) {
        let started = Instant::now();
        if !source.is_available() && source.reconnect() {
            tracing::info!(path = %source.active_path().display(), "shared region connected");
        }

        let event = source.poll();
        let snapshot = levels.frame(event.as_ref());
        println!(
            "amp {} {:.2} | low {:.2} mid {:.2} high {:.2}",
            bar(snapshot.amplitude),
            snapshot.amplitude,
            snapshot.low,
            snapshot.mid,
            snapshot.high
        );

        frame += 1;
        thread::sleep(frame_time.saturating_sub(started.elapsed()));
    }

    let stats = source.stats();
    tracing::info!(
        polls = stats.polls,
        channel_hits = stats.channel_hits,
        fallback_hits = stats.fallback_hits,
        hit_rate = stats.channel_hit_rate(),
        "monitor stopped"
    );
    Ok(())
}

fn bar(value: f32) -> String {
    let filled = ((value.clamp(0.0, 1.0) * BAR_WIDTH as f32) as usize).min(BAR_WIDTH);
    format!("{}{}", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Live audio band analysis over shared memory", long_about = None)]
struct Cli {
    /// JSON configuration file; defaults apply to anything it leaves out.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Analyse raw s16 mono PCM and publish band events.
    Daemon {
        /// Read PCM from this file instead of stdin.
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Print the current band levels once.
    Query {
        /// Print only this band (or `total`).
        #[arg(short, long, conflicts_with_all = ["json", "bars"])]
        band: Option<String>,
        /// Print all levels as JSON.
        #[arg(long)]
        json: bool,
        /// Print all levels as bars.
        #[arg(long)]
        bars: bool,
    },
    /// Follow the smoothed levels at the configured frame rate.
    Monitor {
        /// Stop after this many frames.
        #[arg(short, long)]
        frames: Option<u64>,
        /// Decay behaviour to emulate.
        #[arg(short, long, value_enum, default_value_t = Policy::Visualizer)]
        policy: Policy,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Decay after every frame.
    Visualizer,
    /// Hold through short gaps, then decay.
    Lighting,
}
