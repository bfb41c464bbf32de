use std::path::PathBuf;
use std::ptr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use cabinet_audio::format::{self, WAVE_FORMAT_PCM};
use cabinet_audio::{
    create_backend, AudioHookConfig, BackendContext, BackendKind, DummyAudioClient, EventHandle,
    Game, HResult, StreamFlags, StreamFormat, WaveFormatEx,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let cli = Cli::parse();
    let config = cli.hook_config()?;
    if !config.enabled {
        println!("Audio hook disabled by configuration; nothing to do.");
        return Ok(());
    }

    let game = Game::new(cli.title.clone());
    game.pre_attach();
    game.attach();
    let canonical = format::install_canonical(StreamFormat::cd_quality())
        .context("failed to install the canonical stream format")?;
    game.post_attach();

    let ctx = BackendContext {
        format: canonical,
        identity: &game,
        bridge: &config.bridge,
    };
    let mut client = DummyAudioClient::new(create_backend(config.backend, &ctx));

    let outcome = match cli.command {
        Commands::Probe(args) => execute_probe(&mut client, args),
        Commands::Run(args) => execute_run(&mut client, args),
    };
    drop(client);
    game.detach();
    outcome
}

#[derive(Parser)]
#[command(author, version, about = "Host-side harness for the Cabinet audio shim")]
struct Cli {
    /// Audio hook configuration (JSON).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Override the configured backend.
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,
    /// Directory holding the sound client library.
    #[arg(long, global = true)]
    library_dir: Option<PathBuf>,
    /// Title reported to the sound client.
    #[arg(long, global = true, default_value = "CABINET")]
    title: String,
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn hook_config(&self) -> Result<AudioHookConfig> {
        let mut config = match &self.config {
            Some(path) => AudioHookConfig::load(path)?,
            None => AudioHookConfig::default(),
        };
        if let Some(backend) = self.backend {
            config.backend = backend.into();
        }
        if self.library_dir.is_some() {
            config.bridge.library_dir = self.library_dir.clone();
        }
        Ok(config)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print the format support matrix and device timing.
    Probe(ProbeArgs),
    /// Drive render cycles the way a game's audio thread would.
    Run(RunArgs),
}

#[derive(Args)]
struct ProbeArgs {
    /// Emit the report as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct RunArgs {
    /// Number of render cycles after the pre-roll buffer.
    #[arg(long, default_value_t = 200)]
    cycles: u32,
    /// Frequency of the generated test tone in Hz.
    #[arg(long, default_value_t = 440.0)]
    tone: f32,
    /// How long to wait for the buffer event before counting a stall.
    #[arg(long, default_value_t = 200)]
    wait_ms: u64,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    None,
    Bridge,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::None => BackendKind::Null,
            BackendArg::Bridge => BackendKind::Bridge,
        }
    }
}

const EXCLUSIVE: u32 = 1;
const SHARED: u32 = 0;

fn pcm(channels: u16, rate: u32, bits: u16) -> WaveFormatEx {
    let block_align = channels * (bits / 8);
    WaveFormatEx {
        format_tag: WAVE_FORMAT_PCM,
        channels,
        samples_per_sec: rate,
        avg_bytes_per_sec: rate * u32::from(block_align),
        block_align,
        bits_per_sample: bits,
        cb_size: 0,
    }
}

fn candidate_formats() -> Vec<WaveFormatEx> {
    let mut formats = Vec::new();
    for rate in [44_100, 48_000] {
        for bits in [16, 24] {
            formats.push(pcm(2, rate, bits));
        }
    }
    formats
}

#[derive(Serialize)]
struct ProbeReport {
    backend: &'static str,
    canonical: String,
    formats: Vec<FormatProbe>,
    default_period_hns: i64,
    minimum_period_hns: i64,
}

#[derive(Serialize)]
struct FormatProbe {
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    share_mode: &'static str,
    status: String,
    supported: bool,
}

fn execute_probe(client: &mut DummyAudioClient, args: ProbeArgs) -> Result<()> {
    let mut formats = Vec::new();
    for candidate in candidate_formats() {
        for (label, mode) in [("exclusive", EXCLUSIVE), ("shared", SHARED)] {
            let status = unsafe { client.is_format_supported(mode, &candidate, ptr::null_mut()) };
            formats.push(FormatProbe {
                channels: candidate.channels,
                sample_rate: candidate.samples_per_sec,
                bits_per_sample: candidate.bits_per_sample,
                share_mode: label,
                status: status.to_string(),
                supported: status == HResult::S_OK,
            });
        }
    }

    let mut default_period = 0i64;
    let mut minimum_period = 0i64;
    check(
        unsafe { client.get_device_period(&mut default_period, &mut minimum_period) },
        "device period query",
    )?;

    let report = ProbeReport {
        backend: client.backend().name(),
        canonical: client.backend().format().to_string(),
        formats,
        default_period_hns: default_period,
        minimum_period_hns: minimum_period,
    };
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Backend: {}", report.backend);
    println!("Canonical format: {}", report.canonical);
    for probe in &report.formats {
        println!(
            "  {}ch {:>6} Hz {:>2}-bit {:<9} -> {}",
            probe.channels, probe.sample_rate, probe.bits_per_sample, probe.share_mode, probe.status
        );
    }
    println!(
        "Device period: default {} / minimum {} (100 ns)",
        report.default_period_hns, report.minimum_period_hns
    );
    Ok(())
}

fn negotiate(client: &mut DummyAudioClient) -> Result<WaveFormatEx> {
    for candidate in candidate_formats() {
        let status = unsafe { client.is_format_supported(EXCLUSIVE, &candidate, ptr::null_mut()) };
        if status == HResult::S_OK {
            return Ok(candidate);
        }
    }
    bail!("backend accepted none of the candidate formats")
}

fn check(status: HResult, what: &str) -> Result<()> {
    if status.is_ok() {
        Ok(())
    } else {
        bail!("{what} failed: {status}")
    }
}

struct ToneWriter {
    phase: f32,
    step: f32,
}

impl ToneWriter {
    fn new(frequency: f32, sample_rate: u32) -> Self {
        Self {
            phase: 0.0,
            step: frequency * std::f32::consts::TAU / sample_rate as f32,
        }
    }

    /// Fills `frames` stereo 16-bit frames, or silence for other layouts.
    fn fill(&mut self, data: &mut [u8], format: &WaveFormatEx, frames: usize) {
        let (channels, bits) = (format.channels as usize, format.bits_per_sample);
        if bits != 16 {
            data.fill(0);
            return;
        }
        for frame in data.chunks_exact_mut(channels * 2).take(frames) {
            let sample = ((self.phase.sin() * 0.25) * i16::MAX as f32) as i16;
            for channel in frame.chunks_exact_mut(2) {
                channel.copy_from_slice(&sample.to_le_bytes());
            }
            self.phase = (self.phase + self.step) % std::f32::consts::TAU;
        }
    }
}

fn execute_run(client: &mut DummyAudioClient, args: RunArgs) -> Result<()> {
    let format = negotiate(client)?;

    let mut period = 0i64;
    check(
        unsafe { client.get_device_period(&mut period, ptr::null_mut()) },
        "device period query",
    )?;
    check(
        unsafe {
            client.initialize(
                EXCLUSIVE,
                StreamFlags::EVENTCALLBACK.bits(),
                period,
                period,
                &format,
                ptr::null(),
            )
        },
        "initialize",
    )?;

    let event = EventHandle::new().context("failed to create render event")?;
    let waiter = event.waiter();
    let _inert = client
        .set_event_handle(event)
        .map_err(|status| anyhow::anyhow!("set_event_handle failed: {status}"))?;

    let mut frames = 0u32;
    check(unsafe { client.get_buffer_size(&mut frames) }, "buffer size query")?;
    let rate = format.samples_per_sec;
    if frames == 0 {
        // Backends without a device queue report no buffer size; size the
        // cycle from the negotiated periodicity instead.
        let periodicity = client.session().map(|s| s.periodicity).unwrap_or(period);
        frames = ((periodicity * i64::from(rate)) / 10_000_000).max(1) as u32;
    }
    let stride = usize::from(format.block_align);
    tracing::info!(frames, period, "render loop configured");
    let mut tone = ToneWriter::new(args.tone, rate);
    let wait = Duration::from_millis(args.wait_ms);

    let mut render = |client: &mut DummyAudioClient| -> Result<()> {
        let mut data: *mut u8 = ptr::null_mut();
        check(unsafe { client.get_buffer(frames, &mut data) }, "get_buffer")?;
        let bytes = frames as usize * stride;
        let buffer = unsafe { std::slice::from_raw_parts_mut(data, bytes) };
        tone.fill(buffer, &format, frames as usize);
        check(client.release_buffer(frames, 0), "release_buffer")
    };

    // Pre-roll one buffer so the first wait has something to wake on.
    render(&mut *client)?;
    check(client.start(), "start")?;

    let started = Instant::now();
    let mut stalls = 0u32;
    for _ in 0..args.cycles {
        if !waiter.wait(Some(wait)).context("waiting on render event")? {
            stalls += 1;
        }
        waiter.reset().context("resetting render event")?;
        render(&mut *client)?;
    }
    check(client.stop(), "stop")?;

    let mut padding = 0u32;
    check(unsafe { client.get_current_padding(&mut padding) }, "padding query")?;
    println!(
        "Rendered {} cycles of {} frames on '{}' in {:.2?} ({} stalls, {} frames queued)",
        args.cycles + 1,
        frames,
        client.backend().name(),
        started.elapsed(),
        stalls,
        padding
    );
    Ok(())
}
