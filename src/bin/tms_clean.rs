/// tms-clean: remove TMS pulse artifacts from a continuous recording.
///
/// Reads `raw.safetensors` (`data [C, T]`, `sfreq`, `events [n, 3]`), cuts
/// the window around every pulse of the chosen event code on every channel,
/// refills it by cubic interpolation and writes:
///
///   data      [C, T]   f64  corrected signal
///   sfreq     [1]      f64
///   onsets    [n]      i64  pulse onsets that were interpolated
///   window    [2]      i64  sample offsets (start, end) around each onset
///   ch_names  bytes         copied through when present
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use icapp::{
    io::{RawData, StWriter},
    ArtifactConfig, ArtifactRemovalPass, BoundaryPolicy, OnsetSet,
};

#[derive(Parser, Debug)]
#[command(name = "tms-clean", about = "TMS pulse-artifact removal by cubic interpolation")]
struct Args {
    /// raw.safetensors with data, sfreq and events
    #[arg(long)]
    input: PathBuf,

    /// Output safetensors path
    #[arg(long)]
    output: PathBuf,

    /// Window start relative to the pulse, in seconds
    #[arg(long, default_value_t = -0.002, allow_negative_numbers = true)]
    tmin: f64,

    /// Window end relative to the pulse, in seconds
    #[arg(long, default_value_t = 0.01, allow_negative_numbers = true)]
    tmax: f64,

    /// Event code marking a pulse
    #[arg(long, default_value_t = 1128)]
    event_code: i64,

    /// Fit nodes: 'flanking' (two samples per side) or 'all' (spline over every sample)
    #[arg(long, default_value_t = BoundaryPolicy::FlankingPairs)]
    boundary: BoundaryPolicy,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let raw = RawData::load(&args.input)?;
    info!("loaded {} ch × {} samples @ {} Hz", raw.data.nrows(), raw.data.ncols(), raw.sfreq);

    let cfg = ArtifactConfig {
        tmin: args.tmin,
        tmax: args.tmax,
        boundary: args.boundary,
        event_code: args.event_code,
    };

    let events = raw.events.as_ref().context("input has no 'events' tensor")?;
    let onsets = OnsetSet::from_events(events, cfg.event_code);
    if onsets.is_empty() {
        bail!("no events with code {} in {}", cfg.event_code, args.input.display());
    }
    let window = cfg.window(raw.sfreq);
    info!(
        "{} pulse(s) with code {}, window [{}, {}] samples",
        onsets.len(),
        cfg.event_code,
        window.start,
        window.end
    );

    let clean = ArtifactRemovalPass::new(window, cfg.boundary)
        .run(&raw.data, &onsets)
        .context("artifact removal failed")?;

    let onset_vals: Vec<i64> = onsets.iter().map(|o| o as i64).collect();
    let mut w = StWriter::new();
    w.add_f64_arr2("data", &clean);
    w.add_f64("sfreq", &[raw.sfreq], &[1]);
    w.add_i64("onsets", &onset_vals, &[onset_vals.len()]);
    w.add_i64("window", &[window.start as i64, window.end as i64], &[2]);
    if !raw.ch_names.is_empty() {
        w.add_bytes("ch_names", raw.ch_names.join("\n").as_bytes());
    }
    w.write(&args.output)?;
    info!("written → {}", args.output.display());

    Ok(())
}
