use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use ebur128::{EbuR128, Mode};
use hound::{SampleFormat, WavReader, WavWriter};

use autoleveler::dsp::utils::{frame_peak, frame_rms, lin_to_db};
use autoleveler::{LevelerChain, LevelerConfig, LevelerPreset, MAX_CHANNELS};

const USAGE: &str = "usage: wav_leveler <input.wav> <output.wav> [preset|config.json]";

// Frames handed to the chain per call, the way a player callback would.
const BLOCK_FRAMES: usize = 1024;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let input = args.next().map(PathBuf::from).context(USAGE)?;
    let output = args.next().map(PathBuf::from).context(USAGE)?;
    let config = match args.next() {
        Some(arg) => load_config(&arg)?,
        None => LevelerConfig::default(),
    };

    let reader = WavReader::open(&input)
        .with_context(|| format!("failed to open input WAV '{}'", input.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        anyhow::bail!("input WAV reports zero channels");
    }
    if config.auto_volume_enabled && channels > MAX_CHANNELS {
        anyhow::bail!(
            "auto-volume handles at most {} channels, input has {}",
            MAX_CHANNELS,
            channels
        );
    }

    let mut samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Int, 16) => reader
            .into_samples::<i16>()
            .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
            .collect::<Result<_, _>>()
            .context("failed to read samples")?,
        (SampleFormat::Float, 32) => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .context("failed to read samples")?,
        _ => anyhow::bail!("only 16-bit integer and 32-bit float WAV files are supported"),
    };
    let total_frames = samples.len() / channels;
    samples.truncate(total_frames * channels);

    let input_peak = frame_peak(&samples);
    let input_rms = frame_rms(&samples);
    let input_lufs = integrated_lufs(&samples, spec.channels as u32, spec.sample_rate)?;

    let mut chain = LevelerChain::new(&config);
    let mut frames_done = 0usize;
    for block in samples.chunks_mut(BLOCK_FRAMES * channels) {
        let frames = block.len() / channels;
        frames_done += chain.process(block, frames, channels);
    }

    let output_peak = frame_peak(&samples);
    let output_rms = frame_rms(&samples);
    let output_lufs = integrated_lufs(&samples, spec.channels as u32, spec.sample_rate)?;

    let mut writer = WavWriter::create(&output, spec)
        .with_context(|| format!("failed to create output WAV '{}'", output.display()))?;
    match spec.sample_format {
        SampleFormat::Int => {
            for &s in &samples {
                writer.write_sample((s * i16::MAX as f32).round() as i16)?;
            }
        }
        SampleFormat::Float => {
            for &s in &samples {
                writer.write_sample(s)?;
            }
        }
    }
    writer
        .finalize()
        .with_context(|| format!("failed to finalize '{}'", output.display()))?;

    println!("Leveling summary for '{}':", input.display());
    println!("  frames processed : {} of {}", frames_done, total_frames);
    println!("  input loudness   : {:.1} LUFS", input_lufs);
    println!("  output loudness  : {:.1} LUFS", output_lufs);
    println!("  input peak / rms : {:.1} / {:.1} dBFS", lin_to_db(input_peak), lin_to_db(input_rms));
    println!("  output peak / rms: {:.1} / {:.1} dBFS", lin_to_db(output_peak), lin_to_db(output_rms));
    println!("  normalizer gain  : x{:.3}", chain.normalizer.gain_factor());
    println!("  auto-volume gain : x{:.3}", chain.auto_volume.current_gain());
    Ok(())
}

/// Third argument: a preset name first, else a JSON `LevelerConfig` file.
fn load_config(arg: &str) -> Result<LevelerConfig> {
    if let Some(preset) = LevelerPreset::from_name(arg) {
        return preset
            .config()
            .with_context(|| format!("preset '{}' has no fixed configuration", arg));
    }
    let file = File::open(arg)
        .with_context(|| format!("no preset named '{}' and no config file at that path", arg))?;
    let config = serde_json::from_reader(&file)
        .with_context(|| format!("failed to parse config file '{}'", arg))?;
    Ok(config)
}

fn integrated_lufs(samples: &[f32], channels: u32, sample_rate: u32) -> Result<f64> {
    let mut meter =
        EbuR128::new(channels, sample_rate, Mode::I).context("failed to create loudness meter")?;
    meter
        .add_frames_f32(samples)
        .context("failed to feed loudness meter")?;
    let lufs = meter
        .loudness_global()
        .context("failed to compute integrated loudness")?;
    Ok(lufs)
}
