//! CLI handlers that inject one signal into a loopback session.

use anyhow::{Context, Result};
use hound::{WavSpec, WavWriter};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::app::{OutboundPump, Runtime};
use crate::audio::{MicrophoneSource, Signal, SignalOrigin, MELODY_NOTES_HZ};
use crate::cli::args::SessionArgs;
use crate::conference::{SignalSink, StatusReporter};

/// Which signal a session command injects.
#[derive(Debug, Clone)]
pub enum Injection {
    Tone { frequency: f64 },
    Melody { notes: Vec<f64>, hold_ms: Option<u64> },
    Play { url: String },
    Mic,
}

pub async fn handle_session_command(
    runtime: Runtime,
    injection: Injection,
    args: SessionArgs,
) -> Result<()> {
    let signal = open_signal(&runtime, injection).await?;
    let finite = signal.origin() == SignalOrigin::Remote;

    let pump = OutboundPump::spawn(runtime.session.clone(), args.output.is_some());

    let track = SignalSink::new().capture(&signal)?;
    let attachment = runtime.bridge.attach(track).await?;
    drop(signal);

    let status = StatusReporter::new(&runtime.bridge).status();
    println!("{}", serde_json::to_string_pretty(&status)?);

    info!(
        "Attachment {} live for up to {}s",
        attachment.id, args.duration
    );
    wait_for(&runtime, Duration::from_secs(args.duration), finite).await;

    let detached = runtime.bridge.detach_all().await;
    info!("Detached {} track(s)", detached);

    let recorded = pump.finish().await;
    if let Some(path) = &args.output {
        write_wav(path, &recorded, runtime.session.options().sample_rate)?;
        println!("Wrote outbound mix to {}", path.display());
    }

    Ok(())
}

async fn open_signal(runtime: &Runtime, injection: Injection) -> Result<Signal> {
    let signal = match injection {
        Injection::Tone { frequency } => runtime.tone.constant(frequency)?,
        Injection::Melody { notes, hold_ms } => {
            let notes = if notes.is_empty() {
                MELODY_NOTES_HZ.to_vec()
            } else {
                notes
            };
            let hold_ms = hold_ms.unwrap_or(runtime.config.tone.melody_hold_ms);
            runtime.tone.melody(&notes, hold_ms)?
        }
        Injection::Play { url } => runtime
            .remote
            .fetch(&url)
            .await
            .context("Failed to load remote audio")?,
        Injection::Mic => MicrophoneSource::new(runtime.session.options().sample_rate).open()?,
    };
    Ok(signal)
}

/// Sleep for `duration`, or until the session has played everything out when
/// the injected audio is finite. Ctrl-C ends the wait early.
async fn wait_for(runtime: &Runtime, duration: Duration, finite: bool) {
    let deadline = tokio::time::Instant::now() + duration;
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => break,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = ticker.tick() => {
                if finite && runtime.session.is_drained() {
                    info!("Remote audio finished");
                    break;
                }
            }
        }
    }
}

fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    info!("Outbound mix saved: {:?} ({} samples)", path, samples.len());
    Ok(())
}
