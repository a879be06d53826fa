// src/main.rs

use anyhow::Context;
use crossterm::{
    cursor::MoveToColumn,
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{Clear, ClearType, disable_raw_mode, enable_raw_mode},
};
use std::io::{Write, stdout};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

use voice_studio::capture::{CpalBackend, SimulatedMicrophone};
use voice_studio::encode::PcmEncoderFactory;
use voice_studio::project::{InMemoryRepository, ProjectId, UserId};
use voice_studio::recorder::RecorderState;
use voice_studio::transport::{AudioOutput, SystemClock};
use voice_studio::{EffectChain, RawAudioBlob, Studio, StudioConfig};

struct Args {
    simulate: bool,
    chain: EffectChain,
    out_dir: PathBuf,
    config: Option<PathBuf>,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        simulate: false,
        chain: EffectChain::new(),
        out_dir: PathBuf::from("."),
        config: None,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--simulate" => args.simulate = true,
            "--fx" => {
                let list = it.next().context("--fx needs a list, e.g. eq,comp,reverb")?;
                args.chain = list.parse().map_err(anyhow::Error::msg)?;
            }
            "--out" => args.out_dir = PathBuf::from(it.next().context("--out needs a directory")?),
            "--config" => args.config = Some(PathBuf::from(it.next().context("--config needs a path")?)),
            other => anyhow::bail!("unknown argument {other:?}"),
        }
    }
    Ok(args)
}

fn extension_for(blob: &RawAudioBlob) -> &'static str {
    match blob.essence() {
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/mp4" => "m4a",
        _ => "wav",
    }
}

const SKIP_SECS: f64 = 5.0;

fn meter(level: f32, width: usize) -> String {
    let filled = ((level.clamp(0.0, 1.0) * width as f32).round() as usize).min(width);
    format!("{}{}", "#".repeat(filled), "-".repeat(width - filled))
}

/// Prints a line in raw mode, where `\n` alone does not return the carriage.
fn say(msg: impl AsRef<str>) -> std::io::Result<()> {
    let mut out = stdout();
    execute!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    write!(out, "{}\r\n", msg.as_ref())?;
    out.flush()
}

fn clock(secs: f64) -> String {
    let whole = secs.max(0.0) as u64;
    format!("{:02}:{:02}", whole / 60, whole % 60)
}

async fn finish_take(
    studio: &mut Studio<InMemoryRepository>,
    take: &mut u32,
    out_dir: &Path,
) -> anyhow::Result<()> {
    let finished = match studio.finish_recording().await {
        Ok(Some(f)) => f,
        Ok(None) => {
            say("Nothing is recording.")?;
            return Ok(());
        }
        Err(e) => {
            say(e.user_message())?;
            return Ok(());
        }
    };
    *take += 1;

    let raw_path = out_dir.join(format!("take-{take}.{}", extension_for(&finished.blob)));
    std::fs::write(&raw_path, finished.blob.bytes())
        .with_context(|| format!("writing {}", raw_path.display()))?;
    say(format!(
        "Saved {} ({:.2}s, {})",
        raw_path.display(),
        finished.duration,
        finished.blob.mime()
    ))?;

    if !studio.effect_chain().is_empty() {
        match studio.render_effects(&finished.blob).await {
            Ok(rendered) => {
                let fx_path = out_dir.join(format!("take-{take}-fx.wav"));
                std::fs::write(&fx_path, rendered.bytes())
                    .with_context(|| format!("writing {}", fx_path.display()))?;
                say(format!("Saved {}", fx_path.display()))?;
            }
            Err(e) => say(e.user_message())?,
        }
    }

    match studio
        .create_track_from_blob(finished.blob, format!("Take {take}"))
        .await
    {
        Ok(track) => say(format!(
            "Track {} added at position {} ({} in project)",
            track.name,
            track.track_order,
            studio.transport().track_count()
        ))?,
        Err(e) => say(e.user_message())?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => StudioConfig::load_from_disk(path)?,
        None => StudioConfig::default(),
    };
    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("creating {}", args.out_dir.display()))?;

    let simulated = args.simulate.then(|| SimulatedMicrophone::new(48_000, 1));
    let capture: Box<dyn voice_studio::capture::CaptureBackend> = match &simulated {
        Some(mic) => Box::new(mic.clone()),
        None => Box::new(CpalBackend),
    };
    let repository = InMemoryRepository::new(config.max_tracks_per_project);
    let chunk_interval = config.chunk_interval();
    let tick = config.elapsed_tick();

    let mut studio = Studio::new(
        config,
        ProjectId::new(),
        UserId::new(),
        capture,
        Box::new(PcmEncoderFactory),
        repository,
        Arc::new(SystemClock::new()),
    );
    studio.set_effect_chain(args.chain);

    // The stream plays for as long as this stays alive.
    let _output = match AudioOutput::open_default() {
        Ok(output) => {
            studio.set_output(output.mixer());
            Some(output)
        }
        Err(e) => {
            tracing::warn!(error = %e, "playback will follow the clock silently");
            None
        }
    };

    let status = studio.recorder_mut().check_permissions();
    println!("Microphone permission: {status}");
    println!("[R] Record | [P] Pause/Resume | [S] Stop & save | [X] Reset | [Q] Quit");
    println!("[Space] Play/Pause tracks | [Left/Right] -/+5s | [Home] Rewind");

    enable_raw_mode()?;

    // ~60 Hz display refresh
    let frame = Duration::from_millis(16);
    let mut last_chunk = Instant::now();
    let mut last_second = Instant::now();
    let mut last_feed = Instant::now();
    let mut take = 0u32;

    let result: anyhow::Result<()> = async {
        loop {
            if event::poll(frame)? {
                if let Event::Key(ev) = event::read()? {
                    if ev.kind != KeyEventKind::Press {
                        continue;
                    }
                    if ev.code == KeyCode::Char('c') && ev.modifiers.contains(KeyModifiers::CONTROL) {
                        break;
                    }
                    match ev.code {
                        KeyCode::Char('q') | KeyCode::Char('Q') => break,
                        KeyCode::Char('r') | KeyCode::Char('R') => match studio.recorder_mut().start() {
                            Ok(()) => {
                                last_chunk = Instant::now();
                                last_second = Instant::now();
                                last_feed = Instant::now();
                                say("Recording...")?;
                            }
                            Err(e) => say(e.user_message())?,
                        },
                        KeyCode::Char('p') | KeyCode::Char('P') => {
                            let recorder = studio.recorder_mut();
                            let outcome = match recorder.state() {
                                RecorderState::Paused => recorder.resume(),
                                _ => recorder.pause(),
                            };
                            if let Err(e) = outcome {
                                say(e.user_message())?;
                            }
                        }
                        KeyCode::Char('s') | KeyCode::Char('S') => {
                            finish_take(&mut studio, &mut take, &args.out_dir).await?;
                        }
                        KeyCode::Char('x') | KeyCode::Char('X') => {
                            studio.recorder_mut().reset();
                            say("Recording discarded.")?;
                        }
                        KeyCode::Char(' ') => {
                            if studio.transport().is_playing() {
                                studio.pause();
                            } else if studio.transport().track_count() == 0 {
                                say("No tracks to play yet.")?;
                            } else {
                                studio.play();
                            }
                        }
                        KeyCode::Left => {
                            studio.skip(-SKIP_SECS);
                        }
                        KeyCode::Right => {
                            studio.skip(SKIP_SECS);
                        }
                        KeyCode::Home => {
                            studio.seek(0.0);
                        }
                        _ => {}
                    }
                }
            }

            if let Some(mic) = &simulated {
                let elapsed = last_feed.elapsed();
                last_feed = Instant::now();
                mic.feed_tone(220.0, 0.4, elapsed.as_secs_f64());
            }

            let snap = studio.tick();
            let recorder = studio.recorder_mut();
            if last_chunk.elapsed() >= chunk_interval {
                last_chunk = Instant::now();
                if let Err(e) = recorder.on_chunk_interval() {
                    say(e.user_message())?;
                }
            }
            if last_second.elapsed() >= tick {
                last_second = Instant::now();
                recorder.on_second();
            }
            if let Some(level) = recorder.on_frame() {
                let secs = recorder.session().elapsed_seconds;
                let mut out = stdout();
                execute!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
                write!(out, "REC {:02}:{:02} [{}]", secs / 60, secs % 60, meter(level, 40))?;
                out.flush()?;
            } else if snap.is_playing {
                let mut out = stdout();
                execute!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
                write!(out, "PLAY {} / {}", clock(snap.current_time), clock(snap.duration))?;
                out.flush()?;
            }
        }
        Ok(())
    }
    .await;

    disable_raw_mode()?;
    println!("\nExiting studio.");
    result
}
