mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppConfig, StartupConfig};
use sdcam_core::{CommandQueue, LoopbackTransport, Transport, UdpTransport, WordOrder};
use sdcam_video::{display_queue, Acquisition, TestPattern};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Parser)]
#[command(name = "sdcam", version, about = "Camera front end controller")]
struct Args {
    /// JSON config file (default: <config dir>/sdcam/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stop after this many frames have been displayed
    #[arg(short, long)]
    frames: Option<u64>,

    /// Use the in-process emulated device
    #[arg(long)]
    loopback: bool,

    /// Print the default configuration as JSON and exit
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.write_default_config {
        println!("{}", serde_json::to_string_pretty(&AppConfig::default())?);
        return Ok(());
    }

    let mut config = AppConfig::load(args.config.as_deref())?;
    config.device.loopback |= args.loopback;

    let transport = open_transport(&config)?;
    let (commands, worker) = CommandQueue::spawn(transport)?;
    apply_startup(&commands, &config.startup)?;

    log::info!("start video frame thread");
    let (display, frames) = display_queue(config.video.display_capacity);
    let source = TestPattern::new(
        config.video.width,
        config.video.height,
        Duration::from_millis(config.video.frame_period_ms),
    );
    let acquisition = Acquisition::spawn(source, display, config.video.acquisition.clone())?;

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = Arc::clone(&running);
        ctrlc::set_handler(move || {
            log::info!("Received shutdown signal");
            running.store(false, Ordering::Relaxed);
        })
        .context("setting Ctrl-C handler")?;
    }

    let mut shown = 0u64;
    while running.load(Ordering::Relaxed) {
        let Some(frame) = frames.take_timeout(Duration::from_millis(100)) else {
            continue;
        };
        shown += 1;
        log::debug!("frame {shown}: {}x{} mean {:.1}", frame.width, frame.height, frame.mean());
        if args.frames.is_some_and(|limit| shown >= limit) {
            break;
        }
    }

    log::info!("sdcam finishing...");
    acquisition.request_stop();
    let stats = acquisition.join()?;
    log::info!(
        "displayed {shown} frames ({} published, {} dropped)",
        stats.published,
        stats.dropped
    );

    log::debug!("register traffic:\n{}", commands.trace().lock().to_text(true));
    drop(commands);
    worker.join();
    log::info!("sdcam has finished");
    Ok(())
}

fn open_transport(config: &AppConfig) -> Result<Box<dyn Transport>> {
    let device = &config.device;
    if device.loopback {
        log::info!("using emulated device");
        return Ok(Box::new(LoopbackTransport::new()));
    }

    let remote: SocketAddr = device.remote.parse().with_context(|| format!("device address {}", device.remote))?;
    let local: SocketAddr = device.local.parse().with_context(|| format!("local address {}", device.local))?;
    let order: WordOrder = device
        .word_order
        .parse()
        .map_err(|_| anyhow::anyhow!("unknown word order {:?}", device.word_order))?;
    let transport = UdpTransport::connect(local, remote, Duration::from_millis(device.timeout_ms), order)?;
    Ok(Box::new(transport))
}

/// Queue the configured register writes; with `verify`, read each one back.
fn apply_startup(commands: &CommandQueue, startup: &StartupConfig) -> Result<()> {
    for w in &startup.registers {
        commands.write_register(w.address, w.value)?;
    }
    for w in &startup.camera {
        commands.write_camera_register(w.address, w.value)?;
    }
    if !startup.verify {
        return Ok(());
    }

    let mut mismatches = 0;
    for (w, camera) in startup
        .registers
        .iter()
        .map(|w| (w, false))
        .chain(startup.camera.iter().map(|w| (w, true)))
    {
        let reply = if camera {
            commands.read_camera_register(w.address)?
        } else {
            commands.read_register(w.address)?
        };
        match reply.wait() {
            Ok(value) if value == w.value => {}
            Ok(value) => {
                mismatches += 1;
                log::warn!("{:#06x} reads back {value:#06x}, wrote {:#06x}", w.address, w.value);
            }
            Err(e) => {
                mismatches += 1;
                log::warn!("{:#06x} read back failed: {e}", w.address);
            }
        }
    }
    if mismatches == 0 {
        log::info!("startup registers verified");
    }
    Ok(())
}
