/*
 *  main.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Arg, ArgAction, Command, value_parser};
use env_logger::Env;
use log::{error, info, warn};

#[cfg(unix)] // Only compile this block on Unix-like systems
use tokio::signal::unix::{SignalKind, signal};

use trlcd::config;
use trlcd::display::profile;
use trlcd::display::{DeviceIdentity, DeviceProfile, TransportFactory};
use trlcd::generator::{DisplayGeneratorFactory, FrameGenerator, GeneratorFactory};
use trlcd::{SessionOptions, dry_run, run_session};

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Asynchronously waits for a SIGINT, SIGTERM, or SIGHUP signal.
#[cfg(unix)]
async fn signal_handler() -> Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

fn list_devices() -> Result<()> {
    let devices = TransportFactory::list()?;
    if devices.is_empty() {
        println!("No USB devices found");
    }
    for d in devices {
        match d.profile {
            Some(p) => println!(
                "Bus {:03} Device {:03}: {}  {}  chunk {}  {}",
                d.bus, d.address, d.identity, p.name, p.chunk_size,
                if p.is_hid() { "HID" } else { "bulk" }
            ),
            None if profile::is_known_vendor(d.identity.vendor_id) => println!(
                "Bus {:03} Device {:03}: {}  (known vendor, unsupported product)",
                d.bus, d.address, d.identity
            ),
            None => println!("Bus {:03} Device {:03}: {}", d.bus, d.address, d.identity),
        }
    }
    Ok(())
}

fn forced_profile(forced: Option<DeviceIdentity>) -> Result<&'static DeviceProfile> {
    let identity = forced.ok_or_else(|| anyhow!("--profile <vid:pid> is required without a device"))?;
    Ok(profile::resolve(identity)?)
}

fn dump_frame(config_path: &Path, forced: Option<DeviceIdentity>, out: &Path) -> Result<()> {
    let profile = match forced {
        Some(_) => forced_profile(forced)?,
        None => TransportFactory::discover(None)
            .context("no panel to take the geometry from, pass --profile")?
            .profile,
    };
    let mut generator = DisplayGeneratorFactory
        .build(config_path, profile.width, profile.height)
        .with_context(|| format!("building generator from {}", config_path.display()))?;
    let frame = generator.next_frame()?;
    frame.image
        .save(out)
        .with_context(|| format!("writing {}", out.display()))?;
    info!(
        "Frame for {} written to {} (hold {} ms)",
        profile, out.display(), frame.duration.as_millis()
    );
    Ok(())
}

#[tokio::main] // Requires the `tokio` runtime with `macros` and `rt-multi-thread` features
async fn main() -> Result<()> {

    // Parse command line arguments
    let matches = Command::new(env!("CARGO_PKG_NAME")) // Use Cargo.toml name
        .version(env!("CARGO_PKG_VERSION"))
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(Arg::new("debug")
        .action(ArgAction::SetTrue)
        .long("debug")
        .short('v')
        .alias("verbose")
        .help("Enable debug log level")
        .required(false))
        .arg(Arg::new("config")
        .short('c')
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("Theme config file (searched for when omitted)")
        .required(false))
        .arg(Arg::new("list")
        .short('l')
        .long("list")
        .action(ArgAction::SetTrue)
        .help("List USB devices and matching panel profiles, then exit")
        .required(false))
        .arg(Arg::new("no-reset")
        .long("no-reset")
        .action(ArgAction::SetTrue)
        .help("Skip the USB port reset before claiming the panel")
        .required(false))
        .arg(Arg::new("profile")
        .short('p')
        .long("profile")
        .help("Force a panel profile by vid:pid (e.g. 0418:5304)")
        .required(false))
        .arg(Arg::new("dump-frame")
        .long("dump-frame")
        .value_parser(value_parser!(PathBuf))
        .help("Render one frame to a PNG file and exit")
        .required(false))
        .arg(Arg::new("dry-run")
        .long("dry-run")
        .action(ArgAction::SetTrue)
        .help("Run the full pipeline without a device (needs --profile)")
        .required(false))
        .after_help("trlcd:\
            \nStream themed frames to Thermalright cooler LCD panels\
            \n\n\tEdits to the theme file apply without a restart\
            \n\tRUST_LOG overrides the log level")
        .get_matches();

    let debug_enabled = matches.get_flag("debug");

    // Initialize the logger with the appropriate level based on debug flag
    env_logger::Builder::from_env(Env::default().default_filter_or(if debug_enabled {"debug"}else{"info"}))
        .format_timestamp_secs()
        .init();

    info!("{} panel streamer", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    if matches.get_flag("list") {
        return list_devices();
    }

    let forced = match matches.get_one::<String>("profile") {
        Some(s) => Some(DeviceIdentity::parse(s).ok_or_else(|| anyhow!("invalid --profile '{}', expected vid:pid", s))?),
        None => None,
    };

    let config_path = match matches.get_one::<PathBuf>("config") {
        Some(p) => p.clone(),
        None => config::find_config_file().context("no theme config given and none found")?,
    };
    if !config_path.exists() {
        bail!("Config file not found: {}", config_path.display());
    }
    info!("Theme config {}", config_path.display());

    if let Some(out) = matches.get_one::<PathBuf>("dump-frame") {
        return dump_frame(&config_path, forced, out);
    }

    let dry = matches.get_flag("dry-run");
    let dry_profile = if dry { Some(forced_profile(forced)?) } else { None };
    let options = SessionOptions { reset: !matches.get_flag("no-reset"), profile: forced };
    if !options.reset {
        warn!("USB reset disabled, panel state from a previous run is kept");
    }

    // stop flag shared with the blocking session
    let stop = Arc::new(AtomicBool::new(false));
    let session_stop = Arc::clone(&stop);
    let mut session = tokio::task::spawn_blocking(move || match dry_profile {
        Some(profile) => dry_run(&config_path, profile, &session_stop).map(|mock| mock.write_calls() as u64),
        None => run_session(&config_path, &options, &session_stop),
    });

    let outcome = tokio::select! {
        joined = &mut session => joined,
        signalled = signal_handler() => {
            if let Err(e) = signalled {
                error!("Signal handler failed: {}", e);
            }
            stop.store(true, Ordering::Relaxed);
            // let the in-flight frame finish before the interface goes
            session.await
        }
    };

    match outcome.context("session task panicked")? {
        Ok(count) => {
            info!("Session ended cleanly ({})", if dry { format!("{} packets", count) } else { format!("{} frames", count) });
            Ok(())
        }
        Err(e) => {
            error!("Session failed: {}", e);
            Err(e.into())
        }
    }
}
