//! PiCamera Thing - Entry Point
//!
//! Exposes a single camera as a Web Thing and keeps a snapshot image fresh
//! in the background.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;

use picam_thing::app::options::AppOptions;
use picam_thing::app::run::run;
use picam_thing::filesys::file::File;
use picam_thing::hardware::camera::list_cameras;
use picam_thing::hardware::create_device;
use picam_thing::logs::{init_logging, LogOptions};
use picam_thing::storage::settings::Settings;
use picam_thing::utils::version_info;

use tracing::{error, info, warn};

const DEFAULT_SETTINGS_PATH: &str = "/etc/picam-thing/settings.json";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{json}"),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    if cli_args.contains_key("list-cameras") {
        for camera in list_cameras() {
            println!("{camera}");
        }
        return ExitCode::SUCCESS;
    }

    let settings_file = File::new(
        cli_args
            .get("config")
            .map(String::as_str)
            .unwrap_or(DEFAULT_SETTINGS_PATH),
    );

    // Write a default settings file and exit
    if cli_args.contains_key("init-config") {
        if let Err(e) = settings_file.write_json(&Settings::default()).await {
            eprintln!("Unable to write {}: {e}", settings_file.path().display());
            return ExitCode::FAILURE;
        }
        println!("Wrote default settings to {}", settings_file.path().display());
        return ExitCode::SUCCESS;
    }

    let (settings, settings_missing) = if settings_file.exists().await {
        match settings_file.read_json::<Settings>().await {
            Ok(settings) => (settings, false),
            Err(e) => {
                eprintln!("Unable to read settings file: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        (Settings::default(), true)
    };
    if let Err(e) = settings.validate() {
        eprintln!("Invalid settings file {}: {e}", settings_file.path().display());
        return ExitCode::FAILURE;
    }

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level,
        stdout: settings.log.stdout,
        log_dir: settings.log.dir.clone(),
        json_format: settings.log.json,
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    if settings_missing {
        warn!(
            "Settings file {} not found, using defaults",
            settings_file.path().display()
        );
    }

    let Some(device) = create_device(settings.camera.backend, &settings.camera.device_path) else {
        error!(
            "Camera backend {:?} is not available in this build",
            settings.camera.backend
        );
        return ExitCode::FAILURE;
    };

    let options = AppOptions::from_settings(&settings);
    info!(
        "Running PiCamera Thing {} with options: {:?}",
        version.version, options
    );
    if let Err(e) = run(options, device, await_shutdown_signal()).await {
        error!("Failed to run the camera thing: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received, shutting down...");
                    }
                    _ = sigint.recv() => {
                        info!("SIGINT received, shutting down...");
                    }
                }
            }
            _ => {
                warn!("Unable to register signal handlers, falling back to Ctrl+C");
                wait_for_ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, shutting down..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    }
}
