use std::{path::PathBuf, sync::Arc, time::Duration};

use aim_link_control_system::{
    config::AppConfig,
    externals::{
        hardware::{controller::DeviceController, HardwareModule},
        input::arming::DeviceArming,
    },
    internals::core::{
        aim_writer::{AimHandle, AimWriter},
        dispatch::FeatureDispatcher,
        toggles::WriteToggles,
    },
};
use anyhow::Result;
use tokio::signal;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, error, info, level_filters::LevelFilter, warn};

const DEFAULT_CONFIG_PATH: &str = "aim_link.toml";
const AUTODETECT_INTERVAL: Duration = Duration::from_secs(2);
const ARMING_POLL_INTERVAL: Duration = Duration::from_millis(5);
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = AppConfig::load(&config_path)?;

    let level = config.logging.level.parse::<LevelFilter>();
    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_max_level(*level.as_ref().unwrap_or(&LevelFilter::INFO))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    if level.is_err() {
        warn!("Unknown log level '{}'. Using info.", config.logging.level);
    }

    let HardwareModule { controller } = HardwareModule::initialize(config.device.clone());
    let toggles = Arc::new(WriteToggles::from(&config.writes));
    let aim_writer = AimWriter::new(toggles.clone());
    let aim = aim_writer.handle();
    // Cycles are driven by the host process layer once it attaches.
    let mut dispatcher = FeatureDispatcher::new(toggles);
    dispatcher.register(Box::new(aim_writer));
    info!("Features ready: {:?}.", dispatcher.feature_names());
    let arming = DeviceArming::new(controller.clone(), aim.clone(), config.device.aim_button);

    let tracker = TaskTracker::new();
    let token = CancellationToken::new();

    let token_clone = token.clone();
    let controller_clone = controller.clone();
    let known_port = config.device.last_port.clone();
    tracker.spawn(async move {
        task_connect_device(token_clone, controller_clone, known_port).await
    });

    let token_clone = token.clone();
    tracker.spawn(async move { task_arm_from_device(token_clone, arming).await });

    let token_clone = token.clone();
    let controller_clone = controller.clone();
    tracker.spawn(async move { task_report_status(token_clone, controller_clone, aim).await });

    let token_clone = token.clone();

    tokio::select! {
        _ = token_clone.cancelled() => {}
        res = signal::ctrl_c() => {
            match res {
                Ok(_) => {
                    token.cancel();
                },
                Err(e) => {
                    error!("Failed to listen for ctrl_c. Error: {}", e);
                    token.cancel();
                }
            };
        },
    }

    tracker.close();
    tracker.wait().await;

    let port = controller.current_port();
    let controller_clone = controller.clone();
    tokio::task::spawn_blocking(move || controller_clone.disconnect()).await?;

    if port.is_some() && port != config.device.last_port {
        config.device.last_port = port;
        match config.save(&config_path) {
            Ok(_) => info!("Remembered port in {}.", config_path.display()),
            Err(e) => warn!("Failed to save config. Error: {}", e),
        }
    }

    Ok(())
}

/// Keep a device connected, retrying autodetect until cancelled.
#[tracing::instrument(skip_all)]
async fn task_connect_device(
    token: CancellationToken,
    controller: Arc<DeviceController>,
    known_port: Option<String>,
) {
    info!("Started.");
    let mut was_connected = false;
    loop {
        let controller_clone = controller.clone();
        let port = known_port.clone();
        let connected =
            match tokio::task::spawn_blocking(move || controller_clone.autodetect(port.as_deref()))
                .await
            {
                Ok(connected) => connected,
                Err(e) => {
                    error!("Autodetect task failed. Error: {}", e);
                    false
                }
            };
        if connected && !was_connected {
            info!("Device ready. {}", controller.status());
        } else if !connected {
            debug!("No device yet. Retrying.");
        }
        was_connected = connected;

        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            }
            _ = tokio::time::sleep(AUTODETECT_INTERVAL) => {}
        }
    }
}

#[tracing::instrument(skip_all)]
async fn task_arm_from_device(token: CancellationToken, mut arming: DeviceArming) {
    info!("Started. Aim button is {}.", arming.button());
    loop {
        arming.poll();
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            }
            _ = tokio::time::sleep(ARMING_POLL_INTERVAL) => {}
        }
    }
}

#[tracing::instrument(skip_all)]
async fn task_report_status(
    token: CancellationToken,
    controller: Arc<DeviceController>,
    aim: AimHandle,
) {
    info!("Started.");
    loop {
        tokio::select! {
            _ = token.cancelled() => {
                warn!("Cancelled.");
                break;
            }
            _ = tokio::time::sleep(STATUS_INTERVAL) => {
                let engaged = aim.snapshot().is_engaged();
                info!("{} aim:{}", controller.status(), if engaged { "engaged" } else { "idle" });
            }
        }
    }
}
