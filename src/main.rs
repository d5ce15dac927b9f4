use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use robolink::actuator::ActuatorServer;
use robolink::config::AppConfig;
use robolink::controller::{ControllerHandle, HostCommand, StatusDisplay, StatusTone};
use robolink::link::{ChannelStatus, ResilientChannel, WsConnector};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

const DRAIN_LIMIT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "robolink", version, about = "Real-time remote control link for a robot")]
struct Cli {
    /// Configuration file, created with defaults when the default path is missing
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Drive the robot from pointer events read on stdin
    Control {
        /// WebSocket url of the robot
        #[arg(long)]
        url: Option<String>,
    },
    /// Run the robot-side command receiver
    Actuator {
        /// Address to listen on
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let mut config = load_config(cli.config).await?;
    config.apply_env_overrides();

    match cli.command {
        Command::Control { url } => {
            config.apply_cli_overrides(url, None);
            config.validate()?;
            run_control(config).await
        }
        Command::Actuator { bind } => {
            config.apply_cli_overrides(None, bind);
            config.validate()?;
            run_actuator(config).await
        }
    }
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();
}

async fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let path = match path {
        Some(path) => path,
        None => {
            let path = AppConfig::default_path();
            AppConfig::ensure_default(&path).await?;
            path
        }
    };
    let config = AppConfig::load(&path).await?;
    info!("Loaded configuration from {}", path.display());
    debug!("Configuration: {:?}", config);
    Ok(config)
}

async fn run_control(config: AppConfig) -> Result<()> {
    let channel = ResilientChannel::spawn(
        config.connection.url.clone(),
        config.channel_settings(),
        Arc::new(WsConnector),
    );
    let controller = ControllerHandle::spawn(Some(config.controller_settings()), channel.sender())
        .map_err(|e| eyre!("Failed to spawn controller: {}", e))?;

    let status_logger = tokio::spawn(log_status(channel.subscribe()));

    // Scripted input must not race the first connect
    let mut status = channel.subscribe();
    info!("Waiting for the robot link before reading input");
    let interrupted = tokio::select! {
        settled = status.wait_for(|s| s.connected || s.is_terminal()) => {
            settled.map_err(|e| eyre!("Robot link stopped: {}", e))?;
            false
        }
        _ = tokio::signal::ctrl_c() => true,
    };

    let result = if interrupted {
        info!("Interrupted");
        Ok(())
    } else {
        read_commands(&controller).await
    };

    match tokio::time::timeout(DRAIN_LIMIT, controller.drain()).await {
        Ok(Ok(())) => debug!("Controls back at rest"),
        Ok(Err(e)) => warn!("Could not drain controls: {}", e),
        Err(_) => warn!("Controls did not settle within {:?}", DRAIN_LIMIT),
    }
    info!("Final controls: {}", controller.snapshot());
    controller.shutdown().await;
    channel.shutdown().await;
    status_logger.abort();
    result
}

async fn read_commands(controller: &ControllerHandle) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        };
        let Some(line) = line else {
            info!("Input closed");
            return Ok(());
        };

        match HostCommand::parse(&line) {
            Ok(None) => {}
            Ok(Some(HostCommand::Quit)) => return Ok(()),
            Ok(Some(HostCommand::Disconnect)) => controller.disconnect(),
            Ok(Some(HostCommand::Reconnect)) => controller.reconnect(),
            Ok(Some(HostCommand::Resize { control, surface })) => {
                controller.resize(control, surface).await?;
            }
            Ok(Some(HostCommand::Pointer { control, event })) => {
                controller.pointer(control, event).await?;
                debug!("{}", controller.snapshot());
            }
            Err(e) => warn!("Skipping line '{}': {}", line, e),
        }
    }
}

async fn log_status(mut status: watch::Receiver<ChannelStatus>) {
    loop {
        let shown = StatusDisplay::from(&*status.borrow_and_update());
        match shown.tone {
            StatusTone::Connected => info!("Status: {}", shown),
            StatusTone::Reconnecting => warn!("Status: {}", shown),
            StatusTone::Disconnected => {
                warn!("Status: {} (type 'reconnect' to retry)", shown)
            }
        }
        if status.changed().await.is_err() {
            break;
        }
    }
}

async fn run_actuator(config: AppConfig) -> Result<()> {
    let server = ActuatorServer::bind(&config.actuator.bind).await?;
    let mut state = server.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state.changed() => {
                if changed.is_err() {
                    error!("Actuator state channel closed");
                    break;
                }
                debug!("Actuator state: {}", *state.borrow_and_update());
            }
        }
    }

    server.shutdown().await;
    Ok(())
}
