pub mod config;
pub mod input;
pub mod logging_system;
pub mod pipeline;
pub mod shutdown;

pub use config::{Config, ConfigError, LogFormat, LogLevel, Settings};
pub use input::{forward_lines, parse_line};
pub use logging_system::{InitializationError, LoggingSystem, setup_logging};
pub use pipeline::{Shipper, ShipperStats, ShipperStatsSnapshot};
pub use shutdown::SignalHandler;

use crate::domain::ShipperError;
use crate::sender::{ClientConfig, ClsClient, LogGroupSerializer, LogSender};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct App {
    settings: Settings,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, ShipperError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let config = match Config::load(args) {
            Ok(config) => config,
            Err(ConfigError::Cli(e))
                if matches!(
                    e.kind(),
                    clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion
                ) =>
            {
                e.exit()
            }
            Err(e) => return Err(e.into()),
        };
        Self::from_config(&config)
    }

    pub fn from_config(config: &Config) -> Result<Self, ShipperError> {
        Ok(Self {
            settings: config.validate()?,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn build_client(&self) -> Result<ClsClient, ShipperError> {
        let settings = &self.settings;
        let client_config = ClientConfig {
            timeout: settings.request_timeout,
            ..ClientConfig::default()
        };

        let mut client = ClsClient::new(
            settings.region.clone(),
            settings.auth.clone(),
            settings.network,
            client_config,
        )?;
        if let Some(host) = &settings.endpoint_host {
            client.set_host(host);
        }
        Ok(client)
    }

    pub fn build_serializer(&self) -> LogGroupSerializer {
        LogGroupSerializer::new(self.settings.payload_format)
            .with_source(self.settings.source.clone())
            .with_filename(self.settings.filename.clone())
    }

    /// `abort` cuts off uploads still running once the shutdown grace expires.
    pub fn build_shipper(
        &self,
        abort: CancellationToken,
    ) -> Result<Shipper<LogGroupSerializer, LogSender>, ShipperError> {
        let sender = LogSender::new(self.build_client()?, self.settings.topic.clone())
            .with_cancellation(abort);

        Ok(Shipper::new(
            self.settings.batch.clone(),
            self.build_serializer(),
            Arc::new(sender),
        )
        .with_shutdown_grace(self.settings.shutdown_grace))
    }

    /// Ships stdin until EOF or a shutdown signal.
    pub async fn run(self) -> Result<ShipperStatsSnapshot, ShipperError> {
        let shutdown = CancellationToken::new();
        SignalHandler::new(shutdown.clone()).install()?;

        let abort = CancellationToken::new();
        let shipper = self.build_shipper(abort.clone())?;
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity);

        info!(
            "Shipping to topic {} (logset {}) in {}",
            self.settings.topic, self.settings.logset, self.settings.region
        );

        let shipper_task = tokio::spawn(shipper.run(rx, shutdown.clone()));
        let reader = BufReader::new(tokio::io::stdin());
        let input_result = forward_lines(reader, tx, shutdown.clone()).await;

        let stats = shipper_task
            .await
            .map_err(|e| ShipperError::Shutdown(format!("shipper task failed: {e}")))?;
        abort.cancel();

        match input_result {
            Ok(count) => info!("Read {} records from stdin", count),
            Err(ref e) => error!("Input failed: {}", e),
        }
        if stats.records_dropped > 0 {
            warn!("{} records were not delivered", stats.records_dropped);
        }

        input_result.map(|_| stats)
    }
}

pub async fn main() -> Result<(), ShipperError> {
    let app = match App::from_args(std::env::args_os()) {
        Ok(app) => app,
        Err(e) => {
            eprintln!("{e}");
            return Err(e);
        }
    };

    setup_logging(app.settings().log_level, app.settings().log_format)?;
    info!("Starting cls-log-shipper v{}", env!("CARGO_PKG_VERSION"));

    let stats = app.run().await.inspect_err(|e| error!("cls-log-shipper failed: {}", e))?;
    info!(
        "cls-log-shipper stopped: {} batches sent, {} failed",
        stats.batches_sent, stats.batches_failed
    );
    Ok(())
}
