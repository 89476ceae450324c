//! Logging initialization and shutdown with optional OpenTelemetry export.

use std::{path::PathBuf, sync::OnceLock, time::Duration};

use opentelemetry::{global, trace::TracerProvider, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime::Tokio,
    trace::{Config, TracerProvider as SdkTracerProvider},
    Resource,
};
use tracing::*;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt::layer, layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Kept for flushing spans at shutdown.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Configuration for file-based logging with rotation.
#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    /// Directory log files are written to.
    pub directory: PathBuf,
    /// Base filename prefix.
    pub file_name_prefix: String,
    /// Rotation strategy.
    pub rotation: Rotation,
}

impl FileLoggingConfig {
    pub fn new(directory: PathBuf, file_name_prefix: String) -> Self {
        Self {
            directory,
            file_name_prefix,
            rotation: Rotation::DAILY,
        }
    }
}

/// Logger configuration.
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Service name attached to exported traces.
    pub service_name: String,
    /// OTLP endpoint URL; exporting is disabled when unset.
    pub otlp_url: Option<String>,
    /// Export request timeout.
    pub otlp_timeout: Duration,
    /// Use JSON format on stdout instead of compact.
    pub json_format: bool,
    /// Optional file logging.
    pub file_logging: Option<FileLoggingConfig>,
}

impl LoggerConfig {
    pub fn new(service_name: String) -> Self {
        Self {
            service_name,
            otlp_url: None,
            otlp_timeout: Duration::from_secs(10),
            json_format: false,
            file_logging: None,
        }
    }

    pub fn with_otlp_url(mut self, url: String) -> Self {
        self.otlp_url = Some(url);
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn with_file_logging(mut self, config: FileLoggingConfig) -> Self {
        self.file_logging = Some(config);
        self
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::new("(cairn-service)".to_owned())
    }
}

/// Initializes the logging subsystem.
///
/// Default level is INFO, overridable via `RUST_LOG`.
pub fn init(config: LoggerConfig) {
    let filt = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy();

    let stdout_layer = if config.json_format {
        layer().json().with_filter(filt.clone()).boxed()
    } else {
        layer().compact().with_filter(filt.clone()).boxed()
    };

    let file_layer = config.file_logging.as_ref().map(|file_config| {
        let appender = RollingFileAppender::new(
            file_config.rotation.clone(),
            &file_config.directory,
            &file_config.file_name_prefix,
        );
        layer()
            .compact()
            .with_writer(appender)
            .with_ansi(false)
            .with_filter(filt.clone())
            .boxed()
    });

    let otel_layer = config.otlp_url.as_ref().map(|otlp_url| {
        let resource = Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]);

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(otlp_url)
            .with_timeout(config.otlp_timeout);

        let tp = opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(exporter)
            .with_trace_config(Config::default().with_resource(resource))
            .install_batch(Tokio)
            .expect("init: failed to initialize opentelemetry pipeline");

        if TRACER_PROVIDER.set(tp.clone()).is_err() {
            error!("logging initialized more than once");
        }

        let tracer = tp.tracer("cairn-tracer");
        tracing_opentelemetry::layer().with_tracer(tracer)
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(otel_layer)
        .init();

    info!(service_name = %config.service_name, "logging initialized");
}

/// Flushes pending spans and tears down the exporter. Call before exit.
pub fn finalize() {
    info!("shutting down logging");

    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            error!("failed to shut down tracer provider: {e:?}");
        }
    }

    global::shutdown_tracer_provider();
}
