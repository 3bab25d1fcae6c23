//! Tracing configuration and initialization.
//!
//! Provides structured logging with span-based context propagation. Every
//! reconcile cycle runs inside a `vapp_operation` span so its remote calls can
//! be correlated.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter,
};

/// Configuration for tracing initialization.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name for identification
    pub service_name: String,
    /// Default filter directive (e.g. "info", "vapp_core=debug"); `RUST_LOG` wins
    pub filter: String,
    /// Whether to include span events (enter, exit, close)
    pub include_span_events: bool,
    /// Whether to output in JSON format
    pub json_output: bool,
    /// Whether to include file and line numbers
    pub include_location: bool,
    /// Whether to include target (module path)
    pub include_target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "vapp-reconciler".to_string(),
            filter: "info".to_string(),
            include_span_events: false,
            json_output: false,
            include_location: false,
            include_target: true,
        }
    }
}

impl TracingConfig {
    /// Create a new config with the given service name.
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the default filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enable JSON output format.
    pub fn with_json(mut self, json: bool) -> Self {
        self.json_output = json;
        self
    }

    /// Include span events in output.
    pub fn with_span_events(mut self, include: bool) -> Self {
        self.include_span_events = include;
        self
    }

    /// Include file and line numbers.
    pub fn with_location(mut self, include: bool) -> Self {
        self.include_location = include;
        self
    }

    /// Build an EnvFilter from this config.
    fn build_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize tracing with the given configuration.
///
/// Call once at startup. Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```no_run
/// use observability::{init_tracing, TracingConfig};
///
/// init_tracing(TracingConfig::new("vappctl").with_filter("debug")).ok();
/// ```
pub fn init_tracing(config: TracingConfig) -> Result<(), TryInitError> {
    let filter = config.build_filter();

    let span_events = if config.include_span_events {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    if config.json_output {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_target(config.include_target)
            .with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_span_events(span_events)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_target(config.include_target)
            .with_writer(std::io::stderr);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()?;
    }

    tracing::debug!(
        service = %config.service_name,
        filter = %config.filter,
        "Tracing initialized"
    );
    Ok(())
}

/// Create the span one reconcile cycle runs in.
#[macro_export]
macro_rules! vapp_span {
    ($op:expr, $vapp:expr, $correlation_id:expr) => {
        tracing::info_span!(
            "vapp_operation",
            operation = $op,
            vapp = %$vapp,
            correlation_id = %$correlation_id
        )
    };
}

/// Create a span for a step acting on one entity.
#[macro_export]
macro_rules! entity_span {
    ($step:expr, $entity:expr) => {
        tracing::debug_span!("entity_step", step = $step, entity = %$entity)
    };
}
