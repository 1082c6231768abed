//! Structured logging bootstrap. The facade's `log(message)` operation
//! emits one `tracing` record per call; this module only configures where
//! those records (and the kernel's own internal diagnostics) end up — the
//! actual sink is the embedder's concern (see `SPEC_FULL.md` §7.1).

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Which span lifecycle events to emit, mirroring `tracing_subscriber`'s
/// `FmtSpan` presets at a coarser, embedder-facing granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanEvents {
    new: bool,
    enter: bool,
    exit: bool,
    close: bool,
}

impl SpanEvents {
    /// No span lifecycle events.
    pub const NONE: SpanEvents = SpanEvents {
        new: false,
        enter: false,
        exit: false,
        close: false,
    };
    /// Only span creation and completion.
    pub const LIFECYCLE: SpanEvents = SpanEvents {
        new: true,
        enter: false,
        exit: false,
        close: true,
    };
    /// Every span event `tracing_subscriber` can report.
    pub const FULL: SpanEvents = SpanEvents {
        new: true,
        enter: true,
        exit: true,
        close: true,
    };

    fn into_fmt_span(self) -> tracing_subscriber::fmt::format::FmtSpan {
        use tracing_subscriber::fmt::format::FmtSpan;
        let mut span = FmtSpan::NONE;
        if self.new {
            span |= FmtSpan::NEW;
        }
        if self.enter {
            span |= FmtSpan::ENTER;
        }
        if self.exit {
            span |= FmtSpan::EXIT;
        }
        if self.close {
            span |= FmtSpan::CLOSE;
        }
        span
    }
}

impl Default for SpanEvents {
    fn default() -> Self {
        SpanEvents::NONE
    }
}

/// Builds and installs the global `tracing` subscriber. Directives fall
/// back to `RUST_LOG` when set, matching the teacher's
/// `EnvFilter::try_from_default_env()` precedence.
pub struct LoggingBuilder {
    directives: String,
    span_events: SpanEvents,
    with_target: bool,
    with_thread_ids: bool,
    with_file: bool,
    with_line_number: bool,
}

impl LoggingBuilder {
    pub fn new() -> Self {
        LoggingBuilder {
            directives: "info".to_string(),
            span_events: SpanEvents::NONE,
            with_target: true,
            with_thread_ids: false,
            with_file: false,
            with_line_number: false,
        }
    }

    pub fn directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = directives.into();
        self
    }

    pub fn span_events(mut self, span_events: SpanEvents) -> Self {
        self.span_events = span_events;
        self
    }

    pub fn with_target(mut self, enabled: bool) -> Self {
        self.with_target = enabled;
        self
    }

    pub fn with_thread_ids(mut self, enabled: bool) -> Self {
        self.with_thread_ids = enabled;
        self
    }

    pub fn with_file(mut self, enabled: bool) -> Self {
        self.with_file = enabled;
        self
    }

    pub fn with_line_number(mut self, enabled: bool) -> Self {
        self.with_line_number = enabled;
        self
    }

    /// Installs the subscriber globally. Panics if one is already
    /// installed; use [`LoggingBuilder::try_init`] to avoid that in tests.
    pub fn init(self) {
        self.try_init()
            .expect("a global tracing subscriber is already installed");
    }

    pub fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directives));

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(self.with_target)
            .with_thread_ids(self.with_thread_ids)
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_span_events(self.span_events.into_fmt_span());

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    }
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs a subscriber with the builder's defaults (`info`, no span
/// events). Convenience for embedders that don't need the builder.
pub fn init() {
    LoggingBuilder::new().init();
}
