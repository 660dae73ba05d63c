use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Target shared by every protocol event, so they can be filtered together.
pub const PROTOCOL_TARGET: &str = "campmail::protocol";

/// Emits a protocol event at `$level`, tagged with what produced it.
///
/// `kind` is `outgoing` for lines the client wrote, `incoming` for replies it
/// read and `internal` for connection housekeeping.
#[macro_export]
macro_rules! protocol_event {
    ($kind:literal, $level:ident, $($arg:tt)+) => {
        $crate::tracing::event!(
            target: $crate::logging::PROTOCOL_TARGET,
            $crate::tracing::Level::$level,
            kind = $kind,
            $($arg)+
        )
    };
}

/// A line written to the SMTP server, always at TRACE.
#[macro_export]
macro_rules! outgoing {
    ($($arg:tt)+) => {
        $crate::protocol_event!("outgoing", TRACE, $($arg)+)
    };
}

#[macro_export]
macro_rules! incoming {
    ($($arg:tt)+) => {
        $crate::protocol_event!("incoming", TRACE, $($arg)+)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($arg:tt)+) => {
        $crate::protocol_event!("internal", $level, $($arg)+)
    };
    ($($arg:tt)+) => {
        $crate::protocol_event!("internal", TRACE, $($arg)+)
    };
}

/// Parses a `LOG_LEVEL` style value, falling back to `default`.
fn level_from(value: Option<&str>, default: LevelFilter) -> LevelFilter {
    value.map_or(default, |level| {
        LevelFilter::from_str(level).unwrap_or_else(|_| {
            eprintln!("Invalid log level specified {level}, defaulting to {default}");
            default
        })
    })
}

/// Installs the global subscriber.
///
/// The level comes from `LOG_LEVEL`, defaulting to `TRACE` in debug builds and
/// `INFO` otherwise. Only events from `campmail*` targets are emitted.
pub fn init() {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    let level = level_from(std::env::var("LOG_LEVEL").ok().as_deref(), default);

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("campmail")
                })),
        )
        .init();
}
