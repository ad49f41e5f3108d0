//! Cross-platform logging macros.
//!
//! `log_info!`, `log_warn!`, `log_error!` and `log_debug!` take a format
//! string, optionally preceded by `key = value` fields and a `;`:
//!
//! ```rust,ignore
//! crate::log_info!(channel = channel, attempt = 2; "Live updates: reconnecting");
//! crate::log_debug!("Live updates: no identity, staying idle");
//! ```
//!
//! On native targets fields become structured `tracing` fields (Display) under
//! the `pulse_client` target. In the browser they are appended to the console
//! line as `key=value`.

#[cfg(not(target_arch = "wasm32"))]
#[doc(hidden)]
pub use tracing;

/// Console sink for the browser build.
#[cfg(target_arch = "wasm32")]
#[doc(hidden)]
pub fn console(level: &str, line: &str) {
    let line = line.into();
    match level {
        "error" => web_sys::console::error_1(&line),
        "warn" => web_sys::console::warn_1(&line),
        "debug" => web_sys::console::debug_1(&line),
        _ => web_sys::console::log_1(&line),
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[doc(hidden)]
#[macro_export]
macro_rules! __pulse_log {
    ($level:ident, $($key:ident = $value:expr),+ ; $($arg:tt)+) => {
        $crate::logging::tracing::$level!(
            target: "pulse_client",
            $($key = %$value,)+
            $($arg)+
        )
    };
    ($level:ident, $($arg:tt)+) => {
        $crate::logging::tracing::$level!(target: "pulse_client", $($arg)+)
    };
}

#[cfg(target_arch = "wasm32")]
#[doc(hidden)]
#[macro_export]
macro_rules! __pulse_log {
    ($level:ident, $($key:ident = $value:expr),+ ; $($arg:tt)+) => {{
        let mut line = format!($($arg)+);
        $(line.push_str(&format!(" {}={}", stringify!($key), $value));)+
        $crate::logging::console(stringify!($level), &line)
    }};
    ($level:ident, $($arg:tt)+) => {
        $crate::logging::console(stringify!($level), &format!($($arg)+))
    };
}

/// Log an info message
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)+) => {
        $crate::__pulse_log!(info, $($arg)+)
    };
}

/// Log an error message
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)+) => {
        $crate::__pulse_log!(error, $($arg)+)
    };
}

/// Log a warning message
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)+) => {
        $crate::__pulse_log!(warn, $($arg)+)
    };
}

/// Log a debug message
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)+) => {
        $crate::__pulse_log!(debug, $($arg)+)
    };
}
