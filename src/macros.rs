// src/macros.rs

//
// Crate-internal logging macros
//
// With `logging`, every level forwards to the matching `tracing` macro.
// Without it, errors still reach stderr; the other levels expand to nothing,
// so values only used for logging are bound with a leading underscore.
//

#![allow(unused_macros)]

#[cfg(feature = "logging")]
macro_rules! kv_log {
    ($level:ident, $($arg:tt)*) => {
        tracing::$level!($($arg)*)
    };
}

#[cfg(not(feature = "logging"))]
macro_rules! kv_log {
    (error, $($arg:tt)*) => {
        eprintln!("kv-mux: {}", format_args!($($arg)*))
    };
    ($level:ident, $($arg:tt)*) => {};
}

macro_rules! log_error {
    ($($arg:tt)*) => { $crate::macros::kv_log!(error, $($arg)*) };
}

macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::macros::kv_log!(warn, $($arg)*) };
}

macro_rules! log_info {
    ($($arg:tt)*) => { $crate::macros::kv_log!(info, $($arg)*) };
}

macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::macros::kv_log!(debug, $($arg)*) };
}

// Per-frame noise.
macro_rules! log_trace {
    ($($arg:tt)*) => { $crate::macros::kv_log!(trace, $($arg)*) };
}

pub(crate) use kv_log;
pub(crate) use log_debug;
pub(crate) use log_error;
pub(crate) use log_info;
pub(crate) use log_trace;
pub(crate) use log_warn;
