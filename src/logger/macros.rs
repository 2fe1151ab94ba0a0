//! Formatting macros
//!
//! Each macro takes a logger followed by `format!`-style arguments and
//! records the macro's call site.

/// Emit a `NOTICE` record: `notice!(logger, "fmt", args...)`
#[macro_export]
macro_rules! notice {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Notice, ::std::format_args!($($arg)+))
    };
}

/// Emit a `FATAL` record, mirrored to the fatal stream
#[macro_export]
macro_rules! fatal {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Fatal, ::std::format_args!($($arg)+))
    };
}

/// Emit a `WARNING` record
#[macro_export]
macro_rules! warning {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Warning, ::std::format_args!($($arg)+))
    };
}

/// Emit an `INFO` record
#[macro_export]
macro_rules! info {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Info, ::std::format_args!($($arg)+))
    };
}

/// Emit a `DEBUG` record
#[macro_export]
macro_rules! debug {
    ($logger:expr, $($arg:tt)+) => {
        $logger.log($crate::Level::Debug, ::std::format_args!($($arg)+))
    };
}
