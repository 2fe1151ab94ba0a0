//! Severity levels

/// Severity of a record; a larger value is more verbose
///
/// A logger with threshold `t` emits every record whose level value is `<= t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Level {
    Notice = 0,
    Fatal = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
}

impl Level {
    /// Get the display name for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Notice => "NOTICE",
            Level::Fatal => "FATAL",
            Level::Warning => "WARNING",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
        }
    }

    /// Tag that starts every line of this level
    pub fn tag(&self) -> &'static str {
        match self {
            Level::Notice => "NOTICE: ",
            Level::Fatal => "FATAL: ",
            Level::Warning => "WARNING: ",
            Level::Info => "INFO: ",
            Level::Debug => "DEBUG: ",
        }
    }

    /// Look up a level by its numeric value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Level::Notice),
            1 => Some(Level::Fatal),
            2 => Some(Level::Warning),
            3 => Some(Level::Info),
            4 => Some(Level::Debug),
            _ => None,
        }
    }
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::ERROR => Level::Fatal,
            tracing::Level::WARN => Level::Warning,
            tracing::Level::INFO => Level::Info,
            tracing::Level::DEBUG | tracing::Level::TRACE => Level::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_tags() {
        assert_eq!(Level::Notice.tag(), "NOTICE: ");
        assert_eq!(Level::Fatal.tag(), "FATAL: ");
        assert_eq!(Level::Warning.tag(), "WARNING: ");
        assert_eq!(Level::Info.tag(), "INFO: ");
        assert_eq!(Level::Debug.tag(), "DEBUG: ");
        assert!(Level::Info.tag().starts_with(Level::Info.as_str()));
    }

    #[test]
    fn test_level_from_u8_roundtrip() {
        for value in 0..=4u8 {
            assert_eq!(Level::from_u8(value).unwrap() as u8, value);
        }
        assert!(Level::from_u8(5).is_none());
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(Level::from(tracing::Level::ERROR), Level::Fatal);
        assert_eq!(Level::from(tracing::Level::WARN), Level::Warning);
        assert_eq!(Level::from(tracing::Level::INFO), Level::Info);
        assert_eq!(Level::from(tracing::Level::TRACE), Level::Debug);
    }
}
