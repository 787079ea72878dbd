//! Logging set-up and runtime verbosity.
//!
//! Verbosity travels in requests as a small integer:
//! 0 = warn, 1 = info, 2 = debug, 3 and above = trace.

use crate::error::{VfdError, VfdResult};
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::level_filters::LevelFilter;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Registry;

/// Maps a numeric verbosity to a level filter.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Something that can change how much the daemon logs.
pub trait VerbosityControl: Send + Sync {
    fn set_verbosity(&self, verbosity: u8) -> VfdResult<()>;

    fn verbosity(&self) -> u8;
}

/// Handle on the installed subscriber's level filter.
pub struct LogControl {
    handle: reload::Handle<LevelFilter, Registry>,
    current: AtomicU8,
}

impl LogControl {
    /// Installs the global fmt subscriber at `verbosity`.
    pub fn init(verbosity: u8) -> VfdResult<Self> {
        let (filter, handle) = reload::Layer::new(level_for(verbosity));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|e| VfdError::fatal_init(format!("cannot install logger: {}", e)))?;

        Ok(Self {
            handle,
            current: AtomicU8::new(verbosity),
        })
    }
}

impl VerbosityControl for LogControl {
    fn set_verbosity(&self, verbosity: u8) -> VfdResult<()> {
        let level = level_for(verbosity);
        self.handle
            .modify(|filter| *filter = level)
            .map_err(|e| VfdError::validation(format!("cannot change log level: {}", e)))?;
        self.current.store(verbosity, Ordering::Relaxed);
        info!(verbosity, %level, "log level changed");
        Ok(())
    }

    fn verbosity(&self) -> u8 {
        self.current.load(Ordering::Relaxed)
    }
}

/// Records the requested verbosity without touching any subscriber. For
/// embedders that manage logging themselves.
#[derive(Debug, Default)]
pub struct AtomicVerbosity {
    current: AtomicU8,
}

impl AtomicVerbosity {
    pub fn new(verbosity: u8) -> Self {
        Self {
            current: AtomicU8::new(verbosity),
        }
    }
}

impl VerbosityControl for AtomicVerbosity {
    fn set_verbosity(&self, verbosity: u8) -> VfdResult<()> {
        self.current.store(verbosity, Ordering::Relaxed);
        Ok(())
    }

    fn verbosity(&self) -> u8 {
        self.current.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_mapping() {
        assert_eq!(level_for(0), LevelFilter::WARN);
        assert_eq!(level_for(1), LevelFilter::INFO);
        assert_eq!(level_for(2), LevelFilter::DEBUG);
        assert_eq!(level_for(3), LevelFilter::TRACE);
        assert_eq!(level_for(200), LevelFilter::TRACE);
    }

    #[test]
    fn test_atomic_verbosity() {
        let v = AtomicVerbosity::new(1);
        v.set_verbosity(3).unwrap();
        assert_eq!(v.verbosity(), 3);
    }
}
