pub mod backends;
pub mod cli;
pub mod config;
pub mod error;
pub mod extract;
pub mod store;

pub use backends::Backends;
pub use config::DocvaultConfig;
pub use error::{DmsError, DmsResult};
pub use store::{DocumentStore, StoreOptions};

// Trace printing helper: writes to stderr in test and debug builds, absent otherwise.
// Usage: tprintln!("debug: {}", value);
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In release builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
