//! Log output for mhprobe binaries.
//!
//! `RUST_LOG` selects what is logged, with the level passed at startup as the
//! fallback directive. `RUST_LOG_FORMAT=json` switches to one JSON object per
//! line.

mod subscriber;

pub use subscriber::{init, init_with_level, verbosity};
pub use tracing::level_filters::LevelFilter;
