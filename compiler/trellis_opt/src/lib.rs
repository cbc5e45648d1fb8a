//! Trellis Optimizer - graph rewrites over the Scope/Computable IR
//!
//! Every pass takes a `&mut Graph`, rewrites it in place through the
//! graph's validated mutation API, and returns a small stats struct.
//! [`optimize`] runs the enabled passes once each in a fixed order:
//!
//! 1. [`eliminate_dead_code`]: drop unused pure nodes and uninstantiated
//!    scopes.
//! 2. [`inline_scopes`] with [`InlinePolicy::SingleInstance`].
//! 3. [`inline_scopes`] with [`InlinePolicy::Trivial`].
//! 4. [`push_down_computables`]: move single-use arguments into the
//!    child scope that consumes them.
//! 5. [`cleanup_element_arguments`]: collapse `ElementArgument`
//!    indirections once the element is a same-scope instance.
//!
//! Running the pipeline on its own output changes nothing.

mod config;
mod dce;
pub mod element_arg;
pub mod inline;
mod pipeline;
pub mod pushdown;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use config::{ConfigError, OptimizerConfig, PassKind, DISABLE_VAR, TRIVIAL_LIMIT_VAR};
pub use dce::{eliminate_dead_code, DceStats};
pub use element_arg::{cleanup_element_arguments, ElementArgStats};
pub use inline::{inline_scopes, InlinePolicy, InlineStats};
pub use pipeline::{optimize, OptimizeError, PassReport, PipelineReport};
pub use pushdown::{push_down_computables, PushdownStats};

use std::sync::Once;

/// Environment variable holding the log filter; `RUST_LOG` is the fallback.
pub const LOG_VAR: &str = "TRELLIS_LOG";

static TRACING_INIT: Once = Once::new();

/// Initialize tracing from `TRELLIS_LOG` (or `RUST_LOG`).
///
/// Output goes to stderr. Nothing is installed when neither variable is
/// set, so the optimizer stays silent by default. Safe to call repeatedly;
/// only the first call has an effect.
///
/// ```bash
/// TRELLIS_LOG=trellis_opt=debug cargo test -p trellis_opt
/// TRELLIS_LOG=trellis_opt::pushdown=trace cargo test -p trellis_opt pushdown
/// ```
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        let directives = std::env::var(LOG_VAR).or_else(|_| std::env::var("RUST_LOG"));
        if let Ok(directives) = directives {
            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(true)
                        .with_level(true),
                )
                .with(EnvFilter::new(directives))
                .init();
        }
    });
}
