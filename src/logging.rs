use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs the `tracing` subscriber.
///
/// Safe to call more than once. Nothing is installed unless `RUST_LOG` is set,
/// e.g. `RUST_LOG=pyxlate=debug` or `RUST_LOG=pyxlate::transpiler=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true).with_writer(std::io::stderr))
                .with(filter)
                .init();
        }
    });
}
