use tracing_subscriber::EnvFilter;

/// Initialize console logging with env-filter defaults.
///
/// Respects `RUST_LOG`; otherwise tether crates log at debug and
/// everything else at warn. Wire-level lines additionally require
/// [`Peer::set_wire_logging`](tether_core::Peer::set_wire_logging).
pub fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("tether=debug,tether_core=debug,tether_script=debug,tether_transport=debug,warn")
    });

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))?;

    Ok(())
}

/// Console-only logging for tests. Safe to call from every test; only the
/// first call installs a subscriber.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("tether=trace,tether_core=trace,tether_script=trace,tether_transport=trace,debug")
            }),
        )
        .try_init();
}
