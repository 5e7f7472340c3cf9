use tracing_subscriber::EnvFilter;

/// Initializes a `tracing_subscriber` using `WORDFEED_LOG` first, then `RUST_LOG`, then a default.
///
/// Log field contract for pipeline events:
/// - Always include `shard` (path) and `record` (ordinal) when a specific record is involved.
/// - Include `pass` for any epoch/repetition-related event (0-based).
/// - Events on the `wordfeed_proof` target carry an `event = "..."` field and mark
///   lifecycle transitions (pass start/end, flush, terminal error).
pub fn init_tracing() {
    let filter = env_filter();
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env("WORDFEED_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}
