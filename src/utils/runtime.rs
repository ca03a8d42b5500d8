use anyhow::Result;

/// Timers, ticks and store operations all share one cooperative thread.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
