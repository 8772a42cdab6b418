//! Collection Engine CLI
//!
//! Exercises the collection engine against a JSON fixture store.

use collection_engine::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logging is initialised inside `run` once the config level is known
    cli::run().await
}
