//! Sticker CLI tool
//!
//! Turns photos into transparent stickers with a generative model and a
//! chroma-key pass.

#[cfg(feature = "cli")]
use sticker_ai::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
