//! shellcache CLI - drives an offline asset cache from the command line.

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use env_logger::Env;

#[tokio::main]
async fn main() -> shell_cache::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    shell_cache::cli::run().await
}
