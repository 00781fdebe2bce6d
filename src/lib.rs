pub mod commands;
pub mod config;
pub mod correlate;
pub mod db;
pub mod error;
pub mod fetcher;
pub mod indexer;
pub mod model;
pub mod normalize;
pub mod platform;
pub mod privacy;
pub mod settings;
pub mod solution;

#[cfg(test)]
mod testing;

use std::sync::Arc;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub db: db::Database,
    pub platform: Arc<platform::DiscordPlatform>,
    pub indexer: Arc<indexer::Indexer<platform::DiscordPlatform>>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
