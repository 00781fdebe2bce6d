pub mod channel_settings;
pub mod privacy;
pub mod solution;

use crate::{Data, Error};

pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        solution::mark_solution(),
        channel_settings::channel_settings(),
        channel_settings::server_settings(),
        privacy::privacy(),
    ]
}
