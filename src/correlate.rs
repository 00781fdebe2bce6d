//! Backfills solution links from the embeds the bot posts when a solution is
//! marked. The field names are a wire format shared with every message the
//! bot has ever posted and must not change.

use std::collections::HashMap;

use serenity::model::id::{MessageId, UserId};
use tracing::debug;

use crate::model::{RawEmbed, RawEmbedField, RawMessage};
use crate::normalize::NormalizedBatch;

pub const QUESTION_FIELD: &str = "Question Message ID";
pub const SOLUTION_FIELD: &str = "Solution Message ID";

/// The `(question, solution)` pair recorded in one embed, if it has both.
pub fn parse_solution_embed(embed: &RawEmbed) -> Option<(MessageId, MessageId)> {
    let mut question = None;
    let mut solution = None;
    for field in &embed.fields {
        match field.name.as_str() {
            QUESTION_FIELD => question = parse_id(&field.value),
            SOLUTION_FIELD => solution = parse_id(&field.value),
            _ => {}
        }
    }
    Some((question?, solution?))
}

fn parse_id(value: &str) -> Option<MessageId> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(MessageId::new)
}

/// Embed fields for a freshly marked solution.
pub fn solution_embed_fields(question: MessageId, solution: MessageId) -> Vec<RawEmbedField> {
    vec![
        RawEmbedField {
            name: QUESTION_FIELD.to_string(),
            value: question.to_string(),
        },
        RawEmbedField {
            name: SOLUTION_FIELD.to_string(),
            value: solution.to_string(),
        },
    ]
}

/// Attaches every solution advertised by a bot-authored embed in `raw` to the
/// matching question in `batch`. Returns the number of links added.
pub fn correlate_solutions(raw: &[RawMessage], batch: &mut NormalizedBatch, bot_id: UserId) -> usize {
    let index: HashMap<MessageId, usize> = batch
        .messages
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id, i))
        .collect();

    let mut linked = 0;
    for message in raw.iter().filter(|m| m.author.id == bot_id) {
        for (question, solution) in message.embeds.iter().filter_map(parse_solution_embed) {
            let Some(&i) = index.get(&question) else {
                continue;
            };
            if batch.messages[i].add_solution(solution) {
                linked += 1;
            }
        }
    }
    if linked > 0 {
        debug!("Correlated {} solution links from bot embeds", linked);
    }
    linked
}
