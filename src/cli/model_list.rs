//! Model listing functionality

use crate::core::context::AppContext;
use chrono::{DateTime, Utc};
use std::error::Error;

pub async fn list_models(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    println!("🤖 Available Models");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if let Some(model) = ctx.tokens.selected_model() {
        println!("🎯 Selected model: {model}");
        println!();
    }

    let models = ctx.oneapi.list_models().await?.data;

    if models.is_empty() {
        println!("No models found.");
        return Ok(());
    }

    println!("Found {} models (sorted newest first):", models.len());
    println!();

    let allowed = ctx.tokens.available_models();
    for model in models {
        let marker = if allowed.contains(&model.id) { "✓" } else { "•" };
        println!("  {marker} {}", model.id);
        if let Some(owned_by) = &model.owned_by {
            if !owned_by.is_empty() && owned_by != "system" {
                println!("    Owner: {owned_by}");
            }
        }
        if let Some(created) = model.created.filter(|created| *created > 0) {
            // Some APIs return timestamps in milliseconds, others in seconds
            let timestamp_secs = if created > 10_000_000_000 {
                created / 1000
            } else {
                created
            };
            if let Some(dt) = DateTime::<Utc>::from_timestamp(timestamp_secs as i64, 0) {
                println!("    Created: {}", dt.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        println!();
    }

    Ok(())
}
