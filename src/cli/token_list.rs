//! Token listing and selection commands.

use std::error::Error;

use chrono::Local;

use crate::api::ApiToken;
use crate::core::context::AppContext;
use crate::core::tokens::TokenState;

pub async fn list_tokens(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    // A partial refresh still leaves something worth printing.
    let refreshed = ctx.tokens.refresh().await;
    print_tokens(&ctx.tokens.snapshot());
    refreshed?;
    Ok(())
}

pub fn print_tokens(state: &TokenState) {
    println!("🔑 OneAPI Tokens");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();

    if state.tokens.is_empty() {
        println!("No tokens found. Create one in the OneAPI console.");
        return;
    }

    let selected = state.selected_token.as_ref().map(|token| token.id);
    for token in &state.tokens {
        let marker = if Some(token.id) == selected { "▶" } else { "•" };
        println!("  {marker} #{} {}", token.id, token.display_name);
        println!("    Key: {}", token.masked_key());
        println!("    Status: {}", token.status);
        println!("    Quota: {}", crate::core::quota::token_quota(token));
        if let Some(expires) = describe_expiry(token) {
            println!("    Expires: {expires}");
        }
        if !token.allowed_models.is_empty() {
            println!("    Models: {}", token.allowed_models.join(", "));
        }
        println!();
    }

    println!(
        "Account quota remaining: {}",
        crate::core::quota::format_quota(state.quota.remaining())
    );
}

fn describe_expiry(token: &ApiToken) -> Option<String> {
    token
        .expires()
        .map(|at| at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
}

pub fn select_token(ctx: &AppContext, id: i64) -> Result<(), Box<dyn Error>> {
    if !ctx.tokens.select_token_by_id(id) {
        return Err(format!(
            "Token #{id} is not a usable token. Run `chatfront tokens` to see the list."
        )
        .into());
    }
    println!("✅ Selected token #{id}");
    match ctx.tokens.selected_model() {
        Some(model) => println!("🤖 Model: {model}"),
        None => {
            let models = ctx.tokens.available_models();
            if !models.is_empty() {
                println!("Available models: {}", models.join(", "));
            }
        }
    }
    Ok(())
}

pub fn select_model(ctx: &AppContext, model: &str) -> Result<(), Box<dyn Error>> {
    if ctx.tokens.selected_token().is_none() {
        return Err("Select a token first with `chatfront select-token <id>`".into());
    }
    if !ctx.tokens.select_model(model) {
        let models = ctx.tokens.available_models();
        return Err(format!(
            "Model '{model}' is not allowed by the selected token. Allowed: {}",
            if models.is_empty() {
                "(none)".to_string()
            } else {
                models.join(", ")
            }
        )
        .into());
    }
    println!("✅ Selected model {model}");
    Ok(())
}

/// Initialize the token store and keep refreshing until Ctrl-C.
pub async fn watch(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    ctx.tokens.initialize().await;
    print_tokens(&ctx.tokens.snapshot());
    println!(
        "⏳ Refreshing every {}s. Press Ctrl-C to stop.",
        ctx.config.refresh_interval().as_secs()
    );

    tokio::signal::ctrl_c().await?;
    ctx.tokens.dispose();
    println!();
    println!("👋 Stopped");
    Ok(())
}
