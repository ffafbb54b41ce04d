//! Sign-in, sign-out and status commands.

use std::error::Error;
use std::io::{self, Write};

use crate::api::Credentials;
use crate::core::context::AppContext;
use crate::core::quota::format_quota;

pub const PASSWORD_ENV: &str = "CHATFRONT_PASSWORD";

/// `--password`, then `CHATFRONT_PASSWORD`, then an interactive prompt.
pub fn resolve_password(
    flag: Option<String>,
    env: Option<String>,
) -> Result<String, Box<dyn Error>> {
    if let Some(password) = flag.or(env).filter(|p| !p.is_empty()) {
        return Ok(password);
    }

    print!("Password: ");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let password = input.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err("Password cannot be empty".into());
    }
    Ok(password)
}

fn password_from(flag: Option<String>) -> Result<String, Box<dyn Error>> {
    resolve_password(flag, std::env::var(PASSWORD_ENV).ok())
}

pub async fn login(
    ctx: &AppContext,
    username: &str,
    password: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let credentials = Credentials::new(username, password_from(password)?);
    let username = ctx.session.login(&credentials).await?;
    println!("✅ Signed in as {username}");
    Ok(())
}

pub async fn register(
    ctx: &AppContext,
    username: &str,
    password: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let credentials = Credentials::new(username, password_from(password)?);
    ctx.session.register(&credentials).await?;
    println!("✅ Registered {username}. Run `chatfront login {username}` to sign in.");
    Ok(())
}

pub fn logout(ctx: &AppContext) {
    ctx.session.logout();
    println!("✅ Signed out");
}

pub async fn oneapi_login(
    ctx: &AppContext,
    username: &str,
    password: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let envelope = ctx.oneapi.login(username, &password_from(password)?).await?;
    if envelope.message.is_empty() {
        println!("✅ Signed in to OneAPI as {username}");
    } else {
        println!("✅ Signed in to OneAPI as {username}: {}", envelope.message);
    }
    Ok(())
}

pub fn oneapi_token(ctx: &AppContext, token: &str) {
    ctx.oneapi.remember_access_token(token);
    println!("✅ Stored OneAPI access token");
}

pub fn print_status(ctx: &AppContext) {
    let session = ctx.session.snapshot();
    match (&session.user, session.authenticated) {
        (Some(user), true) => println!("👤 Signed in as {}", user.username),
        (None, true) => println!("👤 Signed in"),
        _ => println!("👤 Not signed in"),
    }

    let tokens = ctx.tokens.snapshot();
    match &tokens.selected_token {
        Some(token) => println!(
            "🔑 Token: {} (#{}, {})",
            token.display_name,
            token.id,
            token.masked_key()
        ),
        None => println!("🔑 Token: (none selected)"),
    }
    match &tokens.selected_model {
        Some(model) => println!("🤖 Model: {model}"),
        None => println!("🤖 Model: (none selected)"),
    }
    println!(
        "📊 Cached tokens: {} ({} usable)",
        tokens.tokens.len(),
        tokens.valid_tokens().len()
    );
    if tokens.quota.total_quota > 0 {
        println!("💰 Remaining quota: {}", format_quota(tokens.quota.remaining()));
    }
}
