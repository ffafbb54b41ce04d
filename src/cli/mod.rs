//! Command-line interface parsing and handling
//!
//! Each subcommand builds an [`AppContext`] from the loaded configuration and
//! drives one store or API call against it.

pub mod model_list;
pub mod session;
pub mod token_list;
pub mod topics;


use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::config::Config;
use crate::core::context::AppContext;
use crate::router::RouteName;
use crate::utils::logging::init_tracing;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("VERGEN_GIT_DESCRIBE"),
    "\nbuilt: ",
    env!("VERGEN_BUILD_TIMESTAMP"),
    "\nrustc: ",
    env!("VERGEN_RUSTC_SEMVER"),
);

#[derive(Parser)]
#[command(name = "chatfront")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Terminal front end for a chat backend and its OneAPI token service")]
#[command(
    long_about = "chatfront signs in to a chat backend, manages OneAPI tokens, models and \
quota, and lists or creates chat topics.\n\n\
Environment Variables:\n\
  CHATFRONT_BASE_URL     Override the chat backend URL\n\
  CHATFRONT_ONEAPI_URL   Override the OneAPI URL\n\
  CHATFRONT_PASSWORD     Password for login commands when --password is omitted\n\
  CHATFRONT_LOG          tracing filter, e.g. \"chatfront=debug\""
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Sign in to the chat backend
    Login {
        username: String,
        /// Password; falls back to CHATFRONT_PASSWORD, then a prompt
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account on the chat backend
    Register {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Sign out of the chat backend
    Logout,
    /// Show session, token selection and quota
    Status,
    /// Sign in to OneAPI
    OneapiLogin {
        username: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Store a OneAPI access token directly
    OneapiToken { token: String },
    /// Refresh and list OneAPI tokens
    Tokens,
    /// Select a OneAPI token by id
    SelectToken { id: i64 },
    /// Select a model allowed by the selected token
    SelectModel { model: String },
    /// List models offered by OneAPI
    Models,
    /// List chat topics
    Topics,
    /// Create a chat topic
    CreateTopic {
        #[arg(trailing_var_arg = true, required = true)]
        title: Vec<String>,
    },
    /// Send a greeting to the chat backend
    Hello {
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
    /// Keep the token list fresh until Ctrl-C
    Watch,
    /// Resolve a route through the navigation guard
    Open { route: RouteName },
    /// Print the effective configuration
    Config,
    /// Forget the local token list and selection
    ResetTokens,
}

pub fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(args.verbose);

    tokio::runtime::Runtime::new()?.block_on(async_main(args))
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn Error>> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

async fn async_main(args: Args) -> Result<(), Box<dyn Error>> {
    let config = load_config(args.config.as_ref())?;

    if args.command == Commands::Config {
        config.print_all();
        return Ok(());
    }

    let ctx = AppContext::from_config(config)?;

    match args.command {
        Commands::Login { username, password } => {
            session::login(&ctx, &username, password).await
        }
        Commands::Register { username, password } => {
            session::register(&ctx, &username, password).await
        }
        Commands::Logout => {
            session::logout(&ctx);
            Ok(())
        }
        Commands::Status => {
            session::print_status(&ctx);
            Ok(())
        }
        Commands::OneapiLogin { username, password } => {
            session::oneapi_login(&ctx, &username, password).await
        }
        Commands::OneapiToken { token } => {
            session::oneapi_token(&ctx, &token);
            Ok(())
        }
        Commands::Tokens => token_list::list_tokens(&ctx).await,
        Commands::SelectToken { id } => token_list::select_token(&ctx, id),
        Commands::SelectModel { model } => token_list::select_model(&ctx, &model),
        Commands::Models => model_list::list_models(&ctx).await,
        Commands::Topics => topics::list_topics(&ctx).await,
        Commands::CreateTopic { title } => topics::create_topic(&ctx, &title.join(" ")).await,
        Commands::Hello { message } => topics::say_hello(&ctx, &message.join(" ")).await,
        Commands::Watch => token_list::watch(&ctx).await,
        Commands::Open { route } => {
            let entered = ctx.router.push(route);
            if entered == route {
                println!("➡️  {} ({})", entered, entered.path());
            } else {
                println!(
                    "↪️  {} redirected to {} ({})",
                    route,
                    entered,
                    entered.path()
                );
            }
            Ok(())
        }
        Commands::ResetTokens => {
            ctx.tokens.reset();
            println!("✅ Cleared local token list and selection");
            Ok(())
        }
        Commands::Config => Ok(()),
    }
}
