//! Deskmate CLI entry point.
//!
//! Provides `chat`, `ask` and `context` subcommands: an interactive
//! session, a single question, or a dump of the context snapshot.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use deskmate::assistant::{AssistantGateway, DispatchSettings, Dispatcher, GatewaySettings};
use deskmate::config::Config;
use deskmate::context::ContextFetcher;
use deskmate::credentials::{load_default_credentials, GEMINI_API_KEY, GOOGLE_REFRESH_TOKEN};
use deskmate::format::{render_dashboard, render_turn};
use deskmate::google::auth::OAuthSettings;
use deskmate::google::{
    CalendarApi, GoogleClient, GoogleIdentity, IdentityProvider, MailApi, TasksApi,
};
use deskmate::logging::{self, LoggingGuard};
use deskmate::providers::gemini::GeminiProvider;
use deskmate::providers::LlmProvider;
use deskmate::session::{AuthTransition, Session, SessionError};

/// Deskmate: a personal assistant over your inbox, calendar and tasks.
#[derive(Parser)]
#[command(name = "deskmate", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Sign in and chat interactively.
    Chat,
    /// Sign in, ask one question and print the reply.
    Ask {
        /// The question or request.
        message: String,
    },
    /// Sign in and print the context snapshot as JSON.
    Context,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load().context("failed to load configuration")?;
    let _logging_guard = init_logging(&config)?;

    let credentials = load_default_credentials().context("failed to load credentials")?;
    let identity = Arc::new(GoogleIdentity::new(
        credentials.google_client()?,
        OAuthSettings {
            consent_timeout: Duration::from_secs(config.google.consent_timeout_secs),
            ..OAuthSettings::default()
        },
        credentials.get(GOOGLE_REFRESH_TOKEN).map(str::to_owned),
    ));
    let provider: Arc<dyn LlmProvider> = Arc::new(GeminiProvider::new(
        config.model.name.clone(),
        credentials.require(GEMINI_API_KEY)?,
    ));
    let session = build_session(&config, Arc::clone(&identity), provider);

    match cli.command {
        Command::Chat => handle_chat(session, identity).await,
        Command::Ask { message } => handle_ask(session, identity, &message).await,
        Command::Context => handle_context(session, identity).await,
    }
}

fn init_logging(config: &Config) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.logging.dir {
        Some(dir) => logging::init_production(dir, &config.logging.level).map(Some),
        None => {
            logging::init_cli(&config.logging.level);
            Ok(None)
        }
    }
}

fn build_session(
    config: &Config,
    identity: Arc<GoogleIdentity>,
    provider: Arc<dyn LlmProvider>,
) -> Session {
    let identity: Arc<dyn IdentityProvider> = identity;
    let google = Arc::new(GoogleClient::new(Arc::clone(&identity)));
    let mail: Arc<dyn MailApi> = google.clone();
    let calendar: Arc<dyn CalendarApi> = google.clone();
    let tasks: Arc<dyn TasksApi> = google;

    let fetcher = ContextFetcher::new(
        mail,
        Arc::clone(&calendar),
        Arc::clone(&tasks),
        config.context.clone(),
    );
    let gateway = AssistantGateway::new(
        provider,
        GatewaySettings {
            time_zone: config.time_zone(),
            max_output_tokens: config.model.max_output_tokens,
            json_output: config.model.json_mode,
        },
    );
    let dispatcher = Dispatcher::new(
        calendar,
        tasks,
        identity,
        DispatchSettings {
            default_time_zone: config.time_zone(),
            events_calendar: config.google.events_calendar.clone(),
            max_task_lists: config.context.max_task_lists,
        },
    );
    Session::new(fetcher, gateway, dispatcher)
}

/// Sign in and let the session pick up the new state.
async fn sign_in(session: &mut Session, identity: &GoogleIdentity) -> anyhow::Result<()> {
    identity.sign_in().await.context("sign-in failed")?;
    session.on_auth_change(identity.is_signed_in()).await;
    Ok(())
}

/// Run the interactive chat loop.
async fn handle_chat(mut session: Session, identity: Arc<GoogleIdentity>) -> anyhow::Result<()> {
    let mut auth = identity.subscribe();
    sign_in(&mut session, &identity).await?;
    auth.mark_unchanged();
    println!("{}", render_dashboard(&session.state().context));
    println!("Type a message, or /refresh, /signin, /signout, /quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            changed = auth.changed() => {
                if changed.is_err() {
                    break;
                }
                let signed_in = *auth.borrow_and_update();
                match session.on_auth_change(signed_in).await {
                    AuthTransition::SignedIn => {
                        println!("{}", render_dashboard(&session.state().context));
                    }
                    AuthTransition::SignedOut => println!("Signed out."),
                    AuthTransition::Unchanged => {}
                }
            }
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                match line.trim() {
                    "/quit" => break,
                    "/refresh" => {
                        session.refresh_context().await;
                        println!("{}", render_dashboard(&session.state().context));
                    }
                    "/signin" => {
                        if let Err(e) = identity.sign_in().await {
                            warn!(error = %e, "sign-in failed");
                            println!("Sign-in failed: {e}");
                        }
                    }
                    "/signout" => {
                        if let Err(e) = identity.sign_out().await {
                            warn!(error = %e, "sign-out failed");
                        }
                    }
                    text => match session.submit(text).await {
                        Ok(turn) => println!("{}", render_turn(turn)),
                        Err(SessionError::EmptyMessage) => {}
                        Err(SessionError::NotSignedIn) => {
                            println!("Not signed in. Use /signin first.");
                        }
                    },
                }
            }
        }
    }

    info!("chat ended");
    Ok(())
}

/// Ask one question and print the reply.
async fn handle_ask(
    mut session: Session,
    identity: Arc<GoogleIdentity>,
    message: &str,
) -> anyhow::Result<()> {
    sign_in(&mut session, &identity).await?;
    let turn = session.submit(message).await?;
    println!("{}", render_turn(turn));
    Ok(())
}

/// Print the context snapshot as JSON.
async fn handle_context(mut session: Session, identity: Arc<GoogleIdentity>) -> anyhow::Result<()> {
    sign_in(&mut session, &identity).await?;
    let json = serde_json::to_string_pretty(&session.state().context)
        .context("failed to serialize context")?;
    println!("{json}");
    Ok(())
}
