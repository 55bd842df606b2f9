// Command-line front end: account management, a matchmaking cycle, and an
// interactive chat loop over the session manager.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};

use emberchat::api::ApiClient;
use emberchat::matchmaking::MatchmakingFlow;
use emberchat::models::{Credentials, Presence};
use emberchat::{storage, DeliveryTracker, SessionEvent, SessionManager};

#[derive(Parser)]
#[command(name = "emberchat", about = "Anonymous-match chat client")]
struct Cli {
    /// REST base URL
    #[arg(long, default_value = "http://localhost:8080")]
    server: String,

    /// Chat WebSocket endpoint
    #[arg(long, default_value = "ws://localhost:8080")]
    ws: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account
    Register { email: String, password: String },
    /// Log in and store the auth token locally
    Login { email: String, password: String },
    /// Run one matchmaking search cycle
    Search,
    /// Open an interactive chat with a recipient
    Chat { recipient: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let api = ApiClient::new(&cli.server);

    match cli.command {
        Command::Register { email, password } => {
            api.register(&email, &password).await?;
            println!("Registered {}", email);
        }
        Command::Login { email, password } => {
            let token = api.login(&email, &password).await?;
            let mut state = storage::load_state()?;
            state.auth_token = Some(token);
            state.account_email = Some(email.clone());
            storage::save_state(&state)?;
            println!("Logged in as {}", email);
        }
        Command::Search => {
            let (_, email) = session_credentials()?;
            let mut flow = MatchmakingFlow::new(Arc::new(api), &email);
            match flow.search().await {
                Ok(true) => {
                    let candidate = flow
                        .take_candidate()
                        .ok_or_else(|| anyhow!("ready state without a candidate"))?;
                    storage::cache_pending_match(&candidate)?;
                    println!(
                        "Matched with {} ({}, romance {}-{})",
                        candidate.account_id,
                        candidate.matched_profile.gender,
                        candidate.matched_profile.romance_min,
                        candidate.matched_profile.romance_max
                    );
                }
                Ok(false) => println!("No match available right now"),
                Err(e) => {
                    error!("Matchmaking failed: {}", e);
                    println!("No match found ({})", e);
                }
            }
        }
        Command::Chat { recipient } => {
            let (token, email) = session_credentials()?;
            chat_loop(&cli.ws, Credentials::new(&token, &email), &recipient).await?;
        }
    }
    Ok(())
}

fn session_credentials() -> Result<(String, String)> {
    let state = storage::load_state()?;
    let token = state
        .auth_token
        .ok_or_else(|| anyhow!("not logged in: run `emberchat login` first"))?;
    let email = state
        .account_email
        .ok_or_else(|| anyhow!("not logged in: missing account email"))?;
    Ok((token, email))
}

async fn chat_loop(ws: &str, credentials: Credentials, recipient: &str) -> Result<()> {
    let account = credentials.account_id.clone();
    let session = SessionManager::new(ws);
    session
        .connect(credentials)
        .await
        .map_err(|e| anyhow!("could not open chat session: {}", e))?;
    session.send_presence(Presence::Online).await;
    session.send_chat_open(recipient).await;

    // Event printer: merges acks into the local delivery log. Outbound
    // messages are handed over before transmission so their client-generated
    // ids are known to the tracker by the time the server acknowledges them.
    let mut events = session.subscribe();
    let (outbound_tx, mut outbound) = mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        let mut tracker = DeliveryTracker::new();
        loop {
            tokio::select! {
                Some(message) = outbound.recv() => tracker.track(message),
                result = events.recv() => {
                    let event = match result {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!("Event subscription lagged, {} events skipped", missed);
                            continue;
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if let SessionEvent::NewMessage(message) = &event {
                        println!("{}: {}", message.sender_id, message.text);
                    }
                    tracker.apply(&event);
                    if let SessionEvent::DeliveryAck { local_id }
                    | SessionEvent::DeliveryFailed { local_id } = &event
                    {
                        match tracker.status(local_id) {
                            Some(status) => println!("  [{} {:?}]", local_id, status),
                            None => warn!("Ack for untracked message {}", local_id),
                        }
                    }
                }
            }
        }
    });

    info!("Chatting with {}. Ctrl-D to quit.", recipient);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        let message = emberchat::ChatMessage::outbound(&account, recipient, text);
        let local_id = message.id.clone();
        let _ = outbound_tx.send(message);
        session.send_message(recipient, text, &local_id).await;
    }

    session.send_presence(Presence::Offline).await;
    session.disconnect(false).await;
    printer.abort();
    Ok(())
}
