//! SEO chat - terminal client
//!
//! Reads lines from stdin and streams replies from the SEO assistant.
//! Ctrl-C while a reply is streaming cancels it.

use seo_chat::{
    start_keyword_discovery, ChatBackend, ClientConfig, ConversationStore, HttpBackend,
    PollingSupervisor, Role, SessionController, SessionOutcome, StoreEvent, StoreSubscription,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "Commands: /new, /open <id>, /list, /keywords <project>, /quit. Anything else is sent.";

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Send(&'a str),
    New,
    Open(&'a str),
    List,
    Keywords(&'a str),
    Help,
    Quit,
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Send(line);
        };
        let (name, arg) = rest.split_once(' ').unwrap_or((rest, ""));
        let arg = arg.trim();
        match (name, arg.is_empty()) {
            ("new", _) => Command::New,
            ("open", false) => Command::Open(arg),
            ("list", _) => Command::List,
            ("keywords", false) => Command::Keywords(arg),
            ("quit" | "exit", _) => Command::Quit,
            _ => Command::Help,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seo_chat=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ClientConfig::from_env();
    tracing::info!(api_url = %config.api_url, "SEO chat client starting");

    let backend = Arc::new(HttpBackend::new(&config)?);
    let store = ConversationStore::new();
    let controller = SessionController::from_config(Arc::clone(&backend), store.clone(), &config);
    let poller = PollingSupervisor::new();

    let printer = tokio::spawn(render_store_events(store.subscribe()));

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match Command::parse(&line) {
            Command::Send("") => {}
            Command::Send(text) => send(&controller, text).await,
            Command::New => {
                controller.start_new();
                println!("Started a new conversation.");
            }
            Command::Open(id) => match controller.open_conversation(id).await {
                Ok(count) => {
                    println!("Loaded conversation {id} ({count} messages).");
                    for message in store.messages() {
                        let who = match message.role {
                            Role::User => "you",
                            Role::Assistant => "assistant",
                        };
                        println!("[{who}] {}", message.content);
                    }
                }
                Err(e) => eprintln!("Could not open {id}: {e}"),
            },
            Command::List => match backend.list_conversations().await {
                Ok(conversations) => {
                    for conv in conversations {
                        println!(
                            "{}  {}  ({} messages, {})",
                            conv.id,
                            conv.title,
                            conv.message_count,
                            conv.created_at.format("%Y-%m-%d")
                        );
                    }
                }
                Err(e) => eprintln!("Could not list conversations: {e}"),
            },
            Command::Keywords(project_id) => {
                let mut found = start_keyword_discovery(
                    &poller,
                    Arc::clone(&backend),
                    project_id,
                    config.keyword_poll_interval,
                );
                println!("Watching {project_id} for keywords in the background.");
                let project_id = project_id.to_string();
                tokio::spawn(async move {
                    if found.changed().await.is_ok() {
                        let keywords = found.borrow_and_update().clone();
                        println!("Keywords discovered for {project_id}:");
                        for keyword in keywords {
                            println!("  {}", keyword.keyword);
                        }
                    }
                });
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => break,
        }
    }

    poller.stop();
    controller.cancel();
    printer.abort();
    Ok(())
}

async fn send<B: ChatBackend>(controller: &SessionController<B>, text: &str) {
    let session = controller.send(text, None, None);
    tokio::pin!(session);

    let result = tokio::select! {
        result = &mut session => result,
        _ = tokio::signal::ctrl_c() => {
            controller.cancel();
            session.await
        }
    };

    match result {
        Ok(SessionOutcome::Cancelled | SessionOutcome::CancelledInFlight) => println!("(cancelled)"),
        Ok(SessionOutcome::Completed { .. } | SessionOutcome::Ignored) => {}
        Err(e) => eprintln!("Error: {e}"),
    }
}

/// Print status steps and assistant replies as they land in the store.
async fn render_store_events(mut subscription: StoreSubscription) {
    let mut shown_steps = 0;
    while let Some(event) = subscription.recv().await {
        match event {
            StoreEvent::LoadingChanged(loading) => {
                if loading.status_steps.len() < shown_steps {
                    shown_steps = 0;
                }
                for step in loading.status_steps.iter().skip(shown_steps) {
                    eprintln!("  ... {step}");
                }
                shown_steps = loading.status_steps.len();
            }
            StoreEvent::Appended(message) if message.role == Role::Assistant => {
                println!("{}", message.content);
            }
            _ => {}
        }
    }
}
