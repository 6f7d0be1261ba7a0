//! Terminal chat client
//!
//! Reads messages from stdin, streams replies from the chat endpoint and
//! prints them as they arrive.

use std::io::Write;
use std::sync::Arc;
use studyflow_chat::controller::ViewEvent;
use studyflow_chat::gateway::{initials, ApiClient};
use studyflow_chat::message::{Sender, SystemClock};
use studyflow_chat::store::{ConversationStore, EntryStatus, FileStorage};
use studyflow_chat::transport::{self, TransportConfig, WsConnector};
use studyflow_chat::{ChatConfig, ChatController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyflow_chat=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = ChatConfig::from_env()?;

    // Without a configured directory the session ends with the process
    let storage = match &config.session_dir {
        Some(dir) => FileStorage::open(dir)?,
        None => FileStorage::ephemeral()?,
    };
    tracing::info!(path = %storage.dir().display(), "Opened session storage");
    let store = ConversationStore::load(storage).with_history_limit(config.history_limit);

    greet(&config).await;

    let (transport, transport_events) = transport::spawn(
        WsConnector,
        TransportConfig::new(&config.ws_url).with_reconnect_delay(config.reconnect_delay),
    );
    let (controller, handle) =
        ChatController::new(transport.clone(), store, Arc::new(SystemClock));
    let controller = controller.with_banner_ttl(config.banner_ttl);

    let views = handle.subscribe();
    let printer = tokio::spawn(print_views(views));
    let runtime = tokio::spawn(controller.run(transport_events));
    transport.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "/quit" => break,
            "/history" => handle.replay_history().await,
            text => handle.submit(text).await,
        }
    }

    transport.shutdown();
    runtime.await?;
    printer.abort();
    Ok(())
}

/// Show who is logged in, when a token is configured
async fn greet(config: &ChatConfig) {
    let Some(token) = config.token.clone() else {
        return;
    };
    let api = match ApiClient::new(&config.api_url, Some(token)) {
        Ok(api) => api,
        Err(e) => {
            tracing::warn!(error = %e, "API client unavailable");
            return;
        }
    };
    match api.me().await {
        Ok(user) => {
            if let Some(name) = user.get("full_name").and_then(serde_json::Value::as_str) {
                println!("[{}] Signed in as {name}", initials(name));
            }
        }
        Err(e) => tracing::warn!(error = %e, "Failed to load user info"),
    }
}

async fn print_views(mut views: broadcast::Receiver<ViewEvent>) {
    let mut printer = Printer::default();
    loop {
        let event = match views.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "View printer lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        let mut out = std::io::stdout().lock();
        let _ = printer.render(&mut out, &event).and_then(|()| out.flush());
    }
}

/// Prints view events as plain lines, streaming replies in place
#[derive(Default)]
struct Printer {
    /// Bytes of the current reply already written
    streamed: usize,
}

impl Printer {
    fn render(&mut self, out: &mut impl Write, event: &ViewEvent) -> std::io::Result<()> {
        match event {
            ViewEvent::History { entries } => {
                for entry in entries {
                    let who = match entry.message.sender {
                        Sender::User => "you",
                        Sender::Bot => "bot",
                    };
                    let marker = if entry.status == EntryStatus::Abandoned {
                        " (cut off)"
                    } else {
                        ""
                    };
                    writeln!(
                        out,
                        "[{}] {who}: {}{marker}",
                        entry.message.timestamp, entry.message.text
                    )?;
                }
                Ok(())
            }
            ViewEvent::MessageAppended { message } => {
                writeln!(out, "[{}] you: {}", message.timestamp, message.text)
            }
            ViewEvent::MessageRetracted { message } => {
                writeln!(out, "-- not sent: {} --", message.text)
            }
            ViewEvent::ReplyStarted { timestamp } => {
                self.streamed = 0;
                write!(out, "[{timestamp}] bot: ")
            }
            ViewEvent::ReplyUpdated { text } => {
                let tail = text.get(self.streamed..).unwrap_or_default();
                self.streamed = text.len();
                write!(out, "{tail}")
            }
            ViewEvent::ReplyFinished { .. } => writeln!(out),
            ViewEvent::ReplyAbandoned => writeln!(out, " (cut off)"),
            ViewEvent::Connection { state } => writeln!(out, "-- connection {state} --"),
            ViewEvent::Banner { text, .. } => writeln!(out, "!! {text}"),
            ViewEvent::BannerExpired { .. } => Ok(()),
            ViewEvent::Notice { text } => writeln!(out, "-- {text} --"),
        }
    }
}
