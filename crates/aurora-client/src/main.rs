//! # aurora-chat
//!
//! Terminal front-end for the Aurora chat client.
//!
//! ```text
//! aurora-chat <me> <peer>
//! ```
//!
//! Lines typed on stdin are sent to the open conversation. Commands:
//! `/open <peer>`, `/close`, `/retry <id>`, `/quit`. Chat output goes to
//! stdout, logs to stderr.

use std::sync::Arc;

use anyhow::{bail, Context};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use aurora_client::commands::Command;
use aurora_client::{ChatPanel, ClientConfig, Conversation, MessageId, MessageView, SendOutcome};
use aurora_net::{HttpHistory, WsTransport};
use aurora_shared::constants::APP_NAME;
use aurora_shared::Identity;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("aurora_client=info,aurora_net=info,warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // -----------------------------------------------------------------------
    // 2. Arguments and configuration
    // -----------------------------------------------------------------------
    let mut args = std::env::args().skip(1);
    let (Some(me), Some(peer)) = (args.next(), args.next()) else {
        bail!("usage: aurora-chat <me> <peer>");
    };
    let me = Identity::new(me).context("Invalid local identity")?;
    let peer = Identity::new(peer).context("Invalid peer identity")?;

    let config = ClientConfig::from_env();
    info!(?config, "Loaded configuration");
    let endpoints = config.endpoints().context("Invalid backend URLs")?;

    // -----------------------------------------------------------------------
    // 3. Open the first conversation
    // -----------------------------------------------------------------------
    let history = Arc::new(HttpHistory::new(endpoints.clone()));
    let transport = Arc::new(WsTransport::new(endpoints).with_capacity(config.channel_capacity));
    let mut panel = ChatPanel::new(me, history, transport, config.session_options());
    let out = Output {
        json: config.json_output,
    };

    info!(me = %panel.me(), "Starting {APP_NAME} chat v{}", env!("CARGO_PKG_VERSION"));
    open_conversation(&mut panel, peer, &out).await;

    // -----------------------------------------------------------------------
    // 4. Event loop: input, live events and in-flight sends
    // -----------------------------------------------------------------------
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight: FuturesUnordered<BoxFuture<'static, SendOutcome>> = FuturesUnordered::new();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };

                match Command::parse(&line) {
                    Command::Quit => break,
                    Command::Open(name) => match Identity::new(name) {
                        Ok(peer) => {
                            // Sends of the old conversation die with it
                            in_flight = FuturesUnordered::new();
                            open_conversation(&mut panel, peer, &out).await;
                        }
                        Err(e) => out.notice(&e.to_string()),
                    },
                    Command::Close => {
                        in_flight = FuturesUnordered::new();
                        panel.close();
                        out.notice("conversation closed");
                    }
                    Command::Retry(id) => {
                        let Some(conversation) = panel.conversation_mut() else {
                            out.notice("no open conversation");
                            continue;
                        };
                        match conversation.retry(id) {
                            Some(send) => {
                                out.message(conversation, id);
                                in_flight.push(send.dispatch().boxed());
                            }
                            None => out.notice(&format!("message {id} cannot be retried")),
                        }
                    }
                    Command::Say(text) => {
                        let Some(conversation) = panel.conversation_mut() else {
                            out.notice("no open conversation, use /open <peer>");
                            continue;
                        };
                        let blank = text.trim().is_empty();
                        conversation.set_compose(text);
                        match conversation.stage_send() {
                            Some(send) => {
                                out.message(conversation, send.id());
                                in_flight.push(send.dispatch().boxed());
                            }
                            None if !blank => out.notice("not connected, message not sent"),
                            None => {}
                        }
                    }
                    Command::Invalid(hint) => out.notice(&hint),
                }
            }

            frame = panel.next_live() => match frame {
                Some(frame) => {
                    if let Some(conversation) = panel.conversation_mut() {
                        if let Some(id) = conversation.receive_live(frame) {
                            out.message(conversation, id);
                        }
                    }
                }
                None => out.notice("live connection lost, /open the conversation again to reconnect"),
            },

            Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                if let Some(conversation) = panel.conversation_mut() {
                    let id = outcome.id;
                    if conversation.complete_send(outcome).is_some() {
                        out.message(conversation, id);
                    }
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    panel.close();
    info!("Aurora chat stopped");
    Ok(())
}

async fn open_conversation(panel: &mut ChatPanel, peer: Identity, out: &Output) {
    match panel.open(peer).await {
        Ok(conversation) => {
            out.notice(&format!(
                "conversation with {} ({} earlier messages, key fingerprint {})",
                conversation.peer(),
                conversation.messages().len(),
                conversation.key_fingerprint()
            ));
            for message in conversation.messages().iter() {
                out.view(&MessageView::from(message));
            }
            if !conversation.is_connected() {
                out.notice("live connection unavailable, messages cannot be sent");
            }
        }
        Err(e) => out.notice(&e.to_string()),
    }
}

/// Chat output on stdout, either text lines or JSON lines.
struct Output {
    json: bool,
}

impl Output {
    fn message(&self, conversation: &Conversation, id: MessageId) {
        if let Some(message) = conversation.message(id) {
            self.view(&MessageView::from(message));
        }
    }

    fn view(&self, view: &MessageView) {
        if !self.json {
            println!("{}", view.render_line());
            return;
        }
        match serde_json::to_string(view) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "Failed to serialize message view"),
        }
    }

    fn notice(&self, text: &str) {
        if self.json {
            println!("{}", serde_json::json!({ "notice": text }));
        } else {
            println!("-- {text}");
        }
    }
}
