//! Interactive PRD chat session loop
//!
//! A rustyline REPL drives one generation at a time: while a call is in
//! flight the loop is awaiting it, so there is no way to submit a second
//! prompt — the terminal equivalent of the original UI disabling its input
//! control during generation.
//!
//! Streamed fragments print as they arrive and accumulate in a transient
//! buffer; the assistant message is appended to the session only when the
//! generation completes. Text already printed before a mid-stream failure
//! is preserved in the transcript.

use std::io::Write;
use std::sync::{Arc, Mutex};

use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::client::{RelayClient, StreamCallbacks};
use crate::config::Config;
use crate::error::{PrdgenError, Result};
use crate::export::export_markdown;
use crate::session::{ChatMessage, Role, SessionStatus, SessionStore};

/// Control flow decision after a special command.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Run the interactive chat loop until the user quits.
///
/// # Arguments
///
/// * `config` - Loaded configuration (relay endpoint, chat settings)
///
/// # Errors
///
/// Returns error if the relay client or line editor cannot be constructed;
/// per-generation failures are reported inline and do not end the loop.
pub async fn run_chat(config: Config) -> Result<()> {
    let client = RelayClient::from_config(&config.relay)?;

    println!("{}", "prdgen - PRD generation chat".bold());
    println!("Relay endpoint: {}", client.endpoint());
    println!("Type a product idea to generate a PRD. {} for commands.\n", "/help".cyan());

    let mut store = SessionStore::new();
    store.create_session();

    let mut editor = DefaultEditor::new()?;

    loop {
        match editor.readline(">> ") {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(input);

                if input.starts_with('/') {
                    if handle_special_command(input, &mut store, &config) == Flow::Quit {
                        break;
                    }
                    continue;
                }

                run_generation(&client, &mut store, &config, input).await?;
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }

    println!("Goodbye.");
    Ok(())
}

/// Run one generation turn against the active session.
async fn run_generation(
    client: &RelayClient,
    store: &mut SessionStore,
    config: &Config,
    input: &str,
) -> Result<()> {
    let title_max = config.chat.title_max_chars;

    let conversation_id = {
        let session = store
            .active_session_mut()
            .ok_or_else(|| PrdgenError::Session("no active session".to_string()))?;
        session.push_message(ChatMessage::new(Role::User, input), title_max);
        session.conversation_id.clone()
    };

    // Transient accumulation; becomes a ChatMessage only on completion.
    let answer = Arc::new(Mutex::new(String::new()));
    let completion = Arc::new(Mutex::new(None::<(String, String)>));
    let failure = Arc::new(Mutex::new(None::<String>));

    let callbacks = StreamCallbacks::new()
        .on_chunk({
            let answer = Arc::clone(&answer);
            move |fragment| {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
                answer.lock().unwrap().push_str(fragment);
            }
        })
        .on_complete({
            let completion = Arc::clone(&completion);
            move |message_id, conversation_id| {
                *completion.lock().unwrap() =
                    Some((message_id.to_string(), conversation_id.to_string()));
            }
        })
        .on_error({
            let failure = Arc::clone(&failure);
            move |error| {
                *failure.lock().unwrap() = Some(error.to_string());
            }
        });

    println!();
    client
        .send_message(input, conversation_id.as_deref(), callbacks)
        .await?;
    println!();

    let session = store
        .active_session_mut()
        .ok_or_else(|| PrdgenError::Session("active session vanished".to_string()))?;

    if let Some(description) = failure.lock().unwrap().take() {
        println!("{}", "Generation failed".red().bold());
        println!("{}\n", description);

        // Keep whatever streamed before the failure.
        let partial = answer.lock().unwrap().clone();
        if !partial.is_empty() {
            session.push_message(ChatMessage::new(Role::Assistant, partial), title_max);
        }
        return Ok(());
    }

    if let Some((message_id, final_conversation_id)) = completion.lock().unwrap().take() {
        let text = answer.lock().unwrap().clone();
        session.push_message(
            ChatMessage::with_upstream_id(Role::Assistant, text, &message_id),
            title_max,
        );
        session.set_conversation_id(&final_conversation_id);
        session.set_status(SessionStatus::Completed);
        println!();
    }

    Ok(())
}

/// Handle a `/`-prefixed special command.
fn handle_special_command(input: &str, store: &mut SessionStore, config: &Config) -> Flow {
    let mut parts = input.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let argument = parts.next().map(str::trim).unwrap_or_default();

    match command {
        "/quit" | "/exit" => return Flow::Quit,
        "/help" => print_help(),
        "/new" => {
            store.create_session();
            println!("Started a new session.\n");
        }
        "/sessions" => list_sessions(store),
        "/switch" => {
            if argument.is_empty() {
                println!("Usage: /switch <session-id>\n");
            } else if store.switch_to(argument) {
                println!("Switched to session {}.\n", argument);
            } else {
                println!("No session with id {}.\n", argument);
            }
        }
        "/export" => export_active_session(store, config),
        other => println!("Unknown command {}. Try {}.\n", other, "/help".cyan()),
    }
    Flow::Continue
}

fn print_help() {
    println!("Commands:");
    println!("  /new               start a new session");
    println!("  /sessions          list sessions");
    println!("  /switch <id>       switch the active session");
    println!("  /export            export the last answer to markdown");
    println!("  /quit              leave the chat\n");
}

fn list_sessions(store: &SessionStore) {
    if store.is_empty() {
        println!("No sessions yet.\n");
        return;
    }
    let active_id = store.active_session().map(|s| s.id.clone()).unwrap_or_default();
    for session in store.sessions() {
        let marker = if session.id == active_id { "*" } else { " " };
        println!(
            "{} {}  [{}] {} ({} messages)",
            marker,
            session.id,
            session.status,
            session.title,
            session.messages.len()
        );
    }
    println!();
}

/// Export the active session's last answer to the configured directory.
fn export_active_session(store: &mut SessionStore, config: &Config) {
    let Some(session) = store.active_session_mut() else {
        println!("No active session.\n");
        return;
    };
    let Some(message) = session.last_assistant_message().cloned() else {
        println!("Nothing to export yet.\n");
        return;
    };

    if let Err(e) = std::fs::create_dir_all(&config.chat.export_dir) {
        println!("{} {}\n", "Export failed:".red(), e);
        return;
    }

    let path = std::path::Path::new(&config.chat.export_dir)
        .join(format!("prd-{}.md", &session.id[..8.min(session.id.len())]));

    if export_markdown(&message, &session.title, &path) {
        session.set_status(SessionStatus::Exported);
        println!("Exported to {}.\n", path.display());
    } else {
        println!("{} could not write {}\n", "Export failed:".red(), path.display());
    }
}
