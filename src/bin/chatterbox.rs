//! Interactive chat against any OpenAI-compatible endpoint.
//!
//! # Usage
//!
//! ```bash
//! # The public endpoint, key from $CHATTERBOX_API_KEY or $OPENAI_API_KEY
//! chatterbox
//!
//! # A local server, picking one of the models it lists
//! chatterbox --base-url http://localhost:8080/v1 --model llama3
//!
//! # Through an intercepting proxy you control
//! chatterbox --proxy http://127.0.0.1:8080 --insecure
//!
//! # Disable colors (useful for piping output)
//! chatterbox --no-color
//! ```
//!
//! Diagnostics go to stderr and are filtered with `RUST_LOG` (default `warn`).
//!
//! # Commands
//!
//! While chatting, every setting can be changed with a slash command; `/help` lists them.
//! Ctrl+C while a response streams abandons it without recording it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use chatterbox::chat::{
    ChatArgs, ChatCommand, ChatConfig, OutputSink, PlainTextSink, help_text, parse_command,
};
use chatterbox::{HttpBackend, Reconciler, Reconciliation, Relay, Session, TracingLogger};

/// Main entry point for the chatterbox application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (args, _) = ChatArgs::from_command_line_relaxed("chatterbox [OPTIONS]");
    let config = ChatConfig::try_from(args)?;

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    let mut sink = PlainTextSink::with_color(config.use_color).with_interrupt(interrupted.clone());
    let backend = Arc::new(HttpBackend::new().with_logger(Arc::new(TracingLogger)));
    let mut reconciler = Reconciler::new(backend.clone());
    let relay = Relay::new(backend);
    let mut session = Session::start();

    if let Err(err) = reconciler.apply(&mut session, config.settings).await {
        sink.print_error(&format!("Keeping default settings: {err}"));
    }
    if let Some(model) = config.model {
        let next = session.settings().clone().with_model(model);
        if let Err(err) = reconciler.apply(&mut session, next).await {
            sink.print_error(&err.to_string());
        }
    }

    let mut rl = DefaultEditor::new()?;
    println!(
        "chatterbox ({} at {})",
        session.settings().model,
        session.settings().base_url
    );
    println!("Type /help for commands, /quit to exit\n");

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                if let Some(cmd) = parse_command(line) {
                    if let Some(next) = cmd.apply_to(session.settings()) {
                        match reconciler.apply(&mut session, next).await {
                            Ok(Reconciliation::Committed) => {
                                sink.print_info(&describe_change(&cmd));
                            }
                            Ok(Reconciliation::Recatalogued { .. }) => {
                                sink.print_info(&format!(
                                    "Endpoint changed; {} models available, using {}",
                                    session.catalog().len(),
                                    session.settings().model
                                ));
                            }
                            Err(err) => sink.print_error(&err.to_string()),
                        }
                        continue;
                    }
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Clear => {
                            session.restart();
                            sink.print_info("Conversation cleared.");
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Models => print_models(&session),
                        ChatCommand::ListStopSequences => {
                            print_stop_sequences(&session.settings().stop);
                        }
                        ChatCommand::Stats => print_stats(&session),
                        ChatCommand::ShowConfig => print_config(&session),
                        ChatCommand::Schema => match serde_json::to_string_pretty(&session.schema())
                        {
                            Ok(json) => println!("{json}"),
                            Err(err) => sink.print_error(&err.to_string()),
                        },
                        ChatCommand::Invalid(message) => {
                            sink.print_error(&message);
                        }
                        other => sink.print_error(&format!("Unhandled command: {other:?}")),
                    }
                    continue;
                }

                session.push_user(line);
                println!("{}:", session.settings().model);
                // The relay already showed the failure through the sink.
                let _ = relay.respond(&mut session, &mut sink).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                sink.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

fn describe_change(cmd: &ChatCommand) -> String {
    match cmd {
        ChatCommand::BaseUrl(url) => format!("base_url set to {url}"),
        ChatCommand::ApiKey(_) => "API key replaced.".to_string(),
        ChatCommand::Proxy(Some(proxy)) => format!("proxy set to {proxy}"),
        ChatCommand::Proxy(None) => "proxy cleared.".to_string(),
        ChatCommand::Insecure(true) => "Certificate validation disabled for the proxy.".to_string(),
        ChatCommand::Insecure(false) => "Certificate validation enabled.".to_string(),
        ChatCommand::Model(model) => format!("Model changed to: {model}"),
        ChatCommand::Stream(true) => "Streaming enabled.".to_string(),
        ChatCommand::Stream(false) => "Streaming disabled.".to_string(),
        ChatCommand::MaxTokens(value) => format!("max_tokens set to {value}"),
        ChatCommand::Temperature(value) => format!("temperature set to {value:.2}"),
        ChatCommand::TopP(value) => format!("top_p set to {value:.2}"),
        ChatCommand::FrequencyPenalty(value) => format!("frequency_penalty set to {value:.2}"),
        ChatCommand::PresencePenalty(value) => format!("presence_penalty set to {value:.2}"),
        ChatCommand::AddStopSequence(sequence) => format!("Added stop sequence: {sequence}"),
        ChatCommand::ClearStopSequences => "Stop sequences cleared.".to_string(),
        _ => "Settings updated.".to_string(),
    }
}

fn print_models(session: &Session) {
    println!("    Models at {}:", session.settings().base_url);
    for model in session.catalog().models() {
        let marker = if *model == session.settings().model {
            "*"
        } else {
            " "
        };
        println!("      {marker} {model}");
    }
}

fn print_stats(session: &Session) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", stats.model);
    println!("      Messages: {}", stats.message_count);
    println!("      Models available: {}", stats.catalog_size);
}

fn print_config(session: &Session) {
    let stats = session.stats();
    println!("    Current Configuration:");
    println!("      Base URL: {}", stats.base_url);
    println!(
        "      Proxy: {}",
        stats.proxy.as_deref().unwrap_or("(none)")
    );
    println!("      Insecure proxy: {}", stats.insecure);
    println!("      API key: {}", stats.api_key);
    println!("      Model: {}", stats.model);
    println!("      Stream: {}", stats.stream);
    println!("      Max tokens: {}", stats.max_tokens);
    println!("      Temperature: {:.2}", stats.temperature);
    println!("      Top-p: {:.2}", stats.top_p);
    println!("      Frequency penalty: {:.2}", stats.frequency_penalty);
    println!("      Presence penalty: {:.2}", stats.presence_penalty);
    print_stop_sequences(&stats.stop);
}

fn print_stop_sequences(stop_sequences: &[String]) {
    if stop_sequences.is_empty() {
        println!("      Stop sequences: (none)");
    } else {
        println!("      Stop sequences:");
        for seq in stop_sequences {
            println!("        - {}", seq);
        }
    }
}
