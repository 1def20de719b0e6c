use anyhow::{Context, Result};
use myth_rs::api::create_provider;
use myth_rs::chat::Speaker;
use myth_rs::config::AppConfig;
use myth_rs::constants::APP_NAME;
use myth_rs::format::{Formatting, Selection};
use myth_rs::speech::{SpeechInput, SpeechRecognizer};
use myth_rs::store::{FileStore, StoreAdapter};
use myth_rs::tone::Tone;
use myth_rs::{ChatOutcome, Coordinator, CoordinatorEvent, OperationOutcome};
use std::io::Write;
use std::rc::Rc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

const HELP: &str = "\
Commands:
  :correct                  fix grammar and spelling
  :enhance <tone>           rewrite in a tone (Professional, Casual, ...)
  :chat <message>           ask the assistant
  :chat-reset               start a new conversation
  :history                  list past operations
  :apply <id>               restore a history entry
  :clear-history            delete all history
  :bold|:italic|:underline <start> <end>
  :find <query>             select the first match
  :next | :prev             move between matches
  :replace-all <query> <replacement>
  :listen                   dictate (needs a speech backend)
  :theme                    toggle light/dark
  :show                     print the document
  :quit
Any other line is appended to the document.";

/// Terminals have no speech backend.
struct NoSpeech;

impl SpeechRecognizer for NoSpeech {
    fn is_supported(&self) -> bool {
        false
    }

    fn start(&mut self, _language: &str) -> Result<()> {
        anyhow::bail!("no speech backend")
    }

    fn stop(&mut self) {}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = AppConfig::load();

    let provider_config = config
        .resolved_provider()
        .context("active provider is not configured")?;
    let provider = create_provider(&provider_config);
    let store = StoreAdapter::new(Rc::new(FileStore::new(config.store_dir())));
    let coordinator = Coordinator::new(provider, store, config.history_limit);
    let mut speech = SpeechInput::new(NoSpeech);

    println!("{} ({})", APP_NAME, coordinator.provider_name());
    if !coordinator.check_backend().await {
        println!("Warning: {} is not reachable right now.", coordinator.provider_name());
    }
    if let Some(greeting) = coordinator.transcript().messages().first() {
        println!("{}", greeting.text);
    }
    println!("Type :help for commands.");

    let mut events = coordinator.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let (command, rest) = match line.strip_prefix(':') {
            Some(cmd) => cmd.split_once(' ').unwrap_or((cmd, "")),
            None => {
                let text = coordinator.text();
                let joined = if text.is_empty() { line.clone() } else { format!("{}\n{}", text, line) };
                coordinator.set_text(joined);
                drain(&mut events);
                continue;
            }
        };
        let rest = rest.trim();

        match command {
            "quit" | "q" => break,
            "help" => println!("{}", HELP),
            "show" => println!("{}", coordinator.text()),
            "correct" => report(coordinator.correct().await, &coordinator),
            "enhance" => match rest.parse::<Tone>() {
                Ok(tone) => report(coordinator.enhance(tone).await, &coordinator),
                Err(e) => println!("{}. Tones: {:?}", e, Tone::ALL.map(Tone::label)),
            },
            "chat" => chat(&coordinator, &mut events, rest).await,
            "chat-reset" => {
                if coordinator.reset_chat() {
                    println!("New conversation.");
                }
            }
            "history" => {
                let history = coordinator.history();
                if history.is_empty() {
                    println!("No history yet.");
                }
                for entry in history.entries() {
                    let tone = entry.tone.map(|t| format!(" ({})", t)).unwrap_or_default();
                    println!(
                        "{}  {:?}{}  {}  {:?}",
                        entry.id,
                        entry.kind,
                        tone,
                        entry.timestamp.format("%Y-%m-%d %H:%M"),
                        entry.result
                    );
                }
            }
            "apply" => {
                if !coordinator.apply_history(rest) {
                    println!("No entry {}", rest);
                }
            }
            "clear-history" => coordinator.clear_history(),
            "bold" | "italic" | "underline" => {
                let kind = match command {
                    "bold" => Formatting::Bold,
                    "italic" => Formatting::Italic,
                    _ => Formatting::Underline,
                };
                match parse_range(rest) {
                    Some(selection) => {
                        coordinator.select(Some(selection));
                        if !coordinator.format(kind) {
                            println!("Selection out of range");
                        }
                    }
                    None => println!("Usage: :{} <start> <end>", command),
                }
            }
            "find" => {
                coordinator.search(rest);
                println!("{}", coordinator.find_position());
            }
            "next" => {
                coordinator.find_next();
                println!("{}", coordinator.find_position());
            }
            "prev" => {
                coordinator.find_prev();
                println!("{}", coordinator.find_position());
            }
            "replace-all" => match rest.split_once(' ') {
                Some((query, replacement)) => {
                    coordinator.search(query);
                    coordinator.set_replacement(replacement);
                    println!("Replaced {}", coordinator.replace_all());
                }
                None => println!("Usage: :replace-all <query> <replacement>"),
            },
            "listen" => {
                if let Err(e) = speech.toggle_listening() {
                    tracing::debug!("{}", e);
                }
                if let Some(message) = speech.error() {
                    println!("{}", message);
                }
            }
            "theme" => println!("Theme: {:?}", coordinator.toggle_theme()),
            other => println!("Unknown command :{} (try :help)", other),
        }
        drain(&mut events);
    }

    Ok(())
}

fn parse_range(args: &str) -> Option<Selection> {
    let mut parts = args.split_whitespace().map(str::parse::<usize>);
    let start = parts.next()?.ok()?;
    let end = parts.next()?.ok()?;
    Selection::new(start, end)
}

fn report(outcome: OperationOutcome, coordinator: &Coordinator) {
    match outcome {
        OperationOutcome::Applied => println!("{}", coordinator.text()),
        OperationOutcome::Unchanged => println!("No changes needed."),
        OperationOutcome::Rejected => println!("Nothing to do."),
        OperationOutcome::Failed(message) => println!("Error: {}", message),
    }
}

/// Prints only what is new in each transcript update.
#[derive(Default)]
struct ReplyPrinter {
    index: Option<usize>,
    printed: usize,
}

impl ReplyPrinter {
    fn update(&mut self, event: CoordinatorEvent) {
        let CoordinatorEvent::TranscriptUpdated { index, message } = event else {
            return;
        };
        if message.role != Speaker::Model {
            return;
        }
        if self.index != Some(index) {
            if self.index.is_some() {
                println!();
            }
            self.index = Some(index);
            self.printed = 0;
        }
        if let Some(delta) = message.text.get(self.printed..) {
            print!("{}", delta);
            let _ = std::io::stdout().flush();
            self.printed = message.text.len();
        }
    }
}

async fn chat(coordinator: &Coordinator, events: &mut UnboundedReceiver<CoordinatorEvent>, message: &str) {
    drain(events);
    let reply = coordinator.send_chat(message);
    tokio::pin!(reply);
    let mut printer = ReplyPrinter::default();

    let outcome = loop {
        tokio::select! {
            outcome = &mut reply => break outcome,
            Some(event) = events.recv() => printer.update(event),
        }
    };
    while let Ok(event) = events.try_recv() {
        printer.update(event);
    }

    match outcome {
        ChatOutcome::Rejected => println!("Nothing to send."),
        ChatOutcome::Replied(_) | ChatOutcome::Failed(_) => println!(),
    }
}

fn drain(events: &mut UnboundedReceiver<CoordinatorEvent>) {
    while let Ok(event) = events.try_recv() {
        tracing::trace!("{:?}", event);
    }
}
