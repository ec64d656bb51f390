//! A terminal chat client built on `agent-bridge`.
//!
//! Configured through `AGENT_BRIDGE_*` environment variables, see
//! [`agent_bridge::EnvConfig`].

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::pin::pin;
use std::time::Duration;

use agent_bridge::EnvConfig;
use agent_bridge::core::{ChatRuntime, MessageRequest};
use agent_bridge::model::{Message, Role, Thread};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tokio::io::{self, AsyncBufReadExt};
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const BAR_CHAR: &str = "▎";

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Threads,
    Open(&'a str),
    New,
    Rename(&'a str),
    Delete(&'a str),
    Quit,
    Help,
    Unknown(&'a str),
    Prompt(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let Some(command) = line.strip_prefix('/') else {
            return Some(Self::Prompt(line));
        };
        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };
        Some(match (name, arg) {
            ("threads", _) => Self::Threads,
            ("open", id) if !id.is_empty() => Self::Open(id),
            ("new", _) => Self::New,
            ("rename", title) if !title.is_empty() => Self::Rename(title),
            ("delete", id) if !id.is_empty() => Self::Delete(id),
            ("quit" | "exit", _) => Self::Quit,
            ("help", _) => Self::Help,
            _ => Self::Unknown(line),
        })
    }
}

/// The thread being chatted in.
#[derive(Default)]
struct Current {
    thread: Option<Thread>,
    messages: Vec<Message>,
}

impl Current {
    /// Builds the request for `prompt`. The history only grows once the
    /// answer has arrived, see [`complete`](Self::complete).
    fn request(&self, thread_id: String, prompt: &str) -> MessageRequest {
        let mut messages = self.messages.clone();
        messages.push(Message::user(prompt));
        MessageRequest {
            thread_id,
            messages,
            response_id: None,
        }
    }

    fn complete(&mut self, sent: Vec<Message>, answer: &str) {
        self.messages = sent;
        self.messages.push(Message::assistant(answer));
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match EnvConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            return;
        }
    };
    let runtime = config.build_runtime(|err| {
        debug!("send failed: {err}");
    });
    println!(
        "{}Connected to {} ({:?} storage). Type /help for commands.",
        BAR_CHAR.bright_cyan(),
        runtime.provider().name().bright_white().bold(),
        runtime.storage().kind(),
    );

    list_threads(&runtime).await;

    let mut current = Current::default();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = read_line().await else {
            break;
        };
        let Some(command) = Command::parse(&line) else {
            continue;
        };

        match command {
            Command::Quit => break,
            Command::Help => print_help(),
            Command::Unknown(line) => {
                println!("{}Unknown command: {line}", BAR_CHAR.bright_red());
            }
            Command::Threads => list_threads(&runtime).await,
            Command::New => {
                current = Current::default();
                println!("{}Started a new chat.", BAR_CHAR.bright_cyan());
            }
            Command::Open(thread_id) => {
                open_thread(&runtime, &mut current, thread_id).await;
            }
            Command::Rename(title) => {
                rename_thread(&runtime, &mut current, title).await;
            }
            Command::Delete(thread_id) => {
                match runtime.delete_thread(thread_id).await {
                    Ok(()) => {
                        let is_current = current
                            .thread
                            .as_ref()
                            .is_some_and(|t| t.thread_id == thread_id);
                        if is_current {
                            current = Current::default();
                        }
                        println!("{}Deleted.", BAR_CHAR.bright_cyan());
                    }
                    Err(err) => print_error(&err),
                }
            }
            Command::Prompt(prompt) => {
                send_prompt(&runtime, &mut current, prompt).await;
            }
        }
    }
}

async fn list_threads(runtime: &ChatRuntime) {
    let threads = match runtime.fetch_thread_list().await {
        Ok(threads) => threads,
        Err(err) => {
            print_error(&err);
            return;
        }
    };
    if threads.is_empty() {
        println!("{}No threads yet.", BAR_CHAR.bright_cyan());
    }
    for thread in threads {
        println!(
            "{}{} {} {}",
            BAR_CHAR.bright_cyan(),
            thread.thread_id.dimmed(),
            thread.title.bright_white(),
            thread.created_at.format("%Y-%m-%d %H:%M").dimmed(),
        );
    }
}

async fn open_thread(
    runtime: &ChatRuntime,
    current: &mut Current,
    thread_id: &str,
) {
    let messages = match runtime.load_thread(thread_id).await {
        Ok(Some(messages)) => messages,
        Ok(None) => {
            println!("{}No such thread.", BAR_CHAR.bright_red());
            return;
        }
        Err(err) => {
            print_error(&err);
            return;
        }
    };
    let thread = match runtime.fetch_thread_list().await {
        Ok(threads) => threads.into_iter().find(|t| t.thread_id == thread_id),
        Err(err) => {
            warn!("failed to look up thread metadata: {err}");
            None
        }
    };

    for message in &messages {
        print_message(message);
    }
    *current = Current {
        thread: Some(
            thread.unwrap_or_else(|| Thread {
                thread_id: thread_id.to_owned(),
                ..Thread::new("New Chat")
            }),
        ),
        messages,
    };
}

async fn rename_thread(
    runtime: &ChatRuntime,
    current: &mut Current,
    title: &str,
) {
    let Some(thread) = current.thread.as_mut() else {
        println!("{}No thread is open.", BAR_CHAR.bright_red());
        return;
    };
    thread.title = title.to_owned();
    match runtime.update_thread(thread).await {
        Ok(()) => println!("{}Renamed.", BAR_CHAR.bright_cyan()),
        Err(err) => print_error(&err),
    }
}

async fn send_prompt(
    runtime: &ChatRuntime,
    current: &mut Current,
    prompt: &str,
) {
    let thread_id = match &current.thread {
        Some(thread) => thread.thread_id.clone(),
        None => match runtime.create_thread(prompt).await {
            Ok(thread) => {
                let thread_id = thread.thread_id.clone();
                current.thread = Some(thread);
                thread_id
            }
            Err(err) => {
                print_error(&err);
                return;
            }
        },
    };
    let progress_style = ProgressStyle::with_template("{spinner} {wide_msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
    let progress_bar = ProgressBar::new_spinner();
    progress_bar.set_style(progress_style);
    progress_bar.set_message("🤔 Thinking...");

    let cancellation = CancellationToken::new();
    let req = current.request(thread_id, prompt);
    let sent = req.messages.clone();
    let sending = runtime.process_message(req, Some(cancellation.clone()));
    let mut sending = pin!(sending);
    let stream = loop {
        select! {
            result = &mut sending => break result,
            _ = sleep(Duration::from_millis(100)) => progress_bar.inc(1),
        }
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(err) => {
            progress_bar.finish_and_clear();
            print_error(&err);
            return;
        }
    };

    let mut stream = pin!(stream);
    let mut interrupt = pin!(tokio::signal::ctrl_c());
    let mut started = false;
    loop {
        let next = select! {
            next = stream.next() => next,
            _ = sleep(Duration::from_millis(100)), if !started => {
                progress_bar.inc(1);
                continue;
            }
            _ = &mut interrupt => {
                cancellation.cancel();
                progress_bar.finish_and_clear();
                println!("\n{}Interrupted.", BAR_CHAR.bright_yellow());
                return;
            }
        };
        if !started {
            // Finish the progress bar before printing anything else.
            progress_bar.finish_and_clear();
            print!("{}🤖 ", BAR_CHAR.bright_cyan());
            started = true;
        }
        match next {
            Some(Ok(fragment)) => {
                print!("{}", String::from_utf8_lossy(&fragment).bright_white());
                std::io::stdout().flush().ok();
            }
            Some(Err(err)) => {
                println!();
                print_error(&err);
                return;
            }
            None => break,
        }
    }
    println!();
    current.complete(sent, stream.content());
}

fn print_message(message: &Message) {
    match message.role {
        Role::User => {
            println!("{}> {}", BAR_CHAR.dimmed(), message.content.dimmed());
        }
        Role::Assistant => println!(
            "{}🤖 {}",
            BAR_CHAR.bright_cyan(),
            message.content.bright_white()
        ),
    }
}

fn print_error(err: &agent_bridge::model::Error) {
    println!("{}❌ {}", BAR_CHAR.bright_red(), err.bright_red());
}

fn print_help() {
    let bar = BAR_CHAR.bright_cyan();
    println!("{bar}/threads         list threads, newest first");
    println!("{bar}/open <id>       continue a thread");
    println!("{bar}/new             start a new chat");
    println!("{bar}/rename <title>  rename the open thread");
    println!("{bar}/delete <id>     delete a thread");
    println!("{bar}/quit            exit");
}

async fn read_line() -> Option<String> {
    let mut stdin = io::BufReader::new(io::stdin());
    let mut line = String::new();

    match stdin.read_line(&mut line).await {
        Ok(count) => {
            if count == 0 {
                return None;
            }
            Some(line)
        }
        Err(err) => {
            error!("error reading input: {}", err);
            None
        }
    }
}
