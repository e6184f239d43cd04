use anyhow::Result;
use colored::Colorize;
use std::io::{self, BufRead, Write};

use rescue_assist::Assistant;
use rescue_assist::config::Config;
use rescue_assist::models::{ChatEvent, MessagePayload, NewsArticle, SessionState};
use rescue_assist::session::ChatSession;
use tokio::sync::mpsc::UnboundedReceiver;

/// The controller is single-threaded and cooperative; the reveal task is
/// the only background activity, so a current-thread runtime is all the
/// assistant needs.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load();
    let assistant = Assistant::new(config)?;
    let (mut session, mut events) = assistant.new_session();

    let name = assistant.config().assistant.name.clone();
    println!("{}", format!("{name} — type /help for commands").bold());
    print_bot_line(&name, &assistant.config().assistant.greeting);

    let stdin = io::stdin();
    let mut lock = stdin.lock();
    let mut line = String::new();
    loop {
        line.clear();
        print!("> ");
        io::stdout().flush()?;
        if lock.read_line(&mut line)? == 0 {
            println!("Good Bye!");
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "/quit" | "/exit" => {
                println!("Good Bye!");
                break;
            }
            "/help" => print_help(),
            "/new" => {
                session.new_chat();
                drain(&mut events);
                print_bot_line(&name, &assistant.config().assistant.greeting);
            }
            "/news" => match assistant.latest_news().await {
                Ok(articles) if !articles.is_empty() => print_articles(&articles),
                Ok(_) => println!("No recent disaster news found."),
                Err(e) => eprintln!("error: {e}"),
            },
            "/alerts" => match assistant.current_alerts().await {
                Ok(items) if !items.is_empty() => {
                    for item in items {
                        let date = item
                            .published
                            .map(|d| d.format("%Y-%m-%d %H:%M UTC").to_string())
                            .unwrap_or_else(|| "No date".to_string());
                        println!("{} {}", "•".red(), item.title.bold());
                        println!("  {} - {} | {}", item.creator, date, item.link);
                    }
                }
                Ok(_) => println!("No alerts in range right now."),
                Err(e) => eprintln!("error: {e}"),
            },
            _ => {
                if let Err(e) = session.submit(input).await {
                    eprintln!("error: {e}");
                    continue;
                }
                show_response(&name, &mut session, &mut events).await;
            }
        }
    }
    Ok(())
}

/// Print the bot's answer for the submission that just went through: either
/// the complete payload (articles, apologies) or the live typing effect,
/// which Ctrl-C cuts short.
async fn show_response(
    name: &str,
    session: &mut ChatSession,
    events: &mut UnboundedReceiver<ChatEvent>,
) {
    if session.state() != SessionState::Revealing {
        let messages = session.messages();
        if let Some(message) = messages.last() {
            match &message.payload {
                MessagePayload::Text(text) => print_bot_line(name, text),
                MessagePayload::Articles(articles) => print_articles(articles),
            }
        }
        drain(events);
        return;
    }

    print!("{} ", format!("{name}:").cyan().bold());
    let _ = io::stdout().flush();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                session.stop();
                println!();
                break;
            }
            event = events.recv() => match event {
                Some(ChatEvent::RevealDelta { chunk, .. }) => {
                    print!("{chunk}");
                    let _ = io::stdout().flush();
                }
                Some(ChatEvent::RevealDone { .. }) => {
                    println!();
                    break;
                }
                Some(_) => {}
                None => break,
            }
        }
    }
    drain(events);
}

fn print_bot_line(name: &str, text: &str) {
    println!("{} {text}", format!("{name}:").cyan().bold());
}

fn print_articles(articles: &[NewsArticle]) {
    for article in articles {
        println!(
            "{} {} {}",
            "•".red(),
            format!("[{}]", article.category).yellow(),
            article.title.bold()
        );
        println!(
            "  {} - {} | {}",
            article.source,
            article.published_at.format("%Y-%m-%d %H:%M UTC"),
            article.url
        );
    }
}

fn print_help() {
    println!("Commands:");
    println!("  /news    latest filtered disaster news");
    println!("  /alerts  current GDACS alerts (near you, when a location is set)");
    println!("  /new     start a new conversation");
    println!("  /quit    exit");
    println!("Anything else is sent to the assistant. Ctrl-C stops a reply mid-typing.");
}

fn drain(events: &mut UnboundedReceiver<ChatEvent>) {
    while events.try_recv().is_ok() {}
}
