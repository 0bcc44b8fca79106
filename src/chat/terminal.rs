//! Line-oriented terminal front end for [`ChatSession`].

use std::io::Write;

use colored::Colorize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use serde_json::Value;

use super::{AgentApi, ChatError, ChatSession, Exchange};
use crate::core::{MessageVecExt, Result, Role};

/// What the loop should do with one line of input.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Quit,
    History,
    Skip,
    Send(&'a str),
}

pub fn parse_command(line: &str) -> Command<'_> {
    let line = line.trim();
    match line {
        "" => Command::Skip,
        "/quit" | "/exit" => Command::Quit,
        "/history" => Command::History,
        text => Command::Send(text),
    }
}

fn print_banner(url: &str) {
    println!("{}", "AI Support Agent".bright_cyan().bold());
    println!("{}", "Sentiment Tool + Agent + Groq LLM".dimmed());
    println!(
        "{}",
        format!("agent endpoint: {url}  (/history, /quit)").dimmed()
    );
}

fn print_entry(role: Role, content: &str) {
    let label = match role {
        Role::User => "You".bright_green().bold(),
        Role::Assistant => "Agent".bright_cyan().bold(),
    };
    println!("{label}:");
    println!("{content}\n");
}

/// The reply body to dump in debug mode, for successes and malformed replies.
pub fn debug_payload(outcome: &std::result::Result<Exchange, ChatError>) -> Option<&Value> {
    match outcome {
        Ok(exchange) => Some(&exchange.raw),
        Err(e) => e.raw(),
    }
}

fn prompt() {
    print!("{} ", "You>".bright_green().bold());
    let _ = std::io::stdout().flush();
}

/// Run the chat loop until `/quit`, `/exit` or end of input.
///
/// With `debug`, the raw reply JSON is printed before the rendered reply or
/// the format error.
pub async fn run<A, R>(session: &mut ChatSession<A>, input: R, url: &str, debug: bool) -> Result<()>
where
    A: AgentApi,
    R: AsyncBufRead + Unpin,
{
    print_banner(url);
    let mut lines = input.lines();

    loop {
        prompt();
        let Some(line) = lines.next_line().await? else {
            println!();
            break;
        };

        match parse_command(&line) {
            Command::Skip => continue,
            Command::Quit => break,
            Command::History => {
                if session.history().is_empty() {
                    println!("{}", "(no messages yet)".dimmed());
                }
                for message in session.history() {
                    print_entry(message.role(), message.content());
                }
            }
            Command::Send(text) => {
                let outcome = session.submit(text).await;
                if debug {
                    if let Some(raw) = debug_payload(&outcome) {
                        println!("{}", "DEBUG - Full API Response:".yellow());
                        println!("{}", serde_json::to_string_pretty(raw)?);
                    }
                }
                match outcome {
                    Ok(_) => {
                        if let Some(reply) = session.history().last_assistant() {
                            print_entry(Role::Assistant, reply);
                        }
                    }
                    Err(e) => println!("{}", e.to_string().red()),
                }
            }
        }
    }

    tracing::debug!(messages = session.history().len(), "chat session ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::AgentReply;
    use serde_json::json;

    #[test]
    fn commands_are_recognised() {
        assert_eq!(parse_command("  "), Command::Skip);
        assert_eq!(parse_command("/quit"), Command::Quit);
        assert_eq!(parse_command("/exit\n"), Command::Quit);
        assert_eq!(parse_command("/history"), Command::History);
        assert_eq!(parse_command("  where is my order? "), Command::Send("where is my order?"));
    }

    #[test]
    fn malformed_replies_are_dumped_in_debug_mode() {
        let body = json!({"detail": "agent crashed", "trace": "xyz"});
        let outcome = AgentReply::from_value(&body).map(|reply| Exchange {
            raw: body.clone(),
            reply,
        });
        assert!(outcome.is_err());
        assert_eq!(debug_payload(&outcome), Some(&body));

        let failed: std::result::Result<Exchange, ChatError> =
            Err(ChatError::Request("request timed out".into()));
        assert_eq!(debug_payload(&failed), None);
    }
}
