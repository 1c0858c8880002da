//! Terminal presenter
//!
//! Renders connection status, the chat transcript and reply prompts to a
//! writer, and turns input lines into client actions.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::client::{ConnectionEvent, ConnectionEventKind, ConnectionManager};
use crate::protocol::{ChatUpdate, HumanInputRequest};

/// Prefix that turns an input line into a human input response
pub const REPLY_COMMAND: &str = "/reply";

/// Input line that ends the session
pub const QUIT_COMMAND: &str = "/quit";

/// Status label shown for a connection event
pub fn status_label(event: &ConnectionEvent) -> &'static str {
    match event {
        ConnectionEvent::Open => "Connected",
        ConnectionEvent::Close(_) => "Disconnected",
        ConnectionEvent::Error(_) => "Error",
    }
}

/// What to do with one line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    /// Blank line
    Ignore,
    /// Send as a chat message
    Send(String),
    /// Answer the pending human input request
    Reply(String),
    /// Disconnect and exit
    Quit,
}

/// Classify an input line
pub fn parse_input(line: &str) -> InputCommand {
    let line = line.trim();
    if line.is_empty() {
        return InputCommand::Ignore;
    }
    if line == QUIT_COMMAND {
        return InputCommand::Quit;
    }
    if let Some(rest) = line.strip_prefix(REPLY_COMMAND) {
        if rest.is_empty() || rest.starts_with(char::is_whitespace) {
            let reply = rest.trim();
            if reply.is_empty() {
                return InputCommand::Ignore;
            }
            return InputCommand::Reply(reply.to_string());
        }
    }
    InputCommand::Send(line.to_string())
}

/// Writes chat state to a terminal (or any writer)
pub struct ChatView<W: Write> {
    out: W,
}

impl<W: Write> ChatView<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn show_status(&mut self, status: &str) -> io::Result<()> {
        writeln!(self.out, "[{status}]")?;
        self.out.flush()
    }

    /// Reprint the whole transcript
    pub fn show_history(&mut self, update: &ChatUpdate) -> io::Result<()> {
        writeln!(self.out, "----------------------------------------")?;
        for (user, agent) in &update.history {
            if let Some(user) = user {
                writeln!(self.out, "you> {user}")?;
            }
            if let Some(agent) = agent {
                writeln!(self.out, "agent> {agent}")?;
            }
        }
        self.out.flush()
    }

    pub fn show_prompt(&mut self, request: &HumanInputRequest) -> io::Result<()> {
        writeln!(
            self.out,
            "Reply to: {} (answer with {} <text>)",
            request.prompt, REPLY_COMMAND
        )?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Register the listeners that keep `view` in sync with `manager`
pub fn wire_view<W>(manager: &ConnectionManager, view: &Arc<Mutex<ChatView<W>>>)
where
    W: Write + Send + 'static,
{
    for kind in [
        ConnectionEventKind::Open,
        ConnectionEventKind::Close,
        ConnectionEventKind::Error,
    ] {
        let view = Arc::clone(view);
        manager.on_connection(kind, move |event| {
            render(&view, |v| v.show_status(status_label(event)));
        });
    }

    let history_view = Arc::clone(view);
    manager.on_payload(move |update: ChatUpdate| {
        render(&history_view, |v| v.show_history(&update));
    });

    let prompt_view = Arc::clone(view);
    manager.on_payload(move |request: HumanInputRequest| {
        render(&prompt_view, |v| v.show_prompt(&request));
    });
}

fn render<W: Write>(
    view: &Mutex<ChatView<W>>,
    draw: impl FnOnce(&mut ChatView<W>) -> io::Result<()>,
) {
    let mut view = view.lock().unwrap_or_else(PoisonError::into_inner);
    if let Err(e) = draw(&mut view) {
        warn!("Failed to update console: {}", e);
    }
}
