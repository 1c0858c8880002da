//! In-memory connector for tests

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Connector, LinkCommand, LinkEndpoint};

/// A socket opened through [`MockConnector`]
pub(crate) struct OpenedLink {
    pub url: String,
    pub at: Instant,
    pub endpoint: LinkEndpoint,
}

impl OpenedLink {
    /// Text frames the manager has queued so far
    pub fn sent_frames(&mut self) -> Vec<String> {
        let mut frames = Vec::new();
        while let Some(command) = self.endpoint.try_next_command() {
            if let LinkCommand::Send(text) = command {
                frames.push(text);
            }
        }
        frames
    }
}

/// Hands every opened endpoint to the test instead of touching the network
pub(crate) struct MockConnector {
    opened: mpsc::UnboundedSender<OpenedLink>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OpenedLink>) {
        let (opened, opened_rx) = mpsc::unbounded_channel();
        (Self { opened }, opened_rx)
    }
}

impl Connector for MockConnector {
    fn open(&self, url: &str, endpoint: LinkEndpoint) {
        let _ = self.opened.send(OpenedLink {
            url: url.to_string(),
            at: Instant::now(),
            endpoint,
        });
    }
}
