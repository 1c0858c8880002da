//! WebSocket transport
//!
//! Opens client connections with tokio-tungstenite and pumps frames between
//! the socket and its [`LinkEndpoint`].

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::{
    CloseInfo, Connector, LinkCommand, LinkEndpoint, ReadyState, TransportError, TransportEvent,
};

/// Close code reported when the peer closes without a status
const NO_STATUS_CLOSE_CODE: u16 = 1005;

/// Connector for `ws://` and `wss://` endpoints
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    fn open(&self, url: &str, endpoint: LinkEndpoint) {
        let url = url.to_string();
        tokio::spawn(run_socket(url, endpoint));
    }
}

/// Drive one socket until it closes, reporting everything through `endpoint`
async fn run_socket(url: String, mut endpoint: LinkEndpoint) {
    debug!("Opening WebSocket connection to {}", url);

    let ws_stream = match connect_async(url.as_str()).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let err = TransportError::Connect(e.to_string());
            warn!("{} ({})", err, url);
            endpoint.emit(TransportEvent::Errored(err.to_string()));
            endpoint.emit(TransportEvent::Closed(CloseInfo::abnormal()));
            return;
        }
    };
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    if !endpoint.emit(TransportEvent::Opened) {
        debug!("Nobody is listening to {} anymore, closing", url);
        let _ = ws_sender.send(Message::Close(None)).await;
        endpoint.set_state(ReadyState::Closed);
        return;
    }

    let mut close_info = None;
    let mut closing = false;

    loop {
        tokio::select! {
            // Receive frames from the server
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        endpoint.emit(TransportEvent::Frame(text));
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Received binary message from {} ({} bytes), ignoring", url, data.len());
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = ws_sender.send(Message::Pong(data)).await {
                            endpoint.emit(TransportEvent::Errored(e.to_string()));
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        // Ignore pong messages
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let info = match frame {
                            Some(frame) => CloseInfo::new(Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => CloseInfo::new(Some(NO_STATUS_CLOSE_CODE), ""),
                        };
                        info!("Server {} closed the connection (code {:?})", url, info.code);
                        close_info = Some(info);
                        let _ = ws_sender.close().await;
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {
                        // Raw frame, ignore
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", url, e);
                        endpoint.emit(TransportEvent::Errored(e.to_string()));
                        break;
                    }
                    None => {
                        debug!("Stream from {} ended", url);
                        break;
                    }
                }
            }
            // Forward commands from the manager
            command = endpoint.next_command(), if !closing => {
                match command {
                    Some(LinkCommand::Send(text)) => {
                        if let Err(e) = ws_sender.send(Message::Text(text)).await {
                            error!("Failed to send frame to {}: {}", url, e);
                            endpoint.emit(TransportEvent::Errored(e.to_string()));
                            break;
                        }
                    }
                    Some(LinkCommand::Close) | None => {
                        debug!("Closing connection to {}", url);
                        closing = true;
                        endpoint.set_state(ReadyState::Closing);
                        if let Err(e) = ws_sender.send(Message::Close(None)).await {
                            debug!("Close frame to {} not delivered: {}", url, e);
                            break;
                        }
                    }
                }
            }
        }
    }

    endpoint.emit(TransportEvent::Closed(
        close_info.unwrap_or_else(CloseInfo::abnormal),
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::link_pair;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_connect_failure_reports_error_then_close() {
        // Bind then drop a listener so the port is very likely refused
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let (link, endpoint) = link_pair(events_tx);
        WebSocketConnector::new().open(&format!("ws://{addr}"), endpoint);

        match events_rx.recv().await.unwrap() {
            TransportEvent::Errored(message) => assert!(message.contains("Failed to connect")),
            other => panic!("Expected Errored, got {other:?}"),
        }
        assert_eq!(
            events_rx.recv().await.unwrap(),
            TransportEvent::Closed(CloseInfo::abnormal())
        );
        assert_eq!(link.ready_state(), ReadyState::Closed);
    }
}
