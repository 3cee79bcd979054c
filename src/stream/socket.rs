use axum::extract::ws::{CloseFrame, Message, WebSocket, close_code};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

use super::{Feed, FrameSink, run_session};
use crate::config::SessionSettings;

#[async_trait::async_trait]
impl FrameSink for SplitSink<WebSocket, Message> {
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error> {
        self.send(Message::Text(text.into())).await
    }

    async fn close_with_error(&mut self, reason: &str) -> Result<(), axum::Error> {
        self.send(Message::Close(Some(CloseFrame {
            code: close_code::ERROR,
            reason: reason.to_owned().into(),
        })))
        .await
    }
}

/// Runs a session over an upgraded websocket. The socket is released when
/// both halves drop at the end of the session.
pub async fn serve_socket<F: Feed>(socket: WebSocket, feed: F, settings: SessionSettings) {
    let (sink, inbound): (SplitSink<WebSocket, Message>, _) = socket.split();
    run_session(&feed, settings, sink, inbound).await;
}
