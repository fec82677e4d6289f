//! WebSocket transport for the worker protocol.
//!
//! Each connection owns one worker for its whole lifetime, so model state is
//! per connection and starts fresh on reconnect.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use folio_core::{Outbound, Worker};
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

pub async fn upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_id = Uuid::new_v4();
    info!("Worker connection {} opened", connection_id);

    let (worker, replies) = Worker::spawn(state.worker_config(), state.loader.clone());
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        let mut replies = UnboundedReceiverStream::new(replies);
        while let Some(reply) = replies.next().await {
            let Some(frame) = encode(&reply) else {
                continue;
            };
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if worker.send_json(&text).is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        debug!("Worker stats at close: {:?}", worker.stats());
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Worker connection {} closed", connection_id);
}

fn encode(reply: &Outbound) -> Option<String> {
    match reply.to_json() {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Failed to encode worker reply: {}", e);
            None
        }
    }
}
