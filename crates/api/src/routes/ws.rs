use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use common::Error;

use crate::{hub::SubscriberId, AppState, Hub};

pub fn ws_router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// Subscriber endpoint: receives `markets` once, then every `signals` batch,
/// and may send `changeStrategy` / `changeTimeframe` control messages.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Hub) {
    let subscription = hub.register().await;
    let id = subscription.id;
    let mut queue = subscription.rx;
    let (mut sink, mut stream) = socket.split();

    let mut writer = tokio::spawn(async move {
        while let Some(text) = queue.recv().await {
            if let Err(e) = sink.send(Message::Text(text.to_string())).await {
                debug!(subscriber = %id, error = %e, "WebSocket send failed");
                break;
            }
        }
        // queue closed by the hub (eviction or shutdown)
        let _ = sink.send(Message::Close(None)).await;
    });

    let reader_hub = hub.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Text(text)) => apply_control(&reader_hub, id, &text),
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(subscriber = %id, error = %e, "WebSocket receive failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }

    hub.deregister(id).await;
}

fn apply_control(hub: &Hub, id: SubscriberId, text: &str) {
    match hub.handle_control(text) {
        Ok(Some(config)) => info!(
            subscriber = %id,
            strategy = %config.strategy,
            timeframe = %config.timeframe,
            "Runtime config changed by subscriber"
        ),
        Ok(None) => debug!(subscriber = %id, "Ignoring unknown message type"),
        Err(e @ Error::MalformedControl(_)) => {
            warn!(subscriber = %id, error = %e, "Ignoring malformed control message")
        }
        Err(e) => warn!(subscriber = %id, error = %e, "Rejected control message"),
    }
}
