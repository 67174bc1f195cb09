use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use tracing::info;

use super::super::AppState;

/// Live dispatch outcomes over a websocket. Subscribers see every outcome
/// published after they connect; there is no replay of earlier ones.
pub async fn watch_dispatches_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| stream_outcomes(socket, state))
}

async fn stream_outcomes(mut socket: WebSocket, state: AppState) {
    let (conn_id, mut outcomes) = state.observers.subscribe().await;
    info!("Dispatch observer {} connected", conn_id);

    while let Some(outcome) = outcomes.recv().await {
        if socket
            .send(Message::Text(outcome.to_string().into()))
            .await
            .is_err()
        {
            break;
        }
    }

    state.observers.unsubscribe(&conn_id).await;
    info!("Dispatch observer {} disconnected", conn_id);
}
