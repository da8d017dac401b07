use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    serve, Router,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::events::ViewEvent;
use crate::session::Session;

// Sent by the page's composer
#[derive(Debug, serde::Deserialize)]
struct ClientMessage {
    message: String,
}

#[derive(Clone)]
struct AppState {
    session: Arc<Session>,
}

async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, (StatusCode, Html<String>)> {
    state.session.render_page().map(Html).map_err(|e| {
        error!("Failed to render page: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Html(format!("Internal Server Error: {}", e)),
        )
    })
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket connection upgrade requested");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    info!("New WebSocket connection established");
    let (snapshot, mut events) = state.session.attach();
    let (mut sender, mut receiver) = socket.split();

    // Whatever changed after the page was served arrives here first.
    match serde_json::to_string(&ViewEvent::Synced(snapshot)) {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                warn!("WebSocket client went away before the snapshot was sent");
                return;
            }
        }
        Err(e) => error!("Failed to serialize snapshot: {}", e),
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            error!("Failed to serialize view event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() {
                        warn!("WebSocket client disconnected or send error. Closing connection.");
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "WebSocket client fell behind view events"),
                Err(RecvError::Closed) => break,
            },

            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => handle_client_text(&state, &text),
                Some(Ok(Message::Close(_))) | None => {
                    info!("Client closed WebSocket");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("WebSocket receive error: {}", e);
                    break;
                }
            },
        }
    }
    info!("WebSocket connection closed");
}

fn handle_client_text(state: &AppState, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(parsed) => parsed.message,
        Err(e) => {
            warn!("Ignoring malformed client message: {}", e);
            return;
        }
    };
    let session = state.session.clone();
    tokio::spawn(async move {
        if let Err(e) = session.submit_text(&message).await {
            error!("text send from web view failed: {}", e);
        }
    });
}

pub fn router(session: Arc<Session>) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/ws", get(ws_handler))
        .with_state(AppState { session })
        .layer(TraceLayer::new_for_http())
}

pub async fn start_web_server(port: u16, session: Arc<Session>) -> Result<()> {
    let app = router(session);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("Web view listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .await
        .context("Web server failed")?;

    Ok(())
}
