//! services/api/src/web/ws_handler.rs
//!
//! This is the main entry point and control loop for a WebSocket connection.
//! Each connection gets an id, an initial full-document push, a task that
//! forwards broadcast events into the socket, and a receive loop that maps
//! client events onto canonical-state commands.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
    sync::{SyncError, SyncHandle},
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(ws: WebSocketUpgrade, State(app_state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let conn_id = Uuid::new_v4();
    info!("New WebSocket connection established: {}", conn_id);

    let (sender, mut receiver) = socket.split();
    let ws_sender: WsSender = Arc::new(Mutex::new(sender));

    // Subscribe before the snapshot so no event between snapshot and loop
    // start is lost.
    let mut events = app_state.sync.subscribe();

    // --- 1. Initial Sync ---
    // The full document push is the only consistent baseline a client gets.
    match app_state.sync.snapshot().await {
        Ok(data) => {
            if send_message(&ws_sender, &ServerMessage::InitialData { data })
                .await
                .is_err()
            {
                error!("Failed to send initial data to {}", conn_id);
                return;
            }
        }
        Err(e) => {
            error!("Failed to snapshot the document for {}: {}", conn_id, e);
            return;
        }
    }

    // --- 2. Broadcast Forwarding Task ---
    let forward_task = {
        let ws_sender = ws_sender.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(outbound) => {
                        if outbound.skip == Some(conn_id) {
                            continue;
                        }
                        if send_message(&ws_sender, &outbound.message).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        // The client missed events; it can resync with
                        // requestData but we keep forwarding.
                        warn!("Connection {} lagged behind {} events", conn_id, missed);
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    };

    // --- 3. Main Message Loop ---
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => {
                handle_text_message(text.to_string(), conn_id, &app_state.sync, &ws_sender).await;
            }
            Message::Close(_) => {
                info!("Client {} sent close message", conn_id);
                break;
            }
            _ => {}
        }
    }

    // --- 4. Cleanup ---
    forward_task.abort();
    info!("WebSocket connection closed: {}", conn_id);
}

async fn send_message(ws_sender: &WsSender, message: &ServerMessage) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            error!("Failed to serialize server message: {}", e);
            return Ok(());
        }
    };
    ws_sender.lock().await.send(Message::Text(json.into())).await
}

/// Maps one client event onto a canonical-state command and reports the
/// outcome back to the sender.
async fn handle_text_message(text: String, conn_id: Uuid, sync: &SyncHandle, ws_sender: &WsSender) {
    let client_msg = match serde_json::from_str::<ClientMessage>(&text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to deserialize client message from {}: {}", conn_id, e);
            let _ = send_message(
                ws_sender,
                &ServerMessage::Error {
                    message: format!("unrecognized message: {}", e),
                },
            )
            .await;
            return;
        }
    };

    match client_msg {
        ClientMessage::UpdateData { data } => {
            // The sender alone learns whether the replace was durably
            // applied; everyone else sees dataUpdated on success.
            let confirmation = match sync.replace_all(data, Some(conn_id)).await {
                Ok(()) => ServerMessage::UpdateConfirmed {
                    success: true,
                    error: None,
                },
                Err(e) => ServerMessage::UpdateConfirmed {
                    success: false,
                    error: Some(e.to_string()),
                },
            };
            let _ = send_message(ws_sender, &confirmation).await;
        }
        ClientMessage::RequestData => match sync.snapshot().await {
            Ok(data) => {
                let _ = send_message(ws_sender, &ServerMessage::InitialData { data }).await;
            }
            Err(e) => {
                error!("Snapshot for {} failed: {}", conn_id, e);
            }
        },
        other => {
            let result = apply_field_event(sync, other).await;
            if let Err(e) = result {
                report_rejection(conn_id, ws_sender, &e).await;
            }
        }
    }
}

async fn apply_field_event(sync: &SyncHandle, msg: ClientMessage) -> Result<(), SyncError> {
    match msg {
        ClientMessage::UserAdded { user } => sync.add_user(user).await,
        ClientMessage::UserUpdated { user } => sync.update_user(user).await,
        ClientMessage::UserDeleted { user_id } => sync.delete_user(user_id).await,
        ClientMessage::PaymentAdded { payment } => sync.add_payment(payment).await,
        ClientMessage::Debt { data, user_name } => sync.add_debt(data, user_name).await,
        ClientMessage::GroupAdded { group } => sync.add_group(group).await,
        ClientMessage::GroupUpdated { group } => sync.update_group(group).await,
        ClientMessage::GroupDeleted { group_id } => sync.delete_group(group_id).await,
        ClientMessage::RotationReset { rotation } => sync.reset_rotation(rotation).await,
        ClientMessage::BillSaved { month, bill } => sync.save_bill(month, bill).await,
        ClientMessage::MonthlyPaymentAdded {
            month,
            user_name,
            entry,
        } => sync.add_monthly_payment(month, user_name, entry).await,
        ClientMessage::SettingsUpdated {
            weekly_amount,
            site_title,
            admin_password,
        } => {
            sync.update_settings(weekly_amount, site_title, admin_password)
                .await
        }
        // Handled by the caller.
        ClientMessage::UpdateData { .. } | ClientMessage::RequestData => Ok(()),
    }
}

async fn report_rejection(conn_id: Uuid, ws_sender: &WsSender, e: &SyncError) {
    match e {
        SyncError::Validation(_) | SyncError::NotFound(_) => {
            info!("Rejected mutation from {}: {}", conn_id, e);
        }
        SyncError::Persistence(_) | SyncError::Closed => {
            error!("Mutation from {} failed: {}", conn_id, e);
        }
    }
    let _ = send_message(
        ws_sender,
        &ServerMessage::Error {
            message: e.to_string(),
        },
    )
    .await;
}
