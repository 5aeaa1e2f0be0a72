//! WebSocket session handling.
//!
//! One task per connection. Outbound events flow through the session's
//! mpsc channel (also held by the registry for pushes), inbound frames are
//! handled inline. A session is unauthenticated until its first successful
//! `device_auth` or `admin_auth` event.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use chrono::Utc;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use persistence::entities::DeviceEntity;
use persistence::repositories::{CommandRepository, DeviceRepository, OperationLogRepository};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use domain::models::{CommandStatus, DeviceStatus};

use crate::app::AppState;
use crate::middleware::metrics::record_commands_dispatched;
use crate::services::reconciliation::{self, ReportedResult};

use super::protocol::{ClientEvent, ServerEvent};

type Outbound = mpsc::UnboundedSender<ServerEvent>;

enum SessionRole {
    Unauthenticated,
    Device(DeviceEntity),
    Admin {
        user_id: i64,
        merchant_scope: Option<i64>,
    },
}

/// WebSocket upgrade handler.
///
/// GET /api/ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

    let _ = send_event(
        &mut sender,
        &ServerEvent::Connected {
            server_time: Utc::now(),
        },
    )
    .await;

    let mut role = SessionRole::Unauthenticated;

    loop {
        tokio::select! {
            Some(event) = rx.recv() => {
                if send_event(&mut sender, &event).await.is_err() {
                    break;
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&state, conn_id, &tx, &mut role, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    cleanup(&state, conn_id, &role).await;
}

async fn handle_text(
    state: &AppState,
    conn_id: Uuid,
    tx: &Outbound,
    role: &mut SessionRole,
    text: &str,
) {
    let event: ClientEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(_) => {
            send(tx, ServerEvent::Error {
                error: "Invalid message".to_string(),
            });
            return;
        }
    };

    let result = match event {
        ClientEvent::DeviceAuth { api_key } => {
            if matches!(role, SessionRole::Unauthenticated) {
                handle_device_auth(state, conn_id, tx, role, &api_key).await
            } else {
                send(tx, ServerEvent::Error {
                    error: "Already authenticated".to_string(),
                });
                Ok(())
            }
        }
        ClientEvent::AdminAuth { token } => {
            if matches!(role, SessionRole::Unauthenticated) {
                handle_admin_auth(state, conn_id, tx, role, &token).await
            } else {
                send(tx, ServerEvent::Error {
                    error: "Already authenticated".to_string(),
                });
                Ok(())
            }
        }
        ClientEvent::Heartbeat => {
            if let SessionRole::Device(device) = role {
                handle_heartbeat(state, tx, device.id).await
            } else {
                send(tx, ServerEvent::Error {
                    error: "Device not authenticated".to_string(),
                });
                Ok(())
            }
        }
        ClientEvent::DeviceCommandResult {
            command_id,
            success,
            result,
            message,
        } => {
            if let SessionRole::Device(device) = role {
                let device = device.clone();
                handle_device_command_result(
                    state, tx, &device, command_id, success, result, message,
                )
                .await
            } else {
                send(tx, ServerEvent::Error {
                    error: "Device not authenticated".to_string(),
                });
                Ok(())
            }
        }
        ClientEvent::AdminSendCommand {
            device_no,
            command_type,
            payload,
            priority,
            timeout_seconds,
        } => {
            if let SessionRole::Admin {
                user_id,
                merchant_scope,
            } = role
            {
                let (user_id, merchant_scope) = (*user_id, *merchant_scope);
                handle_admin_send_command(
                    state,
                    tx,
                    user_id,
                    merchant_scope,
                    &device_no,
                    &command_type,
                    payload,
                    priority,
                    timeout_seconds,
                )
                .await
            } else {
                send(tx, ServerEvent::Error {
                    error: "Admin not authenticated".to_string(),
                });
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        warn!(conn_id = %conn_id, error = %e, "WebSocket event handling failed");
        send(tx, ServerEvent::Error {
            error: "Request failed".to_string(),
        });
    }
}

async fn handle_device_auth(
    state: &AppState,
    conn_id: Uuid,
    tx: &Outbound,
    role: &mut SessionRole,
    api_key: &str,
) -> Result<(), sqlx::Error> {
    let device_repo = DeviceRepository::new(state.pool.clone());
    let key_hash = shared::crypto::sha256_hex(api_key);

    let Some(device) = device_repo.find_by_api_key_hash(&key_hash).await? else {
        // Log only the displayable prefix, never the key itself.
        warn!(
            key_prefix = ?shared::crypto::extract_key_prefix(api_key),
            "Device WebSocket auth failed"
        );
        send(tx, ServerEvent::AuthError {
            error: "Invalid API key".to_string(),
        });
        return Ok(());
    };

    state
        .registry
        .register_device(&device.device_no, conn_id, tx.clone())
        .await;
    device_repo
        .set_status(device.id, DeviceStatus::Online.as_str())
        .await?;

    send(tx, ServerEvent::AuthSuccess {
        device_no: Some(device.device_no.clone()),
        user_id: None,
        message: "Device authenticated".to_string(),
    });

    state
        .registry
        .broadcast_admins(ServerEvent::DeviceOnline {
            device_no: device.device_no.clone(),
        })
        .await;

    // Flush commands that queued up while the device was offline.
    state.dispatch.wake();

    info!(device_no = %device.device_no, "Device authenticated over WebSocket");
    *role = SessionRole::Device(device);
    Ok(())
}

async fn handle_admin_auth(
    state: &AppState,
    conn_id: Uuid,
    tx: &Outbound,
    role: &mut SessionRole,
    token: &str,
) -> Result<(), sqlx::Error> {
    let claims = match shared::jwt::verify(
        &state.config.jwt.secret,
        token,
        state.config.jwt.leeway_secs,
    ) {
        Ok(claims) => claims,
        Err(_) => {
            send(tx, ServerEvent::AuthError {
                error: "Invalid token".to_string(),
            });
            return Ok(());
        }
    };

    let Ok(user_id) = claims.user_id() else {
        send(tx, ServerEvent::AuthError {
            error: "Invalid token".to_string(),
        });
        return Ok(());
    };

    state.registry.register_admin(conn_id, tx.clone()).await;

    send(tx, ServerEvent::AuthSuccess {
        device_no: None,
        user_id: Some(user_id),
        message: "Admin authenticated".to_string(),
    });
    send(tx, ServerEvent::OnlineDevices {
        devices: state.registry.online_devices().await,
    });

    info!(user_id = user_id, "Admin authenticated over WebSocket");
    *role = SessionRole::Admin {
        user_id,
        merchant_scope: claims.merchant_scope(),
    };
    Ok(())
}

async fn handle_heartbeat(
    state: &AppState,
    tx: &Outbound,
    device_id: i64,
) -> Result<(), sqlx::Error> {
    DeviceRepository::new(state.pool.clone())
        .touch_last_seen(device_id)
        .await?;
    send(tx, ServerEvent::HeartbeatAck {
        timestamp: Utc::now(),
    });
    Ok(())
}

async fn handle_device_command_result(
    state: &AppState,
    tx: &Outbound,
    device: &DeviceEntity,
    command_id: String,
    success: bool,
    result: Option<serde_json::Value>,
    message: Option<String>,
) -> Result<(), sqlx::Error> {
    let raw = serde_json::json!({
        "command_id": command_id,
        "success": success,
        "result": result,
        "message": message,
    });

    let report = ReportedResult {
        command_id: command_id.clone(),
        status: if success {
            CommandStatus::Success
        } else {
            CommandStatus::Fail
        },
        result_payload: result,
        result_at: None,
        message,
        raw,
    };

    reconciliation::record_command_result(state, device, report).await?;

    send(tx, ServerEvent::ResultReceived { command_id });
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_admin_send_command(
    state: &AppState,
    tx: &Outbound,
    user_id: i64,
    merchant_scope: Option<i64>,
    device_no: &str,
    command_type: &str,
    payload: Option<serde_json::Value>,
    priority: i32,
    timeout_seconds: Option<i64>,
) -> Result<(), sqlx::Error> {
    if !shared::validation::is_valid_command_type(command_type) {
        send(tx, ServerEvent::Error {
            error: "Invalid command_type".to_string(),
        });
        return Ok(());
    }

    let device_repo = DeviceRepository::new(state.pool.clone());
    let device = match device_repo.find_by_device_no(device_no).await? {
        Some(device) if merchant_scope.is_none() || merchant_scope == Some(device.merchant_id) => {
            device
        }
        _ => {
            send(tx, ServerEvent::Error {
                error: "Device not found".to_string(),
            });
            return Ok(());
        }
    };

    let ttl = timeout_seconds.unwrap_or(state.config.dispatch.default_command_ttl_secs);
    let command = CommandRepository::new(state.pool.clone())
        .create(
            device.id,
            command_type,
            "websocket",
            payload.as_ref(),
            priority,
            user_id,
            None,
            ttl,
        )
        .await?;

    let detail = serde_json::json!({
        "command_id": command.command_id,
        "device_no": device.device_no,
        "command_type": command_type,
    });
    if let Err(e) = OperationLogRepository::new(state.pool.clone())
        .create(
            user_id,
            "ws_send_command",
            "command",
            Some(command.command_id.as_str()),
            Some(&detail),
        )
        .await
    {
        warn!(error = %e, "Failed to write operation log");
    }

    record_commands_dispatched(1);
    state.dispatch.wake();

    send(tx, ServerEvent::CommandSent {
        command_id: command.command_id,
    });
    Ok(())
}

async fn cleanup(state: &AppState, conn_id: Uuid, role: &SessionRole) {
    match role {
        SessionRole::Device(device) => {
            // Only the connection that still owns the registry entry tears
            // down presence; a reconnected session keeps the device online.
            if state
                .registry
                .unregister_device(&device.device_no, conn_id)
                .await
            {
                let device_repo = DeviceRepository::new(state.pool.clone());
                if let Err(e) = device_repo
                    .set_status(device.id, DeviceStatus::Offline.as_str())
                    .await
                {
                    warn!(device_no = %device.device_no, error = %e, "Failed to mark device offline");
                }
                state
                    .registry
                    .broadcast_admins(ServerEvent::DeviceOffline {
                        device_no: device.device_no.clone(),
                    })
                    .await;
                info!(device_no = %device.device_no, "Device disconnected");
            }
        }
        SessionRole::Admin { .. } => {
            state.registry.unregister_admin(conn_id).await;
        }
        SessionRole::Unauthenticated => {}
    }
}

fn send(tx: &Outbound, event: ServerEvent) {
    let _ = tx.send(event);
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(event).expect("ServerEvent serialization cannot fail");
    sender.send(Message::Text(text)).await
}
