use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, warn};
use uuid::Uuid;

use courier_chat::ChatService;
use courier_types::events::{ClientCommand, ServerEvent};

use crate::dispatcher::Dispatcher;

/// Server pings every 15 seconds; two missed pongs (~30s) drop the
/// connection.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// How long an unidentified connection may sit before being dropped.
const IDENTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Drive one WebSocket connection: identify handshake, registration,
/// then the split send/recv loop. Rejected connections are closed before
/// any registration or presence side effect happens.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    chat: ChatService,
    jwt_secret: String,
) {
    let (mut sender, mut receiver) = socket.split();

    let user_id = match wait_for_identify(&mut receiver, &jwt_secret).await {
        Some(id) => id,
        None => {
            warn!("websocket client failed to identify, closing");
            let rejection = ServerEvent::MessageError {
                error: "authentication error".to_string(),
            };
            let _ = sender
                .send(WsMessage::Text(
                    serde_json::to_string(&rejection).unwrap().into(),
                ))
                .await;
            return;
        }
    };

    info!(%user_id, "connected to gateway");

    let (conn_id, mut outbound_rx) = dispatcher.register(user_id).await;

    // Presence: connecting counts as activity.
    touch_presence(&chat, user_id).await;

    let ready = ServerEvent::Ready { user_id };
    if sender
        .send(WsMessage::Text(
            serde_json::to_string(&ready).unwrap().into(),
        ))
        .await
        .is_err()
    {
        dispatcher.unregister(user_id, conn_id).await;
        return;
    }

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward queued events -> client, with heartbeat.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = outbound_rx.recv() => {
                    let event = match result {
                        Some(event) => event,
                        None => break,
                    };
                    let text = serde_json::to_string(&event).unwrap();
                    if sender.send(WsMessage::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!(%user_id, "heartbeat timeout, dropping connection");
                            break;
                        }
                    }
                    if sender.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from the client.
    let dispatcher_recv = dispatcher.clone();
    let chat_recv = chat.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                WsMessage::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(cmd) => {
                        handle_command(&dispatcher_recv, &chat_recv, user_id, conn_id, cmd).await;
                    }
                    Err(e) => {
                        warn!(
                            %user_id,
                            error = %e,
                            raw = truncate_frame(&text, 200),
                            "bad command frame"
                        );
                    }
                },
                WsMessage::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.unregister(user_id, conn_id).await;
    // Presence: disconnecting is the user's last activity.
    touch_presence(&chat, user_id).await;
    info!(%user_id, "disconnected from gateway");
}

async fn wait_for_identify(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    jwt_secret: &str,
) -> Option<Uuid> {
    use courier_types::api::Claims;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    let timeout = tokio::time::timeout(IDENTIFY_TIMEOUT, async {
        while let Some(Ok(msg)) = receiver.next().await {
            if let WsMessage::Text(text) = msg {
                if let Ok(ClientCommand::Identify { token }) =
                    serde_json::from_str::<ClientCommand>(&text)
                {
                    let token_data = decode::<Claims>(
                        &token,
                        &DecodingKey::from_secret(jwt_secret.as_bytes()),
                        &Validation::default(),
                    )
                    .ok()?;
                    return Some(token_data.claims.sub);
                }
            }
        }
        None
    });

    timeout.await.ok().flatten()
}

async fn handle_command(
    dispatcher: &Dispatcher,
    chat: &ChatService,
    user_id: Uuid,
    conn_id: Uuid,
    cmd: ClientCommand,
) {
    match cmd {
        // Already identified; a second identify is ignored.
        ClientCommand::Identify { .. } => {}

        ClientCommand::SendMessage { receiver_id, text } => {
            // Blocking store I/O off the async runtime.
            let chat_task = chat.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let message = chat_task.send(user_id, receiver_id, &text)?;
                let sender = chat_task.profile(user_id)?;
                Ok::<_, courier_chat::ChatError>((message, sender))
            })
            .await;

            match outcome {
                Ok(Ok((message, sender))) => {
                    // Ack the originating connection only, then best-effort
                    // fanout to the receiver's room.
                    dispatcher
                        .send_to_connection(
                            user_id,
                            conn_id,
                            ServerEvent::MessageSent {
                                message: message.clone(),
                            },
                        )
                        .await;
                    dispatcher.deliver_message(&message, &sender).await;
                }
                Ok(Err(e)) => {
                    dispatcher
                        .send_to_connection(
                            user_id,
                            conn_id,
                            ServerEvent::MessageError {
                                error: e.to_string(),
                            },
                        )
                        .await;
                }
                Err(e) => {
                    warn!(%user_id, error = %e, "send task panicked");
                    dispatcher
                        .send_to_connection(
                            user_id,
                            conn_id,
                            ServerEvent::MessageError {
                                error: "failed to send message".to_string(),
                            },
                        )
                        .await;
                }
            }
        }

        ClientCommand::Typing {
            receiver_id,
            is_typing,
        } => {
            dispatcher.relay_typing(user_id, receiver_id, is_typing).await;
        }
    }
}

/// Cap a logged frame at `max` bytes without cutting through a
/// multi-byte character; slicing mid-character would panic and kill the
/// recv task over a frame that should only be logged and skipped.
fn truncate_frame(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

async fn touch_presence(chat: &ChatService, user_id: Uuid) {
    let chat = chat.clone();
    if let Err(e) = tokio::task::spawn_blocking(move || chat.touch(user_id)).await {
        warn!(%user_id, error = %e, "presence task panicked");
    }
}
