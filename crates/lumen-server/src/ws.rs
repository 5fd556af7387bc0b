//! Websocket endpoint. One task per connection multiplexes inbound client
//! frames, the connection's directed event queue and the server-wide
//! broadcast channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use lumen_shared::protocol::{ClientEvent, ServerEvent};
use lumen_shared::types::UserId;
use lumen_shared::ProtocolError;

use crate::api::AppState;
use crate::auth::AuthUser;
use crate::error::ServerError;
use crate::fanout::Fanout;
use crate::presence::ConnectionHandle;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    auth: AuthUser,
    State(state): State<AppState>,
) -> Response {
    let fanout = state.fanout.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, auth.user_id, fanout))
}

async fn handle_socket(socket: WebSocket, user: UserId, fanout: Fanout) {
    let (handle, mut directed) = ConnectionHandle::channel();
    let conn = handle.id;
    let mut broadcasts = fanout.subscribe();
    let (mut sink, mut stream) = socket.split();

    debug!(user = %user.short(), conn = %conn.short(), "Websocket connected");

    loop {
        tokio::select! {
            frame = stream.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(_))) => {
                        let err = ProtocolError::UnsupportedFrame("binary");
                        debug!(conn = %conn.short(), error = %err, "Ignoring frame");
                        continue;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!(conn = %conn.short(), error = %e, "Websocket read failed");
                        break;
                    }
                };

                match ClientEvent::from_text(text.as_str()) {
                    Ok(event) => {
                        let name = event.name();
                        if let Err(e) = dispatch(&fanout, user, &handle, event).await {
                            warn!(user = %user.short(), event = name, error = %e, "Client event rejected");
                        }
                    }
                    Err(e) => debug!(conn = %conn.short(), error = %e, "Malformed client frame"),
                }
            }

            Some(event) = directed.recv() => {
                if send_event(&mut sink, &event).await.is_err() {
                    break;
                }
            }

            received = broadcasts.recv() => match received {
                Ok(broadcast) if !broadcast.reaches(conn) => {}
                Ok(broadcast) => {
                    if send_event(&mut sink, &broadcast.event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(conn = %conn.short(), skipped, "Connection lagged behind broadcasts");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    fanout.leave(conn).await;
    debug!(user = %user.short(), conn = %conn.short(), "Websocket closed");
}

/// Apply one client event on behalf of the socket's authenticated `user`.
async fn dispatch(
    fanout: &Fanout,
    user: UserId,
    handle: &ConnectionHandle,
    event: ClientEvent,
) -> Result<(), ServerError> {
    match event {
        ClientEvent::Join { user_id } => {
            if user_id != user {
                return Err(ServerError::Forbidden(
                    "Cannot join as another user".into(),
                ));
            }
            fanout.join(user, handle.clone()).await;
            info!(user = %user.short(), conn = %handle.id.short(), "Joined");
        }
        ClientEvent::SendMessage { receiver_id, text } => {
            fanout
                .send_message(user, receiver_id, &text, Some(handle))
                .await?;
        }
        ClientEvent::Typing { receiver_id } => fanout.typing(user, receiver_id).await,
        ClientEvent::StopTyping { receiver_id } => fanout.stop_typing(user, receiver_id).await,
        ClientEvent::MarkSeen { sender_id } => {
            fanout.mark_seen(sender_id, user).await?;
        }
        ClientEvent::NewPost(post) => fanout.rebroadcast(handle.id, ServerEvent::NewPost(post)),
        ClientEvent::PostLiked(post) => {
            fanout.rebroadcast(handle.id, ServerEvent::PostLiked(post))
        }
        ClientEvent::PostCommented(post) => {
            fanout.rebroadcast(handle.id, ServerEvent::PostCommented(post))
        }
    }
    Ok(())
}

async fn send_event(
    sink: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> Result<(), axum::Error> {
    match event.to_text() {
        Ok(text) => sink.send(Message::Text(text.into())).await,
        Err(e) => {
            warn!(event = event.name(), error = %e, "Failed to encode server event");
            Ok(())
        }
    }
}
