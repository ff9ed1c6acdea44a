// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-connection WebSocket plumbing.
//!
//! Each socket splits into a reader task (decode, route into the hub) and
//! a writer task (drain the subscriber channel under a write deadline).
//! The hub never touches a socket; disconnect decisions flow back through
//! channel closure.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use lode_proto::wire::decode_client_message;
use lode_proto::{encode_server_message, WireError};

use crate::hub::{Hub, SUBSCRIBER_CHANNEL_DEPTH};

/// Deadline for one outbound socket write.
pub const WRITE_WAIT: Duration = Duration::from_secs(5);

/// Runs one subscriber connection to completion.
pub async fn serve_socket(socket: WebSocket, hub: Arc<Hub>, player_id: String) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(SUBSCRIBER_CHANNEL_DEPTH);

    hub.subscribe(&player_id, out_tx.clone()).await;

    // Writer: drain the hub's frames onto the socket with a deadline.
    let writer_player = player_id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            match timeout(WRITE_WAIT, ws_tx.send(Message::Text(frame.into()))).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(player = %writer_player, %err, "socket write failed");
                    break;
                }
                Err(_) => {
                    warn!(player = %writer_player, "socket write deadline missed");
                    break;
                }
            }
        }
    });

    // Reader: decode frames and route them; direct replies ride the same
    // outbound channel as broadcasts so writes never interleave.
    let reader_hub = hub.clone();
    let reader_player = player_id.clone();
    let reader_out = out_tx.clone();
    let mut reader = tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(raw)) => {
                    match decode_client_message(&raw) {
                        Ok(message) => {
                            if let Some(reply) =
                                reader_hub.handle_message(&reader_player, message).await
                            {
                                if let Ok(encoded) = encode_server_message(&reply) {
                                    if reader_out.send(encoded).await.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Err(err @ WireError::VersionMismatch { .. }) => {
                            warn!(player = %reader_player, %err, "client version mismatch");
                            break;
                        }
                        Err(err) => {
                            // Bad input is reported to the offender only;
                            // the message is dropped.
                            debug!(player = %reader_player, %err, "malformed client message");
                        }
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_)) => {}
                Err(err) => {
                    debug!(player = %reader_player, %err, "socket read failed");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut reader => {}
        _ = &mut writer => {}
    }
    reader.abort();
    writer.abort();
    drop(out_tx);

    hub.disconnect(&player_id).await;
}
