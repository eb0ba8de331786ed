//! Pumps one subscription over an upgraded WebSocket.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::connection::ConnectionHandle;
use crate::heartbeat::{run_heartbeat, HeartbeatResult};
use crate::subscription::Subscription;

/// How long the writer may take to flush its close frame after cancellation.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Ping cadence and liveness timeout for watcher sockets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// Drive a watcher's socket until the subscription is cancelled.
///
/// Three loops share the subscription token: the writer drains the outbound
/// queue and pings, the reader watches for close frames and pongs, and the
/// heartbeat fires the token when the peer goes quiet. A writer stuck on a
/// peer that stopped reading is aborted after a short grace period. The
/// subscription is dropped at the end, which performs the teardown.
pub async fn run_socket(socket: WebSocket, mut subscription: Subscription, heartbeat: HeartbeatSettings) {
    let handle = Arc::clone(subscription.handle());
    let token = handle.token().clone();
    let Some(outbound) = subscription.take_outbound() else {
        warn!(conn_id = %handle.id, "subscription outbound queue already taken");
        return;
    };

    let (ws_tx, ws_rx) = socket.split();

    let writer = tokio::spawn(write_loop(ws_tx, outbound, heartbeat.interval, Arc::clone(&handle)));
    let reader = tokio::spawn(read_loop(ws_rx, Arc::clone(&handle)));

    let hb_handle = Arc::clone(&handle);
    let hb_token = token.clone();
    let monitor = tokio::spawn(async move {
        if run_heartbeat(Arc::clone(&hb_handle), heartbeat.interval, heartbeat.timeout, hb_token.clone()).await
            == HeartbeatResult::TimedOut
        {
            warn!(
                room_id = %hb_handle.room_id,
                conn_id = %hb_handle.id,
                silent_for = ?hb_handle.last_pong_elapsed(),
                "watcher heartbeat timed out"
            );
            hb_token.cancel();
        }
    });

    subscription.done().await;
    if finish_writer(writer, WRITER_GRACE).await {
        debug!(conn_id = %handle.id, "aborted stalled socket writer");
    }
    let _ = tokio::join!(reader, monitor);
    drop(subscription);
}

/// Wait up to `grace` for the writer to finish, then abort it. Returns `true`
/// when the writer had to be aborted.
async fn finish_writer(mut writer: JoinHandle<()>, grace: Duration) -> bool {
    if tokio::time::timeout(grace, &mut writer).await.is_ok() {
        return false;
    }
    writer.abort();
    let _ = writer.await;
    true
}

async fn write_loop<S>(
    mut ws_tx: S,
    mut outbound: mpsc::Receiver<Arc<String>>,
    ping_every: Duration,
    handle: Arc<ConnectionHandle>,
) where
    S: Sink<WsMessage> + Unpin,
    S::Error: std::fmt::Display,
{
    let token: CancellationToken = handle.token().clone();
    let mut ping = tokio::time::interval(ping_every);
    ping.tick().await;

    loop {
        tokio::select! {
            () = token.cancelled() => break,
            next = outbound.recv() => {
                let Some(payload) = next else { break };
                if let Err(e) = ws_tx.send(WsMessage::Text(String::clone(&payload).into())).await {
                    debug!(conn_id = %handle.id, error = %e, "socket write failed");
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_tx.send(WsMessage::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                trace!(conn_id = %handle.id, "sent ping");
            }
        }
    }

    token.cancel();
    let _ = ws_tx.send(WsMessage::Close(None)).await;
}

async fn read_loop(mut ws_rx: futures::stream::SplitStream<WebSocket>, handle: Arc<ConnectionHandle>) {
    let token = handle.token().clone();
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Close(_))) | None => {
                    debug!(conn_id = %handle.id, "watcher closed socket");
                    break;
                }
                Some(Ok(_)) => handle.mark_alive(),
                Some(Err(e)) => {
                    debug!(conn_id = %handle.id, error = %e, "socket read failed");
                    break;
                }
            },
        }
    }
    token.cancel();
}
