//! WebSocket transport (spec §6): the axum upgrade route, the per-connection task, the presence fan-out task,
//! the heartbeat reaper, and the graceful shutdown sequence. Everything above this module is transport-agnostic;
//! this is the only place that touches an actual socket.

//local shortcuts
use crate::auth::{AuthError, ResolvedSession, SessionResolver};
use crate::error::ErrorCode;
use crate::ids::UserId;
use crate::model::{LatencySample, PresenceStatus, ReadyState, Role};
use crate::protocol::OutboundFrame;
use crate::router::{self, RouterAction};
use crate::services::presence_engine::PresenceEvent;
use crate::state::AppState;
use crate::stores::SocketHandle;

//third-party shortcuts
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::mpsc;

//standard shortcuts
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

//-------------------------------------------------------------------------------------------------------------------

/// Everything the upgrade handler needs beyond [`AppState`]: the auth strategy and the shutdown flag the
/// handler consults to reject new upgrades once a drain has started (spec §6, "Shutdown").
pub struct TransportState
{
    pub app: Arc<AppState>,
    pub resolver: Arc<dyn SessionResolver>,
    pub shutting_down: Arc<AtomicBool>,
}

pub fn build_router(transport: Arc<TransportState>) -> Router
{
    let path = transport.app.config.ws_path;
    Router::new().route(path, get(upgrade)).with_state(transport)
}

//-------------------------------------------------------------------------------------------------------------------

async fn upgrade(
    State(transport): State<Arc<TransportState>>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> axum::response::Response
{
    if transport.shutting_down.load(Ordering::SeqCst)
    {
        return (axum::http::StatusCode::SERVICE_UNAVAILABLE, "server is draining").into_response();
    }

    let session = match transport.resolver.resolve(&headers, &query)
    {
        Ok(session) => session,
        Err(err) => return auth_error_response(err),
    };

    ws.on_upgrade(move |socket| handle_socket(transport, socket, session))
}

fn auth_error_response(err: AuthError) -> axum::response::Response
{
    let status = match err
    {
        AuthError::MissingCredential | AuthError::Revoked | AuthError::UserMismatch => axum::http::StatusCode::UNAUTHORIZED,
        AuthError::Banned => axum::http::StatusCode::FORBIDDEN,
    };
    (status, format!("{err:?}")).into_response()
}

//-------------------------------------------------------------------------------------------------------------------

/// Upgrade sequence (spec §6, "Upon accept"): register the socket, send SYSTEM_CAPABILITIES, CONNECTION_ESTABLISHED
/// and PRESENCE_SNAPSHOT immediately, then — on a reconnect — a delayed STATE_SYNC_RESPONSE once the client has
/// had a moment to process the snapshot. One task per connection drives both directions: inbound frames race the
/// socket's outbound queue in a single `select!` loop so a burst of sends never starves reads or vice versa.
async fn handle_socket(transport: Arc<TransportState>, mut socket: WebSocket, session: ResolvedSession)
{
    let app = transport.app.clone();
    let mut outcome = app.connections.register(session.session_id.clone(), session.user_id.clone(), session.role);

    if let Some(evicted) = &outcome.evicted
    {
        app.dispatcher.send_to_socket(evicted, OutboundFrame::ServerShutdown, None);
    }

    send_upgrade_sequence(&app, &outcome.handle, &session, outcome.is_reconnect, outcome.connection_count);

    let heartbeat_timeout = app.connections.heartbeat_timeout();
    let mut ping_ticker = tokio::time::interval(app.connections.heartbeat_interval());
    ping_ticker.tick().await; // first tick fires immediately; consume it so pings start one interval out
    let mut ping_sent_at: Option<Instant> = None;

    let close_code = loop
    {
        tokio::select! {
            incoming = tokio::time::timeout(heartbeat_timeout, socket.recv()) =>
            {
                match incoming
                {
                    Ok(Some(Ok(Message::Text(text)))) => handle_inbound_frame(&app, &outcome.handle, text.as_bytes()).await,
                    Ok(Some(Ok(Message::Binary(_)))) =>
                    {
                        app.dispatcher.send_to_socket(
                            &outcome.handle,
                            OutboundFrame::Error{ code: ErrorCode::UnsupportedFormat, message: "binary frames are not supported".to_string() },
                            None,
                        );
                    }
                    Ok(Some(Ok(Message::Pong(_)))) =>
                    {
                        let now = Instant::now();
                        *outcome.handle.last_pong_at.lock().unwrap_or_else(|e| e.into_inner()) = now;
                        if let Some(sent_at) = ping_sent_at.take()
                        {
                            let rtt_millis = now.saturating_duration_since(sent_at).as_millis() as u64;
                            outcome
                                .handle
                                .latency_samples
                                .lock()
                                .unwrap_or_else(|e| e.into_inner())
                                .push(LatencySample{ measured_at: now, rtt_millis });
                            crate::observability::heartbeat_rtt(outcome.handle.socket_id, rtt_millis);
                        }
                    }
                    Ok(Some(Ok(Message::Ping(_)))) => {}
                    Ok(Some(Ok(Message::Close(_)))) => break 1000,
                    Ok(Some(Err(_))) | Ok(None) => break 1006,
                    Err(_) => break 4001, // heartbeat timeout with no frame observed
                }
            }
            outgoing = outcome.receiver.recv() =>
            {
                match outgoing
                {
                    Some(bytes) =>
                    {
                        if socket.send(Message::Text(String::from_utf8_lossy(&bytes).into_owned().into())).await.is_err()
                        {
                            break 1006;
                        }
                        if *outcome.handle.ready_state.lock().unwrap_or_else(|e| e.into_inner()) == ReadyState::Closing
                        {
                            let _ = socket.send(Message::Close(None)).await;
                            break 1009;
                        }
                    }
                    None => break 1011, // dispatcher side of the channel dropped; should not happen while registered
                }
            }
            _ = ping_ticker.tick() =>
            {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err()
                {
                    break 1006;
                }
                ping_sent_at = Some(Instant::now());
            }
        }

        if *outcome.handle.ready_state.lock().unwrap_or_else(|e| e.into_inner()) == ReadyState::Closing
        {
            let _ = socket.send(Message::Close(None)).await;
            break 1008;
        }
    };

    app.connections.handle_close(&outcome.handle, close_code);
}

async fn handle_inbound_frame(app: &Arc<AppState>, handle: &Arc<SocketHandle>, raw: &[u8])
{
    if let RouterAction::Close{ .. } = router::route_frame(app, handle, raw).await
    {
        *handle.ready_state.lock().unwrap_or_else(|e| e.into_inner()) = ReadyState::Closing;
    }
}

fn send_upgrade_sequence(
    app: &Arc<AppState>,
    handle: &Arc<SocketHandle>,
    session: &ResolvedSession,
    is_reconnect: bool,
    connection_count: usize,
)
{
    app.dispatcher.send_to_socket(handle, OutboundFrame::SystemCapabilities{ admin: session.role == Role::Admin }, None);
    app.dispatcher.send_to_socket(handle, OutboundFrame::ConnectionEstablished{ is_reconnect, connection_count }, None);

    let online = app.services.presence.online_users_excluding(&session.user_id);
    app.dispatcher.send_to_socket(handle, OutboundFrame::PresenceSnapshot{ online }, None);

    if is_reconnect
    {
        let app = app.clone();
        let handle = handle.clone();
        let user_id = session.user_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Ok(response) = crate::handlers::session::build_state_sync_response(&app, &user_id).await
            {
                app.dispatcher.send_to_socket(&handle, response, None);
            }
        });
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Drains presence transitions and fans them out as PRESENCE_UPDATE to every other online user (spec §4.8: the
/// presence engine only emits events, this is the one place that turns them into wire frames).
pub async fn run_presence_fanout(app: Arc<AppState>, mut events: mpsc::UnboundedReceiver<PresenceEvent>)
{
    while let Some(event) = events.recv().await
    {
        let (user_id, frame): (UserId, OutboundFrame) = match event
        {
            PresenceEvent::Online{ user_id } =>
            {
                (user_id.clone(), OutboundFrame::PresenceUpdate{ user_id, status: PresenceStatus::Online })
            }
            PresenceEvent::Offline{ user_id } =>
            {
                (user_id.clone(), OutboundFrame::PresenceUpdate{ user_id, status: PresenceStatus::Offline })
            }
        };
        let recipients = app.services.presence.online_users_excluding(&user_id);
        app.dispatcher.broadcast_to_users(&recipients, frame);
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Sweeps sockets past the heartbeat timeout independent of each connection task's own read timeout
/// (spec §4.3, `staleSockets`). Belt-and-suspenders against a task that stopped polling the stream entirely.
pub async fn run_heartbeat_reaper(app: Arc<AppState>)
{
    let mut ticker = tokio::time::interval(app.connections.heartbeat_interval());
    loop
    {
        ticker.tick().await;
        for socket in app.connections.stale_sockets()
        {
            app.connections.handle_close(&socket, 4001);
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Graceful shutdown (spec §6, "Shutdown"): stop accepting new upgrades, broadcast SERVER_SHUTDOWN, give queued
/// frames a bounded window to drain, then let the caller tear down the listener.
pub async fn graceful_shutdown(app: Arc<AppState>, shutting_down: Arc<AtomicBool>)
{
    shutting_down.store(true, Ordering::SeqCst);
    for socket in app.connections.get_all_online_sockets()
    {
        app.dispatcher.send_to_socket(&socket, OutboundFrame::ServerShutdown, None);
    }
    tokio::time::sleep(app.config.server.shutdown_timeout).await;
}

//-------------------------------------------------------------------------------------------------------------------
