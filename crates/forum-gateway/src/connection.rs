use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};

use forum_core::accounts;
use forum_crypto::token::decode_token;
use forum_db::Database;
use forum_types::api::{Claims, Role};
use forum_types::error::{ForumError, ForumResult};
use forum_types::events::{GatewayCommand, GatewayEvent};

use crate::blocking;
use crate::dispatcher::{ADMIN_GROUP, ConnectionId, Dispatcher};
use crate::distribution::{Distributor, SendRequest};
use crate::presence::PresenceRegistry;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Everything a gateway connection needs, cheap to clone per socket.
#[derive(Clone)]
pub struct GatewayContext {
    pub db: Arc<Database>,
    pub dispatcher: Dispatcher,
    pub presence: PresenceRegistry,
    pub distributor: Distributor,
    pub jwt_secret: Arc<str>,
}

impl GatewayContext {
    pub fn new(db: Arc<Database>, jwt_secret: &str) -> Self {
        let dispatcher = Dispatcher::new();
        let presence = PresenceRegistry::new();
        let distributor = Distributor::new(db.clone(), dispatcher.clone(), presence.clone());
        Self {
            db,
            dispatcher,
            presence,
            distributor,
            jwt_secret: Arc::from(jwt_secret),
        }
    }
}

/// Per-connection identity, set by `Identify`.
#[derive(Debug, Default)]
pub(crate) struct Session {
    claims: Option<Claims>,
}

impl Session {
    fn require(&self, role: Role) -> ForumResult<&Claims> {
        let claims = self
            .claims
            .as_ref()
            .ok_or_else(|| ForumError::Unauthorized("identify before sending commands".into()))?;
        if claims.role != role {
            return Err(ForumError::Forbidden(format!("{:?} role required", role).to_lowercase()));
        }
        Ok(claims)
    }
}

fn encode(event: &GatewayEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(text) => Some(text),
        Err(e) => {
            error!("Failed to encode gateway event: {}", e);
            None
        }
    }
}

/// Handle a single WebSocket connection from accept to close.
pub async fn handle_connection(socket: WebSocket, ctx: GatewayContext) {
    let (mut sender, mut receiver) = socket.split();
    let (conn_id, mut user_rx) = ctx.dispatcher.register_connection().await;
    let mut broadcast_rx = ctx.dispatcher.subscribe();

    debug!("Connection {} accepted", conn_id);

    let connected = GatewayEvent::Connected {
        message: "Connected to the forum".into(),
    };
    if let Some(text) = encode(&connected) {
        if sender.send(Message::Text(text.into())).await.is_err() {
            ctx.dispatcher.unregister_connection(conn_id).await;
            return;
        }
    }

    // Set by the reader on every Pong, cleared by each heartbeat tick
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward broadcasts + targeted events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            // Targeted channel first: once it is closed, no queued broadcast
            // may slip out ahead of the shutdown.
            let event = tokio::select! {
                biased;
                result = user_rx.recv() => match result {
                    Some(event) => event,
                    None => break,
                },
                result = broadcast_rx.recv() => match result {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Broadcast receiver lagged by {} messages", n);
                        continue;
                    }
                    Err(_) => break,
                },
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let Some(text) = encode(&event) else { continue };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Read commands from client
    let recv_ctx = ctx.clone();
    let mut recv_task = tokio::spawn(async move {
        let mut session = Session::default();
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&recv_ctx, conn_id, &mut session, cmd).await,
                    Err(e) => {
                        warn!(
                            "Connection {} bad command: {} -- raw: {}",
                            conn_id,
                            e,
                            text.chars().take(200).collect::<String>()
                        );
                        recv_ctx
                            .dispatcher
                            .send_to_connection(
                                conn_id,
                                GatewayEvent::Error {
                                    message: "malformed command".into(),
                                },
                            )
                            .await;
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    disconnect(&ctx, conn_id).await;
}

/// Tear down everything a connection owned: its presence entry (if it still
/// owns one), its group memberships and its targeted channel.
pub(crate) async fn disconnect(ctx: &GatewayContext, conn_id: ConnectionId) {
    if let Some(user) = ctx.presence.leave(conn_id).await {
        info!("{} ({}) left the chat", user.handle, user.username);
        ctx.dispatcher.broadcast(GatewayEvent::UserDisconnected {
            username: user.username,
            handle: user.handle,
        });
    }
    ctx.dispatcher.unregister_connection(conn_id).await;
    debug!("Connection {} closed", conn_id);
}

/// Execute one command; failures go back to this connection as an `Error` event.
pub(crate) async fn handle_command(
    ctx: &GatewayContext,
    conn_id: ConnectionId,
    session: &mut Session,
    cmd: GatewayCommand,
) {
    if let Err(e) = run_command(ctx, conn_id, session, cmd).await {
        match &e {
            ForumError::Internal(inner) => error!("Connection {} command failed: {:#}", conn_id, inner),
            other => debug!("Connection {} command refused: {}", conn_id, other),
        }
        ctx.dispatcher
            .send_to_connection(
                conn_id,
                GatewayEvent::Error {
                    message: e.public_message(),
                },
            )
            .await;
    }
}

async fn run_command(
    ctx: &GatewayContext,
    conn_id: ConnectionId,
    session: &mut Session,
    cmd: GatewayCommand,
) -> ForumResult<()> {
    match cmd {
        GatewayCommand::Identify { token } => {
            let claims = decode_token(&ctx.jwt_secret, &token)
                .map_err(|_| ForumError::Unauthorized("invalid or expired token".into()))?;
            info!("{} identified on connection {}", claims.username, conn_id);
            ctx.dispatcher
                .send_to_connection(
                    conn_id,
                    GatewayEvent::Ready {
                        username: claims.username.clone(),
                        role: claims.role,
                    },
                )
                .await;
            session.claims = Some(claims);
        }

        GatewayCommand::JoinChat => {
            let username = session.require(Role::Student)?.username.clone();
            let db = ctx.db.clone();
            let account = blocking(move || accounts::get(&db, &username)).await?;

            let joined = ctx
                .presence
                .join(&account.username, &account.handle, conn_id)
                .await;
            // Dropping the displaced connection's channel ends its send loop,
            // so the old socket receives nothing from here on.
            if let Some(previous) = joined.displaced {
                ctx.dispatcher.unregister_connection(previous).await;
            }
            info!("{} ({}) joined the chat", account.handle, account.username);
            ctx.dispatcher.broadcast(GatewayEvent::UserConnected {
                username: account.username,
                handle: account.handle,
                connected_users: joined.present,
            });
        }

        GatewayCommand::LeaveChat => {
            if let Some(user) = ctx.presence.leave(conn_id).await {
                info!("{} ({}) left the chat", user.handle, user.username);
                ctx.dispatcher.broadcast(GatewayEvent::UserDisconnected {
                    username: user.username,
                    handle: user.handle,
                });
            }
        }

        GatewayCommand::SendMessage {
            content,
            to_username,
        } => {
            let sender_username = session.require(Role::Student)?.username.clone();
            ctx.distributor
                .send(SendRequest {
                    sender_username,
                    content,
                    recipient_username: to_username.filter(|u| !u.trim().is_empty()),
                    origin: conn_id,
                })
                .await?;
        }

        GatewayCommand::JoinAdminChannel => {
            let admin = session.require(Role::Admin)?;
            ctx.dispatcher.join_group(ADMIN_GROUP, conn_id).await;
            info!("Admin {} joined the notification channel", admin.username);
        }

        GatewayCommand::LeaveAdminChannel => {
            let admin = session.require(Role::Admin)?;
            ctx.dispatcher.leave_group(ADMIN_GROUP, conn_id).await;
            info!("Admin {} left the notification channel", admin.username);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestClient;
    use forum_core::accounts::Registration;
    use forum_crypto::token::create_token;
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    fn context() -> GatewayContext {
        let db = Arc::new(Database::open_in_memory().unwrap());
        accounts::register(
            &db,
            &Registration {
                username: "etudiant1",
                handle: "pseudo1",
                password_hash: "h",
                last_name: "Alami",
                first_name: "Ahmed",
            },
        )
        .unwrap();
        accounts::activate(&db, "etudiant1").unwrap();
        GatewayContext::new(db, SECRET)
    }

    fn token(username: &str, role: Role) -> String {
        create_token(
            SECRET,
            Uuid::new_v4(),
            username,
            role,
            Uuid::new_v4(),
            chrono::Duration::hours(1),
        )
        .unwrap()
    }

    async fn identify(ctx: &GatewayContext, client: &mut TestClient, session: &mut Session, username: &str, role: Role) {
        let cmd = GatewayCommand::Identify {
            token: token(username, role),
        };
        handle_command(ctx, client.conn_id, session, cmd).await;
        assert!(matches!(client.drain().as_slice(), [GatewayEvent::Ready { .. }]));
    }

    fn is_error(events: &[GatewayEvent]) -> bool {
        matches!(events, [GatewayEvent::Error { .. }])
    }

    #[tokio::test]
    async fn commands_require_identification() {
        let ctx = context();
        let mut client = TestClient::connect(&ctx.dispatcher).await;
        let mut session = Session::default();

        handle_command(&ctx, client.conn_id, &mut session, GatewayCommand::JoinChat).await;
        assert!(is_error(&client.drain()));

        let send = GatewayCommand::SendMessage {
            content: "hi".into(),
            to_username: None,
        };
        handle_command(&ctx, client.conn_id, &mut session, send).await;
        assert!(is_error(&client.drain()));
        assert!(ctx.presence.present().await.is_empty());
    }

    #[tokio::test]
    async fn bad_token_is_refused() {
        let ctx = context();
        let mut client = TestClient::connect(&ctx.dispatcher).await;
        let mut session = Session::default();

        let cmd = GatewayCommand::Identify {
            token: "garbage".into(),
        };
        handle_command(&ctx, client.conn_id, &mut session, cmd).await;
        assert!(is_error(&client.drain()));
        assert!(session.claims.is_none());
    }

    #[tokio::test]
    async fn join_chat_broadcasts_present_set_with_stored_handle() {
        let ctx = context();
        let mut client = TestClient::connect(&ctx.dispatcher).await;
        let mut session = Session::default();
        identify(&ctx, &mut client, &mut session, "etudiant1", Role::Student).await;

        handle_command(&ctx, client.conn_id, &mut session, GatewayCommand::JoinChat).await;

        match client.drain().as_slice() {
            [GatewayEvent::UserConnected { handle, connected_users, .. }] => {
                assert_eq!(handle, "pseudo1");
                assert_eq!(connected_users.len(), 1);
            }
            other => panic!("unexpected events: {:?}", other),
        }
        assert_eq!(ctx.presence.lookup("etudiant1").await, Some(client.conn_id));
    }

    #[tokio::test]
    async fn admin_channel_requires_admin_role() {
        let ctx = context();
        let mut client = TestClient::connect(&ctx.dispatcher).await;
        let mut session = Session::default();
        identify(&ctx, &mut client, &mut session, "etudiant1", Role::Student).await;

        handle_command(&ctx, client.conn_id, &mut session, GatewayCommand::JoinAdminChannel).await;
        assert!(is_error(&client.drain()));

        let mut admin = TestClient::connect(&ctx.dispatcher).await;
        let mut admin_session = Session::default();
        identify(&ctx, &mut admin, &mut admin_session, "admin", Role::Admin).await;
        handle_command(&ctx, admin.conn_id, &mut admin_session, GatewayCommand::JoinAdminChannel).await;
        assert!(admin.drain().is_empty());

        // A pending message from the student now reaches the admin channel.
        let send = GatewayCommand::SendMessage {
            content: "hello".into(),
            to_username: Some(String::new()),
        };
        handle_command(&ctx, client.conn_id, &mut session, send).await;
        assert!(matches!(
            client.drain().as_slice(),
            [GatewayEvent::MessagePendingValidation { .. }]
        ));
        match admin.drain().as_slice() {
            [GatewayEvent::AdminNotification { message, .. }] => assert!(!message.is_private),
            other => panic!("unexpected events: {:?}", other),
        }
    }

    #[tokio::test]
    async fn disconnect_removes_presence_and_notifies() {
        let ctx = context();
        let mut client = TestClient::connect(&ctx.dispatcher).await;
        let mut watcher = TestClient::connect(&ctx.dispatcher).await;
        let mut session = Session::default();
        identify(&ctx, &mut client, &mut session, "etudiant1", Role::Student).await;
        handle_command(&ctx, client.conn_id, &mut session, GatewayCommand::JoinChat).await;
        watcher.drain();

        disconnect(&ctx, client.conn_id).await;

        assert!(ctx.presence.lookup("etudiant1").await.is_none());
        assert!(matches!(
            watcher.drain().as_slice(),
            [GatewayEvent::UserDisconnected { username, .. }] if username == "etudiant1"
        ));

        // A second disconnect finds nothing to remove.
        disconnect(&ctx, client.conn_id).await;
        assert!(watcher.drain().is_empty());
    }

    #[tokio::test]
    async fn rejoin_closes_the_displaced_connection() {
        let ctx = context();
        let mut old = TestClient::connect(&ctx.dispatcher).await;
        let mut new = TestClient::connect(&ctx.dispatcher).await;
        let mut old_session = Session::default();
        let mut new_session = Session::default();
        identify(&ctx, &mut old, &mut old_session, "etudiant1", Role::Student).await;
        identify(&ctx, &mut new, &mut new_session, "etudiant1", Role::Student).await;

        handle_command(&ctx, old.conn_id, &mut old_session, GatewayCommand::JoinChat).await;
        old.drain();
        new.drain();
        handle_command(&ctx, new.conn_id, &mut new_session, GatewayCommand::JoinChat).await;

        assert_eq!(ctx.presence.lookup("etudiant1").await, Some(new.conn_id));
        assert!(old.is_closed());
        assert!(!new.is_closed());
        let stale = GatewayEvent::Error {
            message: "stale".into(),
        };
        assert!(!ctx.dispatcher.send_to_connection(old.conn_id, stale).await);

        // The old socket's teardown must not evict the new entry.
        disconnect(&ctx, old.conn_id).await;
        assert_eq!(ctx.presence.lookup("etudiant1").await, Some(new.conn_id));
    }
}
