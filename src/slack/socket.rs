//! Slack Socket Mode listener
//!
//! Opens a WebSocket via `apps.connections.open`, acknowledges every
//! envelope, and hands mentions and direct messages to the dispatcher on
//! their own task. Slack periodically asks clients to reconnect with a
//! `disconnect` envelope; the listener opens a fresh connection when that
//! happens or the socket closes, and stops when shutdown is signalled.
//! Only the first connection attempt may fail the listener; later ones
//! are retried after a fixed delay.

use crate::command::CommandDispatcher;
use crate::core::error::{BotError, Result};
use crate::slack::api::SlackApi;
use crate::slack::reply::SlackReply;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::{self, protocol::Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Wait between failed reconnect attempts
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

type SlackSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An event delivered inside an `events_api` envelope
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlackEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: Option<String>,
    pub channel: Option<String>,
    pub channel_type: Option<String>,
    pub user: Option<String>,
    pub bot_id: Option<String>,
    pub subtype: Option<String>,
    pub thread_ts: Option<String>,
}

/// A message that should go to the dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackCommand {
    pub text: String,
    pub channel: String,
    pub thread_ts: Option<String>,
}

/// A decoded Socket Mode frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Hello,
    Disconnect(String),
    Envelope {
        envelope_id: String,
        command: Option<SlackCommand>,
    },
    Other,
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(default)]
    reason: Option<String>,
}

#[derive(Deserialize)]
struct EventsApiPayload {
    #[serde(default)]
    event: Option<SlackEvent>,
}

/// Decode one text frame from the socket
pub fn parse_frame(text: &str, bot_user_id: Option<&str>) -> Result<Frame> {
    let raw: RawEnvelope = serde_json::from_str(text)?;

    let frame = match raw.kind.as_str() {
        "hello" => Frame::Hello,
        "disconnect" => Frame::Disconnect(raw.reason.unwrap_or_default()),
        kind => match raw.envelope_id {
            Some(envelope_id) => {
                let command = if kind == "events_api" {
                    raw.payload
                        .and_then(|p| serde_json::from_value::<EventsApiPayload>(p).ok())
                        .and_then(|p| p.event)
                        .and_then(|event| command_from_event(&event, bot_user_id))
                } else {
                    None
                };
                Frame::Envelope {
                    envelope_id,
                    command,
                }
            }
            None => Frame::Other,
        },
    };
    Ok(frame)
}

/// Decide whether an event is addressed to the bot
///
/// Mentions in channels and plain messages in a direct conversation count;
/// edits, bot messages and the bot's own messages do not.
pub fn command_from_event(event: &SlackEvent, bot_user_id: Option<&str>) -> Option<SlackCommand> {
    if event.bot_id.is_some() || event.subtype.is_some() {
        return None;
    }
    if bot_user_id.is_some() && event.user.as_deref() == bot_user_id {
        return None;
    }

    let addressed = match event.kind.as_str() {
        "app_mention" => true,
        "message" => event.channel_type.as_deref() == Some("im"),
        _ => false,
    };
    if !addressed {
        return None;
    }

    Some(SlackCommand {
        text: event.text.clone()?,
        channel: event.channel.clone()?,
        thread_ts: event.thread_ts.clone(),
    })
}

#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Shutdown,
    Reconnect,
}

/// Listens on Socket Mode and dispatches commands
pub struct SocketModeListener {
    api: Arc<SlackApi>,
    dispatcher: Arc<CommandDispatcher>,
    bot_user_id: Option<String>,
    reconnect_delay: Duration,
}

impl SocketModeListener {
    pub fn new(api: Arc<SlackApi>, dispatcher: Arc<CommandDispatcher>) -> Self {
        Self {
            api,
            dispatcher,
            bot_user_id: None,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Ignore messages posted by this user (the bot itself)
    pub fn with_bot_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.bot_user_id = Some(user_id.into());
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Serve until `shutdown` becomes true or its sender is dropped
    ///
    /// Returns an error only if the first connection cannot be opened.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        if *shutdown.borrow() {
            return Ok(());
        }
        let mut ws = self.connect().await?;

        loop {
            if self.session(ws, &mut shutdown).await == SessionEnd::Shutdown {
                tracing::info!("Socket Mode listener stopped");
                return Ok(());
            }
            tracing::info!("Reconnecting to Slack");

            ws = match self.reconnect(&mut shutdown).await {
                Some(ws) => ws,
                None => {
                    tracing::info!("Socket Mode listener stopped");
                    return Ok(());
                }
            };
        }
    }

    async fn connect(&self) -> Result<SlackSocket> {
        let url = self.api.open_connection().await?;
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| BotError::WebSocket(e.to_string()))?;
        tracing::info!("Connected to Slack Socket Mode");
        Ok(ws)
    }

    /// Keep trying to connect; `None` means shutdown came first
    async fn reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> Option<SlackSocket> {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            match self.connect().await {
                Ok(ws) => return Some(ws),
                Err(e) => {
                    tracing::warn!(
                        "Reconnect failed: {}; retrying in {} ms",
                        e,
                        self.reconnect_delay.as_millis()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        changed = shutdown.changed() => {
                            if changed.is_err() || *shutdown.borrow() {
                                return None;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn session<S>(&self, ws: S, shutdown: &mut watch::Receiver<bool>) -> SessionEnd
    where
        S: futures::Stream<Item = std::result::Result<Message, tungstenite::Error>>
            + futures::Sink<Message, Error = tungstenite::Error>
            + Unpin,
    {
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        let _ = write.send(Message::Close(None)).await;
                        return SessionEnd::Shutdown;
                    }
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match parse_frame(&text, self.bot_user_id.as_deref()) {
                            Ok(Frame::Hello) => tracing::debug!("Socket Mode hello"),
                            Ok(Frame::Disconnect(reason)) => {
                                tracing::debug!("Slack requested disconnect: {}", reason);
                                return SessionEnd::Reconnect;
                            }
                            Ok(Frame::Envelope { envelope_id, command }) => {
                                let ack = serde_json::json!({ "envelope_id": envelope_id });
                                if let Err(e) = write.send(Message::Text(ack.to_string())).await {
                                    tracing::warn!("Failed to acknowledge envelope: {}", e);
                                    return SessionEnd::Reconnect;
                                }
                                if let Some(command) = command {
                                    self.spawn_dispatch(command);
                                }
                            }
                            Ok(Frame::Other) => {}
                            Err(e) => tracing::warn!("Unreadable Socket Mode frame: {}", e),
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if let Err(e) = write.send(Message::Pong(payload)).await {
                            tracing::warn!("Failed to answer ping: {}", e);
                            return SessionEnd::Reconnect;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Reconnect,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!("Socket Mode connection error: {}", e);
                        return SessionEnd::Reconnect;
                    }
                },
            }
        }
    }

    fn spawn_dispatch(&self, command: SlackCommand) {
        let dispatcher = self.dispatcher.clone();
        let reply = SlackReply::new(self.api.clone(), command.channel, command.thread_ts);
        tokio::spawn(async move {
            dispatcher.dispatch(&command.text, &reply).await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{FailureMessages, QueryHandler};
    use crate::core::types::{Answer, ParsedEntity};
    use crate::knowledge::AnswerResolver;
    use crate::nlu::EntityExtractor;
    use async_trait::async_trait;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::Role;

    const DISCONNECT: &str = r#"{"type": "disconnect", "reason": "refresh_requested"}"#;
    const HELLO: &str = r#"{"type": "hello", "num_connections": 1}"#;

    const MENTION: &str = r#"{
        "envelope_id": "57d6a792-4d35-4d0b-b6aa-3361493e1caf",
        "payload": {
            "team_id": "T111",
            "event": {
                "type": "app_mention",
                "user": "U222",
                "text": "<@U999> query What are the Colors of the Rainbow?",
                "ts": "1700000000.000100",
                "channel": "C333",
                "event_ts": "1700000000.000100"
            },
            "type": "event_callback"
        },
        "type": "events_api",
        "accepts_response_payload": false,
        "retry_attempt": 0
    }"#;

    #[test]
    fn test_parse_hello_and_disconnect() {
        let hello = r#"{"type": "hello", "num_connections": 1}"#;
        assert_eq!(parse_frame(hello, None).unwrap(), Frame::Hello);

        let bye = r#"{"type": "disconnect", "reason": "refresh_requested"}"#;
        assert_eq!(
            parse_frame(bye, None).unwrap(),
            Frame::Disconnect("refresh_requested".into())
        );
    }

    #[test]
    fn test_parse_mention_envelope() {
        let frame = parse_frame(MENTION, Some("U999")).unwrap();
        assert_eq!(
            frame,
            Frame::Envelope {
                envelope_id: "57d6a792-4d35-4d0b-b6aa-3361493e1caf".into(),
                command: Some(SlackCommand {
                    text: "<@U999> query What are the Colors of the Rainbow?".into(),
                    channel: "C333".into(),
                    thread_ts: None,
                }),
            }
        );
    }

    #[test]
    fn test_non_event_envelope_is_still_acked() {
        let slash = r#"{"type": "slash_commands", "envelope_id": "e1", "payload": {"command": "/q"}}"#;
        assert_eq!(
            parse_frame(slash, None).unwrap(),
            Frame::Envelope {
                envelope_id: "e1".into(),
                command: None
            }
        );
    }

    #[test]
    fn test_garbage_frame_is_error() {
        assert!(parse_frame("not json", None).is_err());
    }

    #[test]
    fn test_direct_message_is_command() {
        let event = SlackEvent {
            kind: "message".into(),
            text: Some("query what is pi".into()),
            channel: Some("D444".into()),
            channel_type: Some("im".into()),
            user: Some("U222".into()),
            thread_ts: Some("1700000000.000001".into()),
            ..Default::default()
        };
        let command = command_from_event(&event, Some("U999")).unwrap();
        assert_eq!(command.channel, "D444");
        assert_eq!(command.thread_ts.as_deref(), Some("1700000000.000001"));
    }

    #[test]
    fn test_channel_message_without_mention_ignored() {
        let event = SlackEvent {
            kind: "message".into(),
            text: Some("query what is pi".into()),
            channel: Some("C333".into()),
            channel_type: Some("channel".into()),
            ..Default::default()
        };
        assert!(command_from_event(&event, None).is_none());
    }

    #[test]
    fn test_bot_and_edited_messages_ignored() {
        let base = SlackEvent {
            kind: "message".into(),
            text: Some("Red, orange, yellow".into()),
            channel: Some("D444".into()),
            channel_type: Some("im".into()),
            ..Default::default()
        };

        let from_bot = SlackEvent {
            bot_id: Some("B1".into()),
            ..base.clone()
        };
        let edited = SlackEvent {
            subtype: Some("message_changed".into()),
            ..base.clone()
        };
        let own = SlackEvent {
            user: Some("U999".into()),
            ..base
        };

        assert!(command_from_event(&from_bot, Some("U999")).is_none());
        assert!(command_from_event(&edited, Some("U999")).is_none());
        assert!(command_from_event(&own, Some("U999")).is_none());
    }

    // ========================================================================
    // Session and reconnect behavior
    // ========================================================================

    struct EchoExtractor;

    #[async_trait]
    impl EntityExtractor for EchoExtractor {
        async fn extract(&self, text: &str) -> ParsedEntity {
            ParsedEntity::found(text.to_lowercase())
        }
    }

    struct EchoResolver;

    #[async_trait]
    impl AnswerResolver for EchoResolver {
        async fn resolve(&self, query: &str) -> Answer {
            Answer::ok(format!("answer: {}", query))
        }
    }

    fn listener_for(slack_url: impl Into<String>) -> SocketModeListener {
        let handler = QueryHandler::new(
            Arc::new(EchoExtractor),
            Arc::new(EchoResolver),
            FailureMessages::default(),
        );
        let dispatcher = CommandDispatcher::new("query", handler);
        let api = SlackApi::new("xoxb-bot".into(), "xapp-app".into()).with_base_url(slack_url);
        SocketModeListener::new(Arc::new(api), Arc::new(dispatcher))
            .with_bot_user_id("U999")
            .with_reconnect_delay(Duration::from_millis(50))
    }

    fn slash_envelope(envelope_id: &str) -> String {
        json!({
            "type": "slash_commands",
            "envelope_id": envelope_id,
            "payload": {"command": "/query", "text": "what is pi"}
        })
        .to_string()
    }

    /// Connected client and server sockets over an in-memory pipe
    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    async fn next_text<S>(ws: &mut S) -> serde_json::Value
    where
        S: futures::Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
                .await
                .expect("no frame within 5s")
                .expect("socket closed")
                .expect("socket error");
            if let Message::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_session_acks_each_envelope_once() {
        let listener = listener_for("http://127.0.0.1:1");
        let (_tx, mut rx) = watch::channel(false);
        let (client, mut server) = ws_pair().await;

        let slack = async {
            server.send(Message::Text(HELLO.into())).await.unwrap();
            server.send(Message::Text(slash_envelope("e1"))).await.unwrap();
            server.send(Message::Text(slash_envelope("e2"))).await.unwrap();
            let first = next_text(&mut server).await;
            let second = next_text(&mut server).await;
            server.send(Message::Text(DISCONNECT.into())).await.unwrap();
            (first, second)
        };

        let (end, (first, second)) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(listener.session(client, &mut rx), slack) },
        )
        .await
        .unwrap();

        assert_eq!(first, json!({"envelope_id": "e1"}));
        assert_eq!(second, json!({"envelope_id": "e2"}));
        assert_eq!(end, SessionEnd::Reconnect);
    }

    #[tokio::test]
    async fn test_session_answers_ping_then_reconnects_on_close() {
        let listener = listener_for("http://127.0.0.1:1");
        let (_tx, mut rx) = watch::channel(false);
        let (client, mut server) = ws_pair().await;

        let slack = async {
            server.send(Message::Ping(vec![7, 8, 9])).await.unwrap();
            let reply = tokio::time::timeout(Duration::from_secs(5), server.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            server.close(None).await.unwrap();
            reply
        };

        let (end, reply) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(listener.session(client, &mut rx), slack) },
        )
        .await
        .unwrap();

        assert_eq!(reply, Message::Pong(vec![7, 8, 9]));
        assert_eq!(end, SessionEnd::Reconnect);
    }

    #[tokio::test]
    async fn test_session_reconnects_when_peer_vanishes() {
        let listener = listener_for("http://127.0.0.1:1");
        let (_tx, mut rx) = watch::channel(false);
        let (client, server) = ws_pair().await;
        drop(server);

        let end = tokio::time::timeout(Duration::from_secs(5), listener.session(client, &mut rx))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Reconnect);
    }

    #[tokio::test]
    async fn test_session_stops_on_shutdown_and_closes_socket() {
        let listener = listener_for("http://127.0.0.1:1");
        let (tx, mut rx) = watch::channel(false);
        let (client, mut server) = ws_pair().await;

        let slack = async {
            server.send(Message::Text(HELLO.into())).await.unwrap();
            tx.send(true).unwrap();
            tokio::time::timeout(Duration::from_secs(5), server.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap()
        };

        let (end, last) = tokio::time::timeout(
            Duration::from_secs(5),
            async { tokio::join!(listener.session(client, &mut rx), slack) },
        )
        .await
        .unwrap();

        assert_eq!(end, SessionEnd::Shutdown);
        assert!(matches!(last, Message::Close(_)), "got {:?}", last);
    }

    #[tokio::test]
    async fn test_mention_is_answered_in_channel() {
        let mut slack_api = Server::new_async().await;
        let posted = slack_api
            .mock("POST", "/chat.postMessage")
            .match_body(Matcher::PartialJson(json!({
                "channel": "C333",
                "text": "answer: what are the colors of the rainbow?"
            })))
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .create_async()
            .await;

        let listener = listener_for(slack_api.url());
        let (_tx, mut rx) = watch::channel(false);
        let (client, mut server) = ws_pair().await;

        let slack = async {
            server.send(Message::Text(MENTION.into())).await.unwrap();
            let ack = next_text(&mut server).await;
            for _ in 0..100 {
                if posted.matched_async().await {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            server.send(Message::Text(DISCONNECT.into())).await.unwrap();
            ack
        };

        let (_, ack) = tokio::time::timeout(
            Duration::from_secs(10),
            async { tokio::join!(listener.session(client, &mut rx), slack) },
        )
        .await
        .unwrap();

        assert_eq!(
            ack,
            json!({"envelope_id": "57d6a792-4d35-4d0b-b6aa-3361493e1caf"})
        );
        posted.assert_async().await;
    }

    /// Fake `apps.connections.open`; calls for which `rate_limited` holds fail
    async fn connections_api(
        ws_url: String,
        rate_limited: fn(usize) -> bool,
    ) -> (mockito::ServerGuard, Arc<AtomicUsize>) {
        let mut server = Server::new_async().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        server
            .mock("POST", "/apps.connections.open")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body_from_request(move |_| {
                if rate_limited(counter.fetch_add(1, Ordering::SeqCst)) {
                    br#"{"ok": false, "error": "ratelimited"}"#.to_vec()
                } else {
                    json!({"ok": true, "url": ws_url}).to_string().into_bytes()
                }
            })
            .create_async()
            .await;
        (server, calls)
    }

    #[tokio::test]
    async fn test_failed_reconnect_is_retried() {
        let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_url = format!("ws://{}", ws_listener.local_addr().unwrap());
        let (slack_api, calls) = connections_api(ws_url, |n| n == 1).await;
        let listener = listener_for(slack_api.url());
        let (tx, rx) = watch::channel(false);

        let slack = async {
            // First connection: Slack asks for a refresh
            let (stream, _) = ws_listener.accept().await.unwrap();
            let mut first = tokio_tungstenite::accept_async(stream).await.unwrap();
            first.send(Message::Text(DISCONNECT.into())).await.unwrap();

            // Second successful connection, after one rate-limited open
            let (stream, _) = ws_listener.accept().await.unwrap();
            let mut second = tokio_tungstenite::accept_async(stream).await.unwrap();
            second.send(Message::Text(HELLO.into())).await.unwrap();
            second
                .send(Message::Text(slash_envelope("after-refresh")))
                .await
                .unwrap();
            let ack = next_text(&mut second).await;

            tx.send(true).unwrap();
            ack
        };

        let (result, ack) = tokio::time::timeout(
            Duration::from_secs(10),
            async { tokio::join!(listener.run(rx), slack) },
        )
        .await
        .unwrap();

        assert!(result.is_ok(), "listener stopped with {:?}", result);
        assert_eq!(ack, json!({"envelope_id": "after-refresh"}));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_reconnect_failures_wait_for_shutdown() {
        let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_url = format!("ws://{}", ws_listener.local_addr().unwrap());
        let (slack_api, calls) = connections_api(ws_url, |n| n > 0).await;
        let listener = listener_for(slack_api.url());
        let (tx, rx) = watch::channel(false);

        let slack = async {
            let (stream, _) = ws_listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(DISCONNECT.into())).await.unwrap();

            while calls.load(Ordering::SeqCst) < 4 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tx.send(true).unwrap();
        };

        let (result, ()) = tokio::time::timeout(
            Duration::from_secs(10),
            async { tokio::join!(listener.run(rx), slack) },
        )
        .await
        .unwrap();

        assert!(result.is_ok(), "listener stopped with {:?}", result);
    }

    #[tokio::test]
    async fn test_first_connection_failure_is_error() {
        let mut slack_api = Server::new_async().await;
        slack_api
            .mock("POST", "/apps.connections.open")
            .with_status(200)
            .with_body(r#"{"ok": false, "error": "invalid_auth"}"#)
            .create_async()
            .await;
        let listener = listener_for(slack_api.url());
        let (_tx, rx) = watch::channel(false);

        let result = tokio::time::timeout(Duration::from_secs(5), listener.run(rx))
            .await
            .unwrap();

        assert!(
            matches!(&result, Err(BotError::Slack(msg)) if msg.contains("invalid_auth")),
            "got {:?}",
            result
        );
    }
}
