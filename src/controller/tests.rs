//! Controller tests over a scripted transport

use super::*;
use crate::message::{FixedClock, Sender};
use crate::store::{EntryStatus, MemoryStorage, HISTORY_KEY};
use crate::transport::testing::{ScriptedConnector, ScriptedLink};
use crate::transport::{self, TransportConfig};
use serde_json::Value;
use tokio::time::Instant;

struct Harness {
    connector: Arc<ScriptedConnector>,
    transport: TransportHandle,
    handle: ControllerHandle,
    views: broadcast::Receiver<ViewEvent>,
    storage: MemoryStorage,
}

impl Harness {
    fn start(connector: Arc<ScriptedConnector>, storage: MemoryStorage) -> Self {
        let (transport, events) = transport::spawn(
            Arc::clone(&connector),
            TransportConfig::new("ws://test/chat"),
        );
        let store = ConversationStore::load(storage.clone());
        let (controller, handle) = ChatController::new(
            transport.clone(),
            store,
            Arc::new(FixedClock("09:30".to_string())),
        );
        let views = handle.subscribe();
        tokio::spawn(controller.run(events));
        transport.connect();
        Self {
            connector,
            transport,
            handle,
            views,
            storage,
        }
    }

    /// Start with one scripted connection and wait until it is open
    async fn open() -> (Self, ScriptedLink) {
        let connector = Arc::new(ScriptedConnector::new());
        let link = connector.push_connection();
        let mut h = Self::start(connector, MemoryStorage::new());
        h.wait_for_state(ConnectionState::Open).await;
        (h, link)
    }

    async fn next_view(&mut self) -> ViewEvent {
        self.views.recv().await.expect("controller stopped")
    }

    async fn wait_for_state(&mut self, wanted: ConnectionState) {
        loop {
            if let ViewEvent::Connection { state } = self.next_view().await {
                if state == wanted {
                    return;
                }
            }
        }
    }

    fn persisted(&self) -> Vec<ChatMessage> {
        self.storage
            .get(HISTORY_KEY)
            .unwrap()
            .map(|raw| serde_json::from_str(&raw).unwrap())
            .unwrap_or_default()
    }

    async fn send_user(&mut self, text: &str) {
        self.handle.submit(text).await;
        assert_eq!(
            self.next_view().await,
            ViewEvent::MessageAppended {
                message: ChatMessage::user(text, "09:30")
            }
        );
        let sent = self.connector.next_sent().await.unwrap();
        let value: Value = serde_json::from_str(&sent).unwrap();
        assert_eq!(value["message"], text);
    }
}

fn chunk(content: &str) -> String {
    serde_json::json!({ "type": "chunk", "content": content }).to_string()
}

const COMPLETE: &str = r#"{"type":"complete"}"#;

#[tokio::test(start_paused = true)]
async fn streamed_reply_is_finalized_and_persisted() {
    let (mut h, link) = Harness::open().await;
    h.send_user("hi").await;

    link.deliver(&chunk("Hel"));
    link.deliver(&chunk("lo "));
    link.deliver(&chunk("world"));
    link.deliver(COMPLETE);

    assert_eq!(
        h.next_view().await,
        ViewEvent::ReplyStarted {
            timestamp: "09:30".to_string()
        }
    );
    for so_far in ["Hel", "Hello ", "Hello world"] {
        assert_eq!(
            h.next_view().await,
            ViewEvent::ReplyUpdated {
                text: so_far.to_string()
            }
        );
    }
    let expected = ChatMessage::bot("Hello world", "09:30");
    assert_eq!(
        h.next_view().await,
        ViewEvent::ReplyFinished {
            message: expected.clone()
        }
    );
    assert_eq!(
        h.persisted(),
        vec![ChatMessage::user("hi", "09:30"), expected]
    );
}

#[tokio::test(start_paused = true)]
async fn error_frame_abandons_reply_and_banner_expires() {
    let (mut h, link) = Harness::open().await;
    h.send_user("explain recursion").await;

    link.deliver(&chunk("To understand"));
    link.deliver(&chunk(" recursion"));
    link.deliver(r#"{"type":"error","message":"rate limited"}"#);

    assert!(matches!(h.next_view().await, ViewEvent::ReplyStarted { .. }));
    assert!(matches!(h.next_view().await, ViewEvent::ReplyUpdated { .. }));
    assert!(matches!(h.next_view().await, ViewEvent::ReplyUpdated { .. }));
    assert_eq!(h.next_view().await, ViewEvent::ReplyAbandoned);
    assert_eq!(
        h.next_view().await,
        ViewEvent::Banner {
            id: 0,
            text: "rate limited".to_string()
        }
    );
    let shown = Instant::now();

    assert_eq!(h.next_view().await, ViewEvent::BannerExpired { id: 0 });
    let elapsed = shown.elapsed();
    assert!(elapsed >= DEFAULT_BANNER_TTL);
    assert!(elapsed < DEFAULT_BANNER_TTL + Duration::from_millis(100));

    let persisted = h.persisted();
    assert_eq!(persisted.len(), 1);
    assert!(persisted.iter().all(|m| m.sender == Sender::User));
}

#[tokio::test(start_paused = true)]
async fn submit_while_not_open_shows_notice_and_sends_nothing() {
    // No scripted connection: the handshake never completes
    let connector = Arc::new(ScriptedConnector::new());
    let mut h = Harness::start(Arc::clone(&connector), MemoryStorage::new());
    h.wait_for_state(ConnectionState::Connecting).await;

    h.handle.submit("anyone there?").await;
    assert_eq!(
        h.next_view().await,
        ViewEvent::Notice {
            text: NOT_CONNECTED_NOTICE.to_string()
        }
    );

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(connector.sent_count(), 0);
    assert!(h.persisted().is_empty());
    assert!(!h.transport.state().is_open());
}

#[tokio::test(start_paused = true)]
async fn second_submit_while_waiting_is_refused() {
    let (mut h, _link) = Harness::open().await;
    h.send_user("first").await;

    h.handle.submit("second").await;
    assert_eq!(
        h.next_view().await,
        ViewEvent::Notice {
            text: BUSY_NOTICE.to_string()
        }
    );
    assert_eq!(h.persisted().len(), 1);
    assert_eq!(h.connector.sent_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn blank_submit_is_ignored() {
    let (mut h, _link) = Harness::open().await;
    h.handle.submit("   ").await;
    h.handle.replay_history().await;
    assert!(matches!(h.next_view().await, ViewEvent::History { .. }));
    assert_eq!(h.connector.sent_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn malformed_frames_are_dropped() {
    let (mut h, link) = Harness::open().await;
    h.send_user("q").await;

    link.deliver(&chunk("a"));
    link.deliver("not json at all");
    link.deliver(r#"{"content":"missing type"}"#);
    link.deliver(&chunk("b"));
    link.deliver(COMPLETE);

    let finished = loop {
        if let ViewEvent::ReplyFinished { message } = h.next_view().await {
            break message;
        }
    };
    assert_eq!(finished.text, "ab");
}

#[tokio::test(start_paused = true)]
async fn chunk_after_complete_starts_new_reply() {
    let (mut h, link) = Harness::open().await;
    h.send_user("q").await;

    link.deliver(&chunk("first"));
    link.deliver(COMPLETE);
    link.deliver(&chunk("second"));
    link.deliver(COMPLETE);

    let mut finished = vec![];
    while finished.len() < 2 {
        if let ViewEvent::ReplyFinished { message } = h.next_view().await {
            finished.push(message.text);
        }
    }
    assert_eq!(finished, vec!["first", "second"]);
    let texts: Vec<_> = h.persisted().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["q", "first", "second"]);
}

#[tokio::test(start_paused = true)]
async fn connection_loss_abandons_reply_and_recovers() {
    let connector = Arc::new(ScriptedConnector::new());
    let first = connector.push_connection();
    let second = connector.push_connection();
    let mut h = Harness::start(Arc::clone(&connector), MemoryStorage::new());
    h.wait_for_state(ConnectionState::Open).await;

    h.send_user("q1").await;
    first.deliver(&chunk("half an ans"));
    assert!(matches!(h.next_view().await, ViewEvent::ReplyStarted { .. }));
    assert!(matches!(h.next_view().await, ViewEvent::ReplyUpdated { .. }));

    first.close();
    assert_eq!(h.next_view().await, ViewEvent::ReplyAbandoned);
    assert_eq!(
        h.next_view().await,
        ViewEvent::Connection {
            state: ConnectionState::Closed
        }
    );
    h.wait_for_state(ConnectionState::Open).await;

    h.send_user("q2").await;
    second.deliver(&chunk("full answer"));
    second.deliver(COMPLETE);
    loop {
        if let ViewEvent::ReplyFinished { message } = h.next_view().await {
            assert_eq!(message.text, "full answer");
            break;
        }
    }

    let texts: Vec<_> = h.persisted().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["q1", "q2", "full answer"]);
}

#[tokio::test(start_paused = true)]
async fn history_is_replayed_on_start() {
    let storage = MemoryStorage::new();
    storage
        .set(
            HISTORY_KEY,
            r#"[{"text":"hi","sender":"user","time":"08:00"},{"text":"hello","sender":"bot","time":"08:01"}]"#,
        )
        .unwrap();

    let connector = Arc::new(ScriptedConnector::new());
    let mut h = Harness::start(connector, storage);

    let ViewEvent::History { entries } = h.next_view().await else {
        panic!("expected history first");
    };
    let texts: Vec<_> = entries.iter().map(|e| e.message.text.as_str()).collect();
    assert_eq!(texts, vec!["hi", "hello"]);
    assert!(entries.iter().all(|e| e.status == EntryStatus::Final));
}

#[tokio::test(start_paused = true)]
async fn connection_views_follow_transport_order() {
    use ConnectionState::{Closed, Connecting, Open};

    let connector = Arc::new(ScriptedConnector::new());
    let _link = connector.push_connection();
    let mut h = Harness::start(connector, MemoryStorage::new());

    let mut states = vec![];
    while states.last() != Some(&Open) {
        if let ViewEvent::Connection { state } = h.next_view().await {
            states.push(state);
        }
    }
    assert_eq!(states, vec![Closed, Connecting, Open]);

    // Nothing stale trails the open state
    h.send_user("hi").await;
}

#[tokio::test(start_paused = true)]
async fn message_lost_on_closing_socket_is_retracted() {
    let connector = Arc::new(ScriptedConnector::new());
    let first = connector.push_connection();
    let _second = connector.push_connection();
    let mut h = Harness::start(Arc::clone(&connector), MemoryStorage::new());
    h.wait_for_state(ConnectionState::Open).await;

    first.fail_sends();
    h.handle.submit("lost").await;
    let lost = ChatMessage::user("lost", "09:30");
    assert_eq!(
        h.next_view().await,
        ViewEvent::MessageAppended {
            message: lost.clone()
        }
    );
    assert_eq!(h.next_view().await, ViewEvent::MessageRetracted { message: lost });
    assert_eq!(
        h.next_view().await,
        ViewEvent::Notice {
            text: NOT_CONNECTED_NOTICE.to_string()
        }
    );
    assert_eq!(
        h.next_view().await,
        ViewEvent::Connection {
            state: ConnectionState::Closed
        }
    );
    assert!(h.persisted().is_empty());
    assert_eq!(connector.sent_count(), 0);

    // Not stuck waiting for a reply to the lost message
    h.wait_for_state(ConnectionState::Open).await;
    h.send_user("again").await;
    let texts: Vec<_> = h.persisted().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["again"]);
}
