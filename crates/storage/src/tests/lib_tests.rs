use super::*;

fn pid(id: &str) -> ParticipantId {
    ParticipantId::from(id)
}

fn one_to_one(id: &str, a: &str, b: &str) -> NewChannel {
    NewChannel {
        channel_id: ChannelId::from(id),
        participants: vec![(pid(a), a.to_uppercase()), (pid(b), b.to_uppercase())],
        last_message: "Say hello!".into(),
        is_group_chat: false,
    }
}

fn text(sender: &str, body: &str) -> NewMessage {
    NewMessage {
        sender_id: pid(sender),
        sender_name: sender.to_uppercase(),
        message_text: body.into(),
    }
}

#[tokio::test]
async fn health_check_succeeds_for_live_pool() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.health_check().await.expect("health check");
}

#[tokio::test]
async fn creates_database_file_when_missing() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("nested").join("chat.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));

    let storage = Storage::new(&database_url).await.expect("db");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should exist: {}",
        db_path.display()
    );
}

#[tokio::test]
async fn stores_and_updates_participant_names() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    assert_eq!(storage.participant_name(&pid("u1")).await.expect("name"), None);

    storage.upsert_participant(&pid("u1"), "Alice").await.expect("upsert");
    storage.upsert_participant(&pid("u1"), "Alicia").await.expect("upsert");

    assert_eq!(
        storage.participant_name(&pid("u1")).await.expect("name").as_deref(),
        Some("Alicia")
    );
}

#[tokio::test]
async fn create_if_absent_creates_once() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let first = storage
        .create_channel_if_absent(&one_to_one("ch1", "u1", "u2"))
        .await
        .expect("create");
    let second = storage
        .create_channel_if_absent(&one_to_one("ch1", "u1", "u2"))
        .await
        .expect("create again");
    assert!(first);
    assert!(!second);

    let channel = storage
        .load_channel(&ChannelId::from("ch1"))
        .await
        .expect("load")
        .expect("channel exists");
    assert_eq!(channel.participant_ids.len(), 2);
    assert_eq!(channel.last_message.as_deref(), Some("Say hello!"));
    assert!(channel.last_message_at.is_some());
    assert_eq!(
        channel.participant_names.get(&pid("u2")).cloned().flatten().as_deref(),
        Some("U2")
    );
}

#[tokio::test]
async fn commit_message_updates_channel_summary_atomically() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .create_channel_if_absent(&one_to_one("ch1", "u1", "u2"))
        .await
        .expect("create");

    let stored = storage
        .commit_message(&ChannelId::from("ch1"), &text("u1", "hello"))
        .await
        .expect("commit");

    let channel = storage
        .load_channel(&ChannelId::from("ch1"))
        .await
        .expect("load")
        .expect("channel");
    assert_eq!(channel.last_message.as_deref(), Some("hello"));
    assert_eq!(channel.last_message_at, Some(stored.sent_at));

    let messages = storage
        .list_channel_messages(&ChannelId::from("ch1"))
        .await
        .expect("messages");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_id, stored.message_id);
    assert_eq!(messages[0].sent_at, stored.sent_at);
    assert!(!messages[0].read);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_commits_leave_summary_on_newest_message() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("chat.db");
    let database_url = format!("sqlite://{}", db_path.to_string_lossy().replace('\\', "/"));
    let storage = Storage::new(&database_url).await.expect("db");
    let channel_id = ChannelId::from("ch1");
    storage
        .create_channel_if_absent(&one_to_one("ch1", "u1", "u2"))
        .await
        .expect("create");

    for round in 0..10 {
        let mut sends = Vec::new();
        for n in 0..8 {
            let storage = storage.clone();
            let channel_id = channel_id.clone();
            sends.push(tokio::spawn(async move {
                storage
                    .commit_message(&channel_id, &text("u1", &format!("r{round}-m{n}")))
                    .await
            }));
        }
        for send in sends {
            send.await.expect("join").expect("commit");
        }

        let channel = storage
            .load_channel(&channel_id)
            .await
            .expect("load")
            .expect("channel");
        let messages = storage
            .list_channel_messages(&channel_id)
            .await
            .expect("messages");
        let newest = messages.last().expect("newest message");
        assert_eq!(messages.len(), (round + 1) * 8);
        assert_eq!(channel.last_message.as_deref(), Some(newest.message_text.as_str()));
        assert_eq!(channel.last_message_at, Some(newest.sent_at));
        assert!(messages.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
    }
}

#[tokio::test]
async fn commit_to_missing_channel_writes_nothing() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");

    let err = storage
        .commit_message(&ChannelId::from("ghost"), &text("u1", "hello"))
        .await
        .expect_err("missing channel");
    assert!(err.to_string().contains("does not exist"));

    let messages = storage
        .list_channel_messages(&ChannelId::from("ghost"))
        .await
        .expect("messages");
    assert!(messages.is_empty());
}

#[tokio::test]
async fn lists_messages_in_send_order() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .create_channel_if_absent(&one_to_one("ch1", "u1", "u2"))
        .await
        .expect("create");
    let channel_id = ChannelId::from("ch1");

    for body in ["first", "second", "third"] {
        storage
            .commit_message(&channel_id, &text("u1", body))
            .await
            .expect("commit");
    }

    let messages = storage
        .list_channel_messages(&channel_id)
        .await
        .expect("messages");
    let bodies: Vec<_> = messages.iter().map(|m| m.message_text.as_str()).collect();
    assert_eq!(bodies, ["first", "second", "third"]);
    assert!(messages.windows(2).all(|w| w[0].sent_at <= w[1].sent_at));
}

#[tokio::test]
async fn lists_channels_for_participant_by_recency() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .create_channel_if_absent(&one_to_one("older", "u1", "u2"))
        .await
        .expect("create");
    storage
        .create_channel_if_absent(&one_to_one("newer", "u1", "u3"))
        .await
        .expect("create");
    storage
        .create_channel_if_absent(&one_to_one("elsewhere", "u2", "u3"))
        .await
        .expect("create");

    storage
        .commit_message(&ChannelId::from("older"), &text("u2", "bump"))
        .await
        .expect("commit");

    let channels = storage
        .list_channels_for_participant(&pid("u1"))
        .await
        .expect("list");
    let ids: Vec<_> = channels.iter().map(|c| c.channel_id.as_str()).collect();
    assert_eq!(ids, ["older", "newer"]);
    assert!(channels.iter().all(|c| c.participant_ids.len() == 2));
}

#[tokio::test]
async fn channels_missing_summary_fields_still_load() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    sqlx::query("INSERT INTO channels (id) VALUES ('bare')")
        .execute(storage.pool())
        .await
        .expect("raw insert");
    sqlx::query(
        "INSERT INTO channel_participants (channel_id, participant_id) VALUES ('bare', 'u1')",
    )
    .execute(storage.pool())
    .await
    .expect("raw insert");

    let channels = storage
        .list_channels_for_participant(&pid("u1"))
        .await
        .expect("list");
    assert_eq!(channels.len(), 1);
    assert_eq!(channels[0].last_message, None);
    assert_eq!(channels[0].last_message_at, None);
    assert_eq!(channels[0].participant_names.get(&pid("u1")), Some(&None));
}

#[tokio::test]
async fn watch_reports_committed_writes() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let mut changes = storage.watch();

    storage
        .create_channel_if_absent(&one_to_one("ch1", "u1", "u2"))
        .await
        .expect("create");
    let stored = storage
        .commit_message(&ChannelId::from("ch1"), &text("u1", "hi"))
        .await
        .expect("commit");

    assert!(matches!(
        changes.recv().await.expect("change"),
        StoreChange::ChannelWritten { channel_id, .. } if channel_id.as_str() == "ch1"
    ));
    assert_eq!(
        changes.recv().await.expect("change"),
        StoreChange::MessageAppended {
            channel_id: ChannelId::from("ch1"),
            message_id: stored.message_id,
        }
    );
    assert!(matches!(
        changes.recv().await.expect("change"),
        StoreChange::ChannelWritten { participant_ids, .. } if participant_ids == vec![pid("u1"), pid("u2")]
    ));
}

#[tokio::test]
async fn duplicate_create_publishes_nothing() {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .create_channel_if_absent(&one_to_one("ch1", "u1", "u2"))
        .await
        .expect("create");

    let mut changes = storage.watch();
    storage
        .create_channel_if_absent(&one_to_one("ch1", "u1", "u2"))
        .await
        .expect("create again");
    assert!(matches!(
        changes.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    ));
}
