//! End-to-end ticket workflow: open, close, transcript archival, feedback
//! collection, and durability across a process restart, exercised against
//! scripted in-memory transports.
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use desk_feedback::{FeedbackCollector, FeedbackError, FeedbackRecord, FeedbackSink};
use desk_lifecycle::{LifecycleConfig, TicketError, TicketLifecycle};
use desk_store::{StoreAccessor, TicketStatus};
use desk_transcript::TranscriptCapturer;
use desk_transport::{ChannelMessage, ChannelTransport, ChannelVisibility, HistoryPage};
use tempfile::TempDir;
use tokio::sync::Mutex;

/// In-memory chat platform: channels hold their posted messages so the
/// transcript capture sees what the workflow actually sent.
#[derive(Default)]
struct InMemoryPlatform {
    next_channel: AtomicU64,
    next_message: AtomicU64,
    channels: Mutex<BTreeMap<String, Vec<ChannelMessage>>>,
    deleted: Mutex<Vec<String>>,
    direct: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl ChannelTransport for InMemoryPlatform {
    async fn create_channel(&self, _name: &str, _visibility: &ChannelVisibility) -> Result<String> {
        let id = self.next_channel.fetch_add(1, Ordering::SeqCst) + 1;
        let channel_ref = format!("chan-{id}");
        self.channels
            .lock()
            .await
            .insert(channel_ref.clone(), Vec::new());
        Ok(channel_ref)
    }

    async fn delete_channel(&self, channel_ref: &str) -> Result<()> {
        self.channels.lock().await.remove(channel_ref);
        self.deleted.lock().await.push(channel_ref.to_string());
        Ok(())
    }

    async fn send_message(&self, channel_ref: &str, content: &str) -> Result<()> {
        let id = self.next_message.fetch_add(1, Ordering::SeqCst) + 1;
        let mut channels = self.channels.lock().await;
        channels
            .entry(channel_ref.to_string())
            .or_default()
            .push(ChannelMessage {
                message_id: format!("msg-{id}"),
                author_id: "desk".to_string(),
                author_display: "Desk".to_string(),
                timestamp_ms: id,
                text: content.to_string(),
                attachments: Vec::new(),
                metadata: BTreeMap::new(),
            });
        Ok(())
    }

    async fn fetch_history(
        &self,
        channel_ref: &str,
        _page_token: Option<&str>,
    ) -> Result<HistoryPage> {
        let channels = self.channels.lock().await;
        Ok(HistoryPage {
            messages: channels.get(channel_ref).cloned().unwrap_or_default(),
            next_page_token: None,
        })
    }

    async fn send_direct(&self, user_id: &str, content: &str) -> Result<bool> {
        self.direct
            .lock()
            .await
            .push((user_id.to_string(), content.to_string()));
        Ok(true)
    }
}

#[derive(Default)]
struct ReviewChannel {
    records: Mutex<Vec<FeedbackRecord>>,
}

#[async_trait]
impl FeedbackSink for ReviewChannel {
    async fn publish(&self, record: &FeedbackRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

struct Desk {
    platform: Arc<InMemoryPlatform>,
    reviews: Arc<ReviewChannel>,
    feedback: Arc<FeedbackCollector>,
    lifecycle: TicketLifecycle,
}

fn build_desk(temp: &TempDir) -> Desk {
    let platform = Arc::new(InMemoryPlatform::default());
    let reviews = Arc::new(ReviewChannel::default());
    build_desk_on(temp, platform, reviews)
}

fn build_desk_on(
    temp: &TempDir,
    platform: Arc<InMemoryPlatform>,
    reviews: Arc<ReviewChannel>,
) -> Desk {
    let accessor = Arc::new(StoreAccessor::open(temp.path().join("tickets.json")));
    let transcripts = Arc::new(TranscriptCapturer::new(
        platform.clone(),
        temp.path().join("transcripts"),
    ));
    let feedback = Arc::new(FeedbackCollector::new(platform.clone(), reviews.clone()));
    let lifecycle = TicketLifecycle::new(
        accessor,
        platform.clone(),
        transcripts,
        feedback.clone(),
        LifecycleConfig::new("staff-role")
            .with_archive_channel("archive-channel")
            .with_close_grace_ms(0),
    );
    Desk {
        platform,
        reviews,
        feedback,
        lifecycle,
    }
}

async fn wait_for_deletion(platform: &InMemoryPlatform, channel_ref: &str) {
    for _ in 0..200 {
        if platform
            .deleted
            .lock()
            .await
            .iter()
            .any(|deleted| deleted == channel_ref)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("channel {channel_ref} was not deleted within 2s");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn full_workflow_from_open_to_published_feedback() {
    let temp = TempDir::new().expect("tempdir");
    // The archive destination must exist as a channel before transcripts land.
    let desk = build_desk(&temp);
    desk.platform
        .channels
        .lock()
        .await
        .insert("archive-channel".to_string(), Vec::new());

    // Open: ticket 1 for requester 42.
    let ticket = desk
        .lifecycle
        .open_ticket("42", "user-42", "buying-limiteds", "Buying Limiteds")
        .await
        .expect("open");
    assert_eq!(ticket.number, 1);

    // Conversation happens in the channel.
    desk.platform
        .send_message(&ticket.channel_ref, "hello, I want to buy")
        .await
        .expect("user message");
    desk.platform
        .send_message(&ticket.channel_ref, "sure, sending a trade")
        .await
        .expect("staff message");

    // Duplicate open rejects while the first ticket stays open.
    let error = desk
        .lifecycle
        .open_ticket("42", "user-42", "services", "Buying Services")
        .await
        .expect_err("duplicate open should reject");
    assert!(matches!(error, TicketError::AlreadyOpen));

    // Close: status flips, side effects run detached.
    let closed = desk
        .lifecycle
        .close_ticket(&ticket.channel_ref, "staff-1", "Staff One")
        .await
        .expect("close");
    assert_eq!(closed.status, TicketStatus::Closed);
    wait_for_deletion(&desk.platform, &ticket.channel_ref).await;

    // Transcript reached the archive channel with the conversation inside.
    let channels = desk.platform.channels.lock().await;
    let archive = channels.get("archive-channel").expect("archive channel");
    assert!(archive
        .iter()
        .any(|message| message.text.contains("Transcript for ticket #1")
            && message.text.contains("hello, I want to buy")));
    drop(channels);

    // The requester got a rating prompt and answers it.
    assert!(desk
        .platform
        .direct
        .lock()
        .await
        .iter()
        .any(|(user, content)| user == "42" && content.contains("5 - Outstanding")));

    desk.feedback.submit_rating("42", 5).await.expect("rating");
    let record = desk
        .feedback
        .submit_comment("42", Some("great"))
        .await
        .expect("comment");
    assert_eq!(record.rating, 5);
    assert_eq!(record.summary, "Buying Limiteds");

    let published = desk.reviews.records.lock().await;
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].comment.as_deref(), Some("great"));
    drop(published);

    // Double submission cannot double-publish.
    let error = desk
        .feedback
        .submit_comment("42", Some("again"))
        .await
        .expect_err("second comment should reject");
    assert!(matches!(error, FeedbackError::NoPendingRating));

    // Closed channel rejects a second close.
    let error = desk
        .lifecycle
        .close_ticket(&ticket.channel_ref, "staff-1", "Staff One")
        .await
        .expect_err("second close should reject");
    assert!(matches!(error, TicketError::NotFound));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ticket_history_and_counter_survive_restart() {
    let temp = TempDir::new().expect("tempdir");
    let platform = Arc::new(InMemoryPlatform::default());
    let reviews = Arc::new(ReviewChannel::default());

    let channel_ref = {
        let desk = build_desk_on(&temp, platform.clone(), reviews.clone());
        let ticket = desk
            .lifecycle
            .open_ticket("42", "user-42", "buying-limiteds", "Buying Limiteds")
            .await
            .expect("open");
        desk.lifecycle
            .close_ticket(&ticket.channel_ref, "staff-1", "Staff One")
            .await
            .expect("close");
        wait_for_deletion(&desk.platform, &ticket.channel_ref).await;
        ticket.channel_ref
    };

    // A fresh desk over the same ledger file sees the history and continues
    // the numbering; the closed ticket never reopens.
    let desk = build_desk_on(&temp, platform, reviews);
    assert!(desk.lifecycle.find_open_by_channel(&channel_ref).await.is_none());

    let ticket = desk
        .lifecycle
        .open_ticket("42", "user-42", "services", "Buying Services")
        .await
        .expect("open after restart");
    assert_eq!(ticket.number, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reset_all_wipes_history_and_restarts_numbering() {
    let temp = TempDir::new().expect("tempdir");
    let desk = build_desk(&temp);

    for requester in ["1", "2", "3"] {
        desk.lifecycle
            .open_ticket(requester, "user", "services", "Buying Services")
            .await
            .expect("open");
    }

    desk.lifecycle.reset_all().await.expect("reset");
    let ticket = desk
        .lifecycle
        .open_ticket("9", "user-9", "buying-limiteds", "Buying Limiteds")
        .await
        .expect("open after reset");
    assert_eq!(ticket.number, 1);
}
