//! Gateway — the event loop connecting the channel, the providers, and the
//! dedup store.
//!
//! Each message runs to completion inside the single dispatch loop; handler
//! failures are reported once to the error-sink chat and the message is
//! dropped. No retries.

use murmur_channels::telegram::message_link;
use murmur_core::{
    config::MessagesConfig,
    error::MurmurError,
    message::{IncomingMessage, OutgoingMessage},
    traits::{Channel, Summarizer, Transcriber},
};
use murmur_dedup::{compute_key, DedupStore};
use std::sync::Arc;
use tracing::{error, info, warn};

/// The central gateway routing messages between the channel and providers.
pub struct Gateway {
    channel: Arc<dyn Channel>,
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    /// `None` when forward deduplication is disabled in config.
    dedup: Option<DedupStore>,
    messages: MessagesConfig,
    language: String,
    error_chat_id: i64,
}

impl Gateway {
    /// Create a new gateway.
    pub fn new(
        channel: Arc<dyn Channel>,
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        dedup: Option<DedupStore>,
        messages: MessagesConfig,
        language: String,
        error_chat_id: i64,
    ) -> Self {
        Self {
            channel,
            transcriber,
            summarizer,
            dedup,
            messages,
            language,
            error_chat_id,
        }
    }

    /// Run the main event loop.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!(
            "Murmur gateway running | channel: {} | summarizer: {} | transcriber: {} | dedup: {}",
            self.channel.name(),
            self.summarizer.name(),
            self.transcriber.name(),
            if self.dedup.is_some() {
                "enabled"
            } else {
                "disabled"
            }
        );

        let mut rx = self
            .channel
            .start()
            .await
            .map_err(|e| anyhow::anyhow!("failed to start channel: {e}"))?;

        loop {
            tokio::select! {
                Some(incoming) = rx.recv() => {
                    self.handle_message(incoming).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.channel.stop().await?;
        Ok(())
    }

    /// Dispatch one incoming message. Errors end up at the error sink.
    pub async fn handle_message(&self, msg: IncomingMessage) {
        // Group chats only; private and channel traffic is ignored.
        if !msg.is_group {
            return;
        }

        let result = if msg.voice.is_some() {
            self.handle_voice(&msg).await
        } else if msg.forward.is_some() {
            self.handle_forward(&msg).await
        } else {
            Ok(())
        };

        if let Err(e) = result {
            self.report_error(&msg, &e).await;
        }
    }

    /// Voice note: download, transcribe, reply with the transcript.
    async fn handle_voice(&self, msg: &IncomingMessage) -> Result<(), MurmurError> {
        let voice = match &msg.voice {
            Some(v) => v,
            None => return Ok(()),
        };

        let audio = self.channel.download_file(&voice.file_id).await?;
        let transcript = self.transcriber.transcribe(&audio, &self.language).await?;
        info!(
            "transcribed voice message ({}s) in chat {}",
            voice.duration, msg.chat_id
        );

        self.channel
            .send(OutgoingMessage {
                chat_id: msg.chat_id,
                text: transcript,
                reply_to: Some(msg.message_id),
                markdown: false,
            })
            .await
    }

    /// Forwarded message: dedup check, then summarize first occurrences.
    async fn handle_forward(&self, msg: &IncomingMessage) -> Result<(), MurmurError> {
        if msg.text.trim().is_empty() {
            return Ok(());
        }

        if let Some(store) = &self.dedup {
            let origin = msg
                .forward
                .as_ref()
                .and_then(|f| f.origin)
                .map(|o| (o.chat_id, o.message_id));
            let key = compute_key(origin, &msg.text);

            match store.check_and_record(msg.chat_id, &key, msg.message_id).await {
                Ok(Some(first_id)) => return self.handle_duplicate(msg, first_id).await,
                Ok(None) => {}
                Err(e) => {
                    // The occurrence is recorded in memory; keep handling the
                    // message and report the persistence failure.
                    warn!("dedup persistence failed: {e}");
                    self.report_error(msg, &e).await;
                }
            }
        }

        let summary = self.summarizer.summarize(&msg.text).await?;
        self.channel
            .send(OutgoingMessage {
                chat_id: msg.chat_id,
                text: summary,
                reply_to: Some(msg.message_id),
                markdown: false,
            })
            .await
    }

    /// Repeat forward: delete it and point the forwarder at the original.
    async fn handle_duplicate(
        &self,
        msg: &IncomingMessage,
        first_id: i64,
    ) -> Result<(), MurmurError> {
        info!(
            "duplicate forward in chat {} (first seen as message {first_id})",
            msg.chat_id
        );

        self.channel
            .delete_message(msg.chat_id, msg.message_id)
            .await?;

        let notice = duplicate_notice(
            &self.messages.duplicate_notice,
            &msg.sender.mention(),
            &message_link(msg.chat_id, first_id),
        );
        self.channel
            .send(OutgoingMessage {
                chat_id: msg.chat_id,
                text: notice,
                reply_to: None,
                markdown: true,
            })
            .await
    }

    /// Send a failure notification to the error-sink chat.
    ///
    /// Delivery failure is logged and swallowed; nothing is posted to the
    /// group itself.
    async fn report_error(&self, msg: &IncomingMessage, err: &MurmurError) {
        error!("error handling message in chat {}: {err}", msg.chat_id);

        let report = format!(
            "Error handling message\nChat: {}\nContent: {}\nError: {err}",
            msg.chat_id, msg.text
        );
        let out = OutgoingMessage {
            chat_id: self.error_chat_id,
            text: report,
            reply_to: None,
            markdown: false,
        };

        if let Err(e) = self.channel.send(out).await {
            error!("failed to report error to sink chat: {e}");
        }
    }
}

/// Fill the `{mention}` and `{link}` placeholders of the duplicate notice.
fn duplicate_notice(template: &str, mention: &str, link: &str) -> String {
    template.replace("{mention}", mention).replace("{link}", link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use murmur_core::message::{ForwardInfo, ForwardOrigin, Sender, VoiceAttachment};
    use std::sync::Mutex;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    /// Channel double that records every operation.
    #[derive(Default)]
    struct MockChannel {
        sent: Mutex<Vec<OutgoingMessage>>,
        deleted: Mutex<Vec<(i64, i64)>>,
        file_bytes: Vec<u8>,
    }

    #[async_trait]
    impl Channel for MockChannel {
        fn name(&self) -> &str {
            "mock"
        }

        async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, MurmurError> {
            let (_tx, rx) = mpsc::channel(1);
            Ok(rx)
        }

        async fn send(&self, message: OutgoingMessage) -> Result<(), MurmurError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), MurmurError> {
            self.deleted.lock().unwrap().push((chat_id, message_id));
            Ok(())
        }

        async fn download_file(&self, _file_id: &str) -> Result<Vec<u8>, MurmurError> {
            Ok(self.file_bytes.clone())
        }

        async fn stop(&self) -> Result<(), MurmurError> {
            Ok(())
        }
    }

    struct MockTranscriber;

    #[async_trait]
    impl Transcriber for MockTranscriber {
        fn name(&self) -> &str {
            "mock-transcriber"
        }

        async fn transcribe(&self, _audio: &[u8], _language: &str) -> Result<String, MurmurError> {
            Ok("a transcript".into())
        }
    }

    /// Summarizer double that fails when `fail` is set.
    struct MockSummarizer {
        fail: bool,
        calls: Mutex<u32>,
    }

    impl MockSummarizer {
        fn ok() -> Self {
            Self {
                fail: false,
                calls: Mutex::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Summarizer for MockSummarizer {
        fn name(&self) -> &str {
            "mock-summarizer"
        }

        async fn summarize(&self, _text: &str) -> Result<String, MurmurError> {
            *self.calls.lock().unwrap() += 1;
            if self.fail {
                Err(MurmurError::Provider("quota exceeded".into()))
            } else {
                Ok("a summary".into())
            }
        }

        async fn is_available(&self) -> bool {
            !self.fail
        }
    }

    fn test_store(name: &str) -> DedupStore {
        let path = std::env::temp_dir().join(format!("__murmur_gateway_{name}__.json"));
        let _ = std::fs::remove_file(&path);
        DedupStore::load(path)
    }

    fn forward_msg(chat_id: i64, message_id: i64, text: &str, origin: Option<(i64, i64)>) -> IncomingMessage {
        IncomingMessage {
            id: Uuid::new_v4(),
            channel: "telegram".into(),
            chat_id,
            is_group: true,
            message_id,
            sender: Sender {
                id: 42,
                first_name: "Dana".into(),
                username: Some("dana_k".into()),
            },
            text: text.into(),
            timestamp: chrono::Utc::now(),
            forward: Some(ForwardInfo {
                origin: origin.map(|(chat_id, message_id)| ForwardOrigin {
                    chat_id,
                    message_id,
                }),
            }),
            voice: None,
        }
    }

    fn gateway(
        channel: Arc<MockChannel>,
        summarizer: Arc<MockSummarizer>,
        dedup: Option<DedupStore>,
    ) -> Gateway {
        Gateway::new(
            channel,
            Arc::new(MockTranscriber),
            summarizer,
            dedup,
            MessagesConfig::default(),
            "he".into(),
            -500,
        )
    }

    #[tokio::test]
    async fn test_first_forward_is_summarized_and_recorded() {
        let channel = Arc::new(MockChannel::default());
        let summarizer = Arc::new(MockSummarizer::ok());
        let store = test_store("first_forward");
        let gw = gateway(channel.clone(), summarizer.clone(), Some(store.clone()));

        gw.handle_message(forward_msg(-100999, 7, "breaking news", Some((100, 55))))
            .await;

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "a summary");
        assert_eq!(sent[0].reply_to, Some(7));
        drop(sent);
        assert_eq!(store.lookup(-100999, "100:55").await, Some(7));
        assert!(channel.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_forward_is_deleted_and_linked_not_summarized() {
        let channel = Arc::new(MockChannel::default());
        let summarizer = Arc::new(MockSummarizer::ok());
        let store = test_store("second_forward");
        let gw = gateway(channel.clone(), summarizer.clone(), Some(store));

        gw.handle_message(forward_msg(-100999, 7, "breaking news", Some((100, 55))))
            .await;
        gw.handle_message(forward_msg(-100999, 9, "breaking news", Some((100, 55))))
            .await;

        assert_eq!(*summarizer.calls.lock().unwrap(), 1);
        assert_eq!(*channel.deleted.lock().unwrap(), vec![(-100999, 9)]);

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let notice = &sent[1];
        assert!(notice.markdown);
        assert!(notice.text.contains("@dana_k"));
        assert!(notice.text.contains("https://t.me/c/999/7"));
    }

    #[tokio::test]
    async fn test_originless_forwards_dedup_by_content() {
        let channel = Arc::new(MockChannel::default());
        let summarizer = Arc::new(MockSummarizer::ok());
        let gw = gateway(
            channel.clone(),
            summarizer.clone(),
            Some(test_store("content_hash")),
        );

        gw.handle_message(forward_msg(-1, 1, "hello", None)).await;
        gw.handle_message(forward_msg(-1, 2, "hello", None)).await;

        assert_eq!(*summarizer.calls.lock().unwrap(), 1);
        assert_eq!(*channel.deleted.lock().unwrap(), vec![(-1, 2)]);
    }

    #[tokio::test]
    async fn test_dedup_disabled_summarizes_every_forward() {
        let channel = Arc::new(MockChannel::default());
        let summarizer = Arc::new(MockSummarizer::ok());
        let gw = gateway(channel.clone(), summarizer.clone(), None);

        gw.handle_message(forward_msg(-1, 1, "hello", None)).await;
        gw.handle_message(forward_msg(-1, 2, "hello", None)).await;

        assert_eq!(*summarizer.calls.lock().unwrap(), 2);
        assert!(channel.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_non_group_messages_are_ignored() {
        let channel = Arc::new(MockChannel::default());
        let summarizer = Arc::new(MockSummarizer::ok());
        let gw = gateway(channel.clone(), summarizer.clone(), Some(test_store("private")));

        let mut msg = forward_msg(42, 1, "hello", None);
        msg.is_group = false;
        gw.handle_message(msg).await;

        assert_eq!(*summarizer.calls.lock().unwrap(), 0);
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_forward_text_is_ignored() {
        let channel = Arc::new(MockChannel::default());
        let summarizer = Arc::new(MockSummarizer::ok());
        let gw = gateway(channel.clone(), summarizer.clone(), Some(test_store("empty")));

        gw.handle_message(forward_msg(-1, 1, "   ", None)).await;

        assert_eq!(*summarizer.calls.lock().unwrap(), 0);
        assert!(channel.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_voice_message_replies_with_transcript() {
        let channel = Arc::new(MockChannel {
            file_bytes: vec![1, 2, 3],
            ..Default::default()
        });
        let summarizer = Arc::new(MockSummarizer::ok());
        let gw = gateway(channel.clone(), summarizer, Some(test_store("voice")));

        let mut msg = forward_msg(-1, 5, "", None);
        msg.forward = None;
        msg.voice = Some(VoiceAttachment {
            file_id: "abc".into(),
            duration: 3,
            mime_type: Some("audio/ogg".into()),
        });
        gw.handle_message(msg).await;

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "a transcript");
        assert_eq!(sent[0].reply_to, Some(5));
    }

    #[tokio::test]
    async fn test_provider_failure_goes_to_error_sink() {
        let channel = Arc::new(MockChannel::default());
        let summarizer = Arc::new(MockSummarizer::failing());
        let gw = gateway(channel.clone(), summarizer, Some(test_store("sink")));

        gw.handle_message(forward_msg(-1, 1, "hello", None)).await;

        let sent = channel.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        // Report goes to the sink chat, not the group.
        assert_eq!(sent[0].chat_id, -500);
        assert!(sent[0].text.contains("Chat: -1"));
        assert!(sent[0].text.contains("hello"));
        assert!(sent[0].text.contains("quota exceeded"));
    }

    #[test]
    fn test_duplicate_notice_substitution() {
        let notice = duplicate_notice(
            "{mention} this was already forwarded here: {link}",
            "@dana_k",
            "https://t.me/c/999/55",
        );
        assert_eq!(
            notice,
            "@dana_k this was already forwarded here: https://t.me/c/999/55"
        );
    }
}
