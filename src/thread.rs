use crate::api::ApiClient;
use crate::api::models::{
    Attachment, AttachmentKind, ConversationId, CounterpartProfile, Delivery, History,
    HistoryEntry, Message, MessageId, OutgoingFile, Sender,
};
use crate::config::Settings;
use crate::error::{Result, ValidationError};
use crate::recording::Recording;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Ids for locally created messages start here so they never collide with
/// the positional ids handed to loaded history.
const LOCAL_ID_BASE: u64 = 1 << 32;

#[derive(Debug, Clone, PartialEq)]
pub enum OutgoingPayload {
    Text(String),
    Voice(Recording),
    File(OutgoingFile),
}

/// Network work for one optimistic message.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub conversation: ConversationId,
    pub message_id: MessageId,
    pub payload: OutgoingPayload,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivered {
    pub audio_url: Option<String>,
    pub reply: Option<String>,
}

/// Message history of one conversation plus its in-flight sends.
#[derive(Debug)]
pub struct ChatThread {
    conversation: ConversationId,
    voice_prefix: String,
    max_attachment_bytes: u64,
    profile: CounterpartProfile,
    messages: Vec<Message>,
    outbox: HashMap<MessageId, OutgoingPayload>,
    next_local: u64,
    loading: bool,
    in_flight: usize,
}

impl ChatThread {
    pub fn new(conversation: ConversationId, settings: &Settings) -> Self {
        Self {
            conversation,
            voice_prefix: settings.voice_url_prefix.clone(),
            max_attachment_bytes: settings.max_attachment_bytes,
            profile: CounterpartProfile::default(),
            messages: Vec::new(),
            outbox: HashMap::new(),
            next_local: LOCAL_ID_BASE,
            loading: true,
            in_flight: 0,
        }
    }

    pub fn conversation(&self) -> ConversationId {
        self.conversation
    }

    pub fn profile(&self) -> &CounterpartProfile {
        &self.profile
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// True while at least one send is waiting for the server.
    pub fn is_typing(&self) -> bool {
        self.in_flight > 0
    }

    pub async fn fetch_history(
        client: &ApiClient,
        token: &str,
        id: ConversationId,
    ) -> Result<History> {
        client.history(token, id).await
    }

    /// Replaces the loaded history with the server's. Messages created
    /// locally (sends and their replies) are kept after it. Ignored if the
    /// history belongs to a conversation this thread no longer shows.
    pub fn load(&mut self, id: ConversationId, history: History) -> bool {
        if id != self.conversation {
            log::debug!("Dropping history for {id}, showing {}", self.conversation);
            return false;
        }
        let local: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| m.id.0 >= LOCAL_ID_BASE)
            .collect();
        self.profile = history.profile;
        self.messages = history
            .entries
            .iter()
            .flat_map(|entry| entry_messages(entry, &self.voice_prefix))
            .enumerate()
            .map(|(i, mut m)| {
                m.id = MessageId(i as u64);
                m
            })
            .collect();
        self.messages.extend(local);
        self.loading = false;
        true
    }

    /// History could not be fetched; show whatever we have.
    pub fn load_failed(&mut self, id: ConversationId) {
        if id == self.conversation {
            self.loading = false;
        }
    }

    pub fn begin_send_text(&mut self, text: &str) -> std::result::Result<PendingSend, ValidationError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(self.push_outgoing(
            Some(text.to_string()),
            None,
            OutgoingPayload::Text(text.to_string()),
        ))
    }

    pub fn begin_send_voice(&mut self, recording: Recording) -> PendingSend {
        let attachment = Attachment {
            kind: AttachmentKind::Audio,
            mime: recording.mime.clone(),
            url: String::new(),
            name: Some(recording.file_name().to_string()),
            duration_ms: Some((recording.duration_secs * 1000.0) as u64),
        };
        self.push_outgoing(None, Some(attachment), OutgoingPayload::Voice(recording))
    }

    pub fn begin_send_file(
        &mut self,
        file: OutgoingFile,
    ) -> std::result::Result<PendingSend, ValidationError> {
        if file.size() > self.max_attachment_bytes {
            return Err(ValidationError::AttachmentTooLarge {
                size: file.size(),
                limit: self.max_attachment_bytes,
            });
        }
        let attachment = Attachment {
            kind: AttachmentKind::from_mime(&file.mime),
            mime: file.mime.clone(),
            url: String::new(),
            name: Some(file.name.clone()),
            duration_ms: None,
        };
        Ok(self.push_outgoing(None, Some(attachment), OutgoingPayload::File(file)))
    }

    fn push_outgoing(
        &mut self,
        text: Option<String>,
        attachment: Option<Attachment>,
        payload: OutgoingPayload,
    ) -> PendingSend {
        let id = self.allocate_id();
        self.messages.push(Message {
            id,
            sender: Sender::User,
            text,
            attachment,
            timestamp: Some(Utc::now()),
            delivery: Delivery::Pending,
            in_reply_to: None,
        });
        self.outbox.insert(id, payload.clone());
        self.in_flight += 1;
        PendingSend {
            conversation: self.conversation,
            message_id: id,
            payload,
        }
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_local);
        self.next_local += 1;
        id
    }

    /// Applies the outcome of a send. Returns false for completions that no
    /// longer match anything in this thread.
    pub fn complete(
        &mut self,
        conversation: ConversationId,
        id: MessageId,
        outcome: Result<Delivered>,
    ) -> bool {
        if conversation != self.conversation {
            log::debug!("Dropping send result for {conversation}");
            return false;
        }
        let Some(index) = self.messages.iter().position(|m| m.id == id) else {
            return false;
        };
        if self.messages[index].delivery != Delivery::Pending {
            return false;
        }
        self.in_flight = self.in_flight.saturating_sub(1);

        match outcome {
            Ok(delivered) => {
                let message = &mut self.messages[index];
                message.delivery = Delivery::Confirmed;
                if let (Some(url), Some(attachment)) = (delivered.audio_url, message.attachment.as_mut()) {
                    attachment.url = url;
                }
                self.outbox.remove(&id);
                if let Some(reply) = delivered.reply {
                    let reply_id = self.allocate_id();
                    self.messages.push(Message {
                        id: reply_id,
                        sender: Sender::Counterpart,
                        text: Some(reply),
                        attachment: None,
                        timestamp: Some(Utc::now()),
                        delivery: Delivery::Confirmed,
                        in_reply_to: Some(id),
                    });
                }
            }
            Err(e) => {
                log::error!("Error sending message: {e}");
                self.messages[index].delivery = Delivery::Failed(e.to_string());
            }
        }
        true
    }

    /// Puts a failed message back in flight with the same payload.
    pub fn retry(&mut self, id: MessageId) -> Option<PendingSend> {
        let message = self.messages.iter_mut().find(|m| m.id == id)?;
        if !matches!(message.delivery, Delivery::Failed(_)) {
            return None;
        }
        let payload = self.outbox.get(&id)?.clone();
        message.delivery = Delivery::Pending;
        self.in_flight += 1;
        Some(PendingSend {
            conversation: self.conversation,
            message_id: id,
            payload,
        })
    }
}

/// Performs the network side of a send.
pub async fn deliver(client: &ApiClient, token: &str, send: &PendingSend) -> Result<Delivered> {
    match &send.payload {
        OutgoingPayload::Text(text) => Ok(Delivered {
            audio_url: None,
            reply: client.send_text(token, send.conversation, text).await?,
        }),
        OutgoingPayload::Voice(recording) => {
            let url = client
                .upload_voice(
                    token,
                    recording.bytes.clone(),
                    recording.file_name(),
                    &recording.mime,
                )
                .await?;
            // The service answers voice turns through the text endpoint.
            let reply = client.send_text(token, send.conversation, &url).await?;
            Ok(Delivered {
                audio_url: Some(url),
                reply,
            })
        }
        OutgoingPayload::File(file) => Ok(Delivered {
            audio_url: None,
            reply: client.send_file(token, send.conversation, file).await?,
        }),
    }
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn non_empty(s: Option<&String>) -> Option<&str> {
    s.map(String::as_str).filter(|s| !s.trim().is_empty())
}

fn is_typed_voice(entry: &HistoryEntry) -> bool {
    entry.voice == Some(true)
        || matches!(entry.kind.as_deref(), Some("voice") | Some("audio"))
}

fn has_type_info(entry: &HistoryEntry) -> bool {
    entry.voice.is_some() || entry.kind.is_some() || entry.file.is_some()
}

/// Splits a history row into its user and counterpart messages.
fn entry_messages(entry: &HistoryEntry, voice_prefix: &str) -> Vec<Message> {
    let timestamp = parse_time(entry.time.as_deref());
    let mut out = Vec::with_capacity(2);
    let message = |sender, text, attachment| Message {
        id: MessageId(0),
        sender,
        text,
        attachment,
        timestamp,
        delivery: Delivery::Confirmed,
        in_reply_to: None,
    };

    let user = non_empty(entry.user.as_ref());
    let legacy_voice = !has_type_info(entry)
        && !voice_prefix.is_empty()
        && user.is_some_and(|u| u.starts_with(voice_prefix));

    if let Some(url) = user.filter(|_| is_typed_voice(entry) || legacy_voice) {
        let attachment = Attachment {
            kind: AttachmentKind::Audio,
            mime: "audio/mpeg".to_string(),
            url: url.to_string(),
            name: None,
            duration_ms: None,
        };
        out.push(message(Sender::User, None, Some(attachment)));
    } else if let Some(file) = &entry.file {
        let attachment = Attachment {
            kind: AttachmentKind::from_mime(&file.mime),
            mime: file.mime.clone(),
            url: file.url.clone(),
            name: file.name.clone(),
            duration_ms: None,
        };
        out.push(message(Sender::User, user.map(str::to_string), Some(attachment)));
    } else if let Some(text) = user {
        out.push(message(Sender::User, Some(text.to_string()), None));
    }

    if let Some(reply) = non_empty(entry.chatbot.as_ref()) {
        out.push(message(Sender::Counterpart, Some(reply.to_string()), None));
    }
    out
}
