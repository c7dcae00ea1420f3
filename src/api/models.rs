use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A conversation is keyed by the company and job it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConversationId {
    pub company_id: u64,
    pub job_id: u64,
}

impl ConversationId {
    pub fn new(company_id: u64, job_id: u64) -> Self {
        Self { company_id, job_id }
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.company_id, self.job_id)
    }
}

const ONLINE_STATUS: &str = "Active now";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub name: String,
    pub photo_url: Option<String>,
    pub status: Option<String>,
    pub last_message: Option<String>,
    /// Last activity exactly as the server sent it; see `format::relative_time`.
    pub time: Option<String>,
}

impl Conversation {
    pub fn is_online(&self) -> bool {
        self.status.as_deref() == Some(ONLINE_STATUS)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterpartProfile {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub status: Option<String>,
}

impl CounterpartProfile {
    pub fn is_online(&self) -> bool {
        self.status.as_deref() == Some(ONLINE_STATUS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Counterpart,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Confirmed,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    File,
}

impl AttachmentKind {
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.starts_with("image/") {
            AttachmentKind::Image
        } else if mime.starts_with("video/") {
            AttachmentKind::Video
        } else if mime.starts_with("audio/") {
            AttachmentKind::Audio
        } else {
            AttachmentKind::File
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub mime: String,
    /// Remote URL, or empty while a local upload is still pending.
    pub url: String,
    pub name: Option<String>,
    /// Known length of voice clips recorded locally.
    pub duration_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: Option<String>,
    pub attachment: Option<Attachment>,
    pub timestamp: Option<DateTime<Utc>>,
    pub delivery: Delivery,
    pub in_reply_to: Option<MessageId>,
}

impl Message {
    pub fn is_voice(&self) -> bool {
        matches!(&self.attachment, Some(a) if a.kind == AttachmentKind::Audio)
    }
}

/// A file picked by the user, read fully into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingFile {
    pub name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl OutgoingFile {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn data_url(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&self.bytes);
        format!("data:{};base64,{}", self.mime, encoded)
    }
}

/// Guesses a MIME type from a file name the way a file picker would.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        _ => "application/octet-stream",
    }
}

// Wire types. Field names follow the service, including its `textReponse` typo.

fn flex_id<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Str(String),
    }
    match Raw::deserialize(d)? {
        Raw::Num(n) => Ok(n),
        Raw::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationDto {
    #[serde(deserialize_with = "flex_id")]
    pub company_id: u64,
    #[serde(deserialize_with = "flex_id")]
    pub job_id: u64,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_photo: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
}

impl From<ConversationDto> for Conversation {
    fn from(dto: ConversationDto) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.trim().is_empty());
        Conversation {
            id: ConversationId::new(dto.company_id, dto.job_id),
            name: non_empty(dto.company_name).unwrap_or_else(|| "Chat".to_string()),
            photo_url: non_empty(dto.company_photo),
            status: non_empty(dto.status),
            last_message: dto.last_message,
            time: non_empty(dto.time),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileDto {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub mime: String,
    pub url: String,
}

/// One row of `textReponse`: a user turn, a bot turn, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub chatbot: Option<String>,
    #[serde(default)]
    pub voice: Option<bool>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub file: Option<FileDto>,
    #[serde(default)]
    pub time: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct HistoryDto {
    #[serde(rename = "textReponse", alias = "textResponse", default)]
    pub entries: Vec<HistoryEntry>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct History {
    pub profile: CounterpartProfile,
    pub entries: Vec<HistoryEntry>,
}

impl From<HistoryDto> for History {
    fn from(dto: HistoryDto) -> Self {
        History {
            profile: CounterpartProfile {
                name: dto.name,
                avatar_url: dto.avatar,
                status: dto.status,
            },
            entries: dto.entries,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct FilePayload<'a> {
    pub name: &'a str,
    #[serde(rename = "type")]
    pub mime: &'a str,
    pub url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ConversationRequest<'a> {
    pub text: &'a str,
    pub company_id: String,
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FilePayload<'a>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ReplyDto {
    #[serde(rename = "textReponse", alias = "textResponse", default)]
    pub reply: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VoiceUploadDto {
    pub audio_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct PhoneRequest<'a> {
    pub phone: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct VerifyRequest<'a> {
    pub phone: &'a str,
    pub code: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenDto {
    #[serde(alias = "accessToken")]
    pub token: String,
}
