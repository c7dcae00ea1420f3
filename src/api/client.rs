use crate::api::models::{
    Conversation, ConversationDto, ConversationId, ConversationRequest, FilePayload, History,
    HistoryDto, OutgoingFile, PhoneRequest, ReplyDto, TokenDto, VerifyRequest, VoiceUploadDto,
};
use crate::config::Settings;
use crate::error::{Error, Result, ValidationError};
use reqwest::Client as HttpClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Thin client for the chat service. Every call is one request: no retries,
/// no idempotency keys.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: HttpClient,
    base: Url,
}

impl ApiClient {
    pub fn new(settings: &Settings) -> Result<Self> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        Self::with_http(builder.build()?, &settings.base_url)
    }

    pub fn with_http(http: HttpClient, base_url: &str) -> Result<Self> {
        let normalized = crate::utils::normalize_url(base_url);
        let with_slash = if normalized.ends_with('/') {
            normalized
        } else {
            format!("{normalized}/")
        };
        let base = Url::parse(&with_slash)
            .map_err(|e| ValidationError::BaseUrl(format!("{base_url}: {e}")))?;
        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| ValidationError::BaseUrl(e.to_string()).into())
    }

    fn with_auth(req: reqwest::RequestBuilder, token: &str) -> reqwest::RequestBuilder {
        req.header("Authorization", format!("Bearer {token}"))
    }

    async fn read_json<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T> {
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp.json::<T>().await?)
    }

    /// Phone-only login. Returns the bearer token.
    pub async fn login(&self, phone: &str) -> Result<String> {
        let req = self
            .http
            .post(self.endpoint("user/auth")?)
            .json(&PhoneRequest { phone });
        let dto: TokenDto = Self::read_json(req).await?;
        Ok(dto.token)
    }

    pub async fn send_otp(&self, phone: &str) -> Result<()> {
        let req = self
            .http
            .post(self.endpoint("user/otp/send")?)
            .json(&PhoneRequest { phone });
        let _: Value = Self::read_json(req).await?;
        Ok(())
    }

    pub async fn verify_otp(&self, phone: &str, code: &str) -> Result<String> {
        let req = self
            .http
            .post(self.endpoint("user/otp/verify")?)
            .json(&VerifyRequest { phone, code });
        let dto: TokenDto = Self::read_json(req).await?;
        Ok(dto.token)
    }

    /// Fetch the conversation list.
    /// Returns parsed conversations and the raw JSON items for caching.
    /// Items without usable ids are skipped.
    pub async fn conversations(&self, token: &str) -> Result<(Vec<Conversation>, Vec<Value>)> {
        let req = Self::with_auth(self.http.get(self.endpoint("chat/list")?), token);
        let json: Value = Self::read_json(req).await?;
        let items = if let Some(arr) = json.get("data").and_then(|v| v.as_array()) {
            arr.clone()
        } else if let Some(arr) = json.as_array() {
            arr.clone()
        } else {
            Vec::new()
        };

        let mut out = Vec::new();
        let mut raws = Vec::new();
        for item in items {
            match serde_json::from_value::<ConversationDto>(item.clone()) {
                Ok(dto) => {
                    out.push(Conversation::from(dto));
                    raws.push(item);
                }
                Err(e) => log::debug!("Skipping conversation entry: {e}"),
            }
        }
        Ok((out, raws))
    }

    pub async fn history(&self, token: &str, id: ConversationId) -> Result<History> {
        let path = format!("chat/init/{}/{}", id.company_id, id.job_id);
        let req = Self::with_auth(self.http.get(self.endpoint(&path)?), token);
        let dto: HistoryDto = Self::read_json(req).await?;
        Ok(History::from(dto))
    }

    /// Posts a text turn and returns the generated reply, if any.
    pub async fn send_text(
        &self,
        token: &str,
        id: ConversationId,
        text: &str,
    ) -> Result<Option<String>> {
        self.post_conversation(token, id, text, None).await
    }

    /// Posts a file as a data URL alongside its name.
    pub async fn send_file(
        &self,
        token: &str,
        id: ConversationId,
        file: &OutgoingFile,
    ) -> Result<Option<String>> {
        let payload = FilePayload {
            name: &file.name,
            mime: &file.mime,
            url: file.data_url(),
        };
        self.post_conversation(token, id, &file.name, Some(payload))
            .await
    }

    async fn post_conversation(
        &self,
        token: &str,
        id: ConversationId,
        text: &str,
        file: Option<FilePayload<'_>>,
    ) -> Result<Option<String>> {
        let body = ConversationRequest {
            text,
            company_id: id.company_id.to_string(),
            job_id: id.job_id.to_string(),
            file,
        };
        let req = Self::with_auth(self.http.post(self.endpoint("chat/conversation")?), token)
            .json(&body);
        let dto: ReplyDto = Self::read_json(req).await?;
        Ok(dto.reply.filter(|r| !r.trim().is_empty()))
    }

    /// Uploads recorded audio. Returns the stored audio URL.
    pub async fn upload_voice(
        &self,
        token: &str,
        bytes: Vec<u8>,
        file_name: &str,
        mime: &str,
    ) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)?;
        let form = reqwest::multipart::Form::new().part("audio", part);
        let req = Self::with_auth(
            self.http.post(self.endpoint("chat/conversation/voice")?),
            token,
        )
        .multipart(form);
        let dto: VoiceUploadDto = Self::read_json(req).await?;
        Ok(dto.audio_url)
    }
}
