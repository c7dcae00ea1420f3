use jobchat::api::ApiClient;
use jobchat::api::models::{AttachmentKind, ConversationId, Delivery, OutgoingFile, Sender};
use jobchat::config::Settings;
use jobchat::directory::{ConversationDirectory, DirectoryUpdate};
use jobchat::recording::Recording;
use jobchat::thread::{self, ChatThread};
use jobchat::Error;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{
    body_json, body_partial_json, body_string_contains, header, header_regex, method, path,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "tok-123";

fn settings_for(server: &MockServer) -> Settings {
    Settings {
        base_url: server.uri(),
        ..Settings::default()
    }
}

fn client_for(server: &MockServer) -> ApiClient {
    ApiClient::new(&settings_for(server)).unwrap()
}

#[tokio::test]
async fn login_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/auth"))
        .and(body_json(json!({"phone": "12345678"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": TOKEN})))
        .expect(1)
        .mount(&server)
        .await;

    let token = client_for(&server).login("12345678").await.unwrap();
    assert_eq!(token, TOKEN);
}

#[tokio::test]
async fn otp_flow_sends_then_verifies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/otp/send"))
        .and(body_json(json!({"phone": "12345678"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/user/otp/verify"))
        .and(body_json(json!({"phone": "12345678", "code": "123456"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accessToken": TOKEN})))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    client.send_otp("12345678").await.unwrap();
    assert_eq!(client.verify_otp("12345678", "123456").await.unwrap(), TOKEN);
}

#[tokio::test]
async fn rejected_login_maps_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/user/auth"))
        .respond_with(ResponseTemplate::new(401).set_body_string("unknown phone"))
        .mount(&server)
        .await;

    let err = client_for(&server).login("12345678").await.unwrap_err();
    match err {
        Error::Status { status, body } => {
            assert_eq!(status, 401);
            assert_eq!(body, "unknown phone");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn conversation_list_feeds_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/list"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"companyId": 5, "jobId": 9, "companyName": "Acme", "status": "Active now",
                 "lastMessage": "See you", "time": "2024-05-16 10:00:00"},
                {"companyName": "No ids"},
                {"companyId": "7", "jobId": "1", "companyName": "Globex"}
            ]
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let (items, raw) = ConversationDirectory::fetch(&client, TOKEN).await.unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(raw.len(), 2);
    assert_eq!(items[1].id, ConversationId::new(7, 1));

    let mut directory = ConversationDirectory::new();
    directory.dispatch(DirectoryUpdate::Loaded(items));
    let state = directory.state();
    assert!(!state.loading);
    assert_eq!(state.selected, Some(ConversationId::new(5, 9)));
    assert!(state.active().is_some_and(|c| c.is_online()));
}

#[tokio::test]
async fn list_failure_keeps_directory_usable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/list"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = ConversationDirectory::fetch(&client, TOKEN).await.unwrap_err();
    assert!(matches!(err, Error::Status { status: 500, .. }));

    let mut directory = ConversationDirectory::new();
    directory.dispatch(DirectoryUpdate::Failed(err.to_string()));
    assert!(!directory.state().loading);
    assert!(directory.state().conversations.is_empty());
}

#[tokio::test]
async fn history_loads_into_thread() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/chat/init/5/9"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Acme",
            "avatar": "https://img/acme.png",
            "status": "Active now",
            "textReponse": [
                {"user": "Hello", "chatbot": "Hi! How can I help?"},
                {"user": "https://cdn.example/v/1.mp3", "voice": true},
                {"chatbot": "Nice voice note"}
            ]
        })))
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let client = ApiClient::new(&settings).unwrap();
    let id = ConversationId::new(5, 9);
    let history = ChatThread::fetch_history(&client, TOKEN, id).await.unwrap();

    let mut thread = ChatThread::new(id, &settings);
    assert!(thread.load(id, history));
    let messages = thread.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].text.as_deref(), Some("Hello"));
    assert_eq!(messages[1].sender, Sender::Counterpart);
    assert!(messages[2].is_voice());
    assert_eq!(
        messages[2].attachment.as_ref().map(|a| a.url.as_str()),
        Some("https://cdn.example/v/1.mp3")
    );
    assert_eq!(thread.profile().name.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn text_send_posts_ids_as_strings() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/conversation"))
        .and(header("authorization", "Bearer tok-123"))
        .and(body_json(json!({"text": "Any openings?", "companyId": "5", "jobId": "9"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"textReponse": "Yes, two."})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let client = ApiClient::new(&settings).unwrap();
    let mut thread = ChatThread::new(ConversationId::new(5, 9), &settings);
    let pending = thread.begin_send_text("  Any openings? ").unwrap();
    assert!(thread.is_typing());

    let outcome = thread::deliver(&client, TOKEN, &pending).await;
    assert!(thread.complete(pending.conversation, pending.message_id, outcome));

    let messages = thread.messages();
    assert_eq!(messages[0].delivery, Delivery::Confirmed);
    assert_eq!(messages[1].text.as_deref(), Some("Yes, two."));
    assert_eq!(messages[1].in_reply_to, Some(pending.message_id));
    assert!(!thread.is_typing());
}

#[tokio::test]
async fn voice_send_uploads_then_posts_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/conversation/voice"))
        .and(header_regex("content-type", "^multipart/form-data"))
        .and(body_string_contains("name=\"audio\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"audioUrl": "https://cdn.example/v/2.wav"})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/conversation"))
        .and(body_partial_json(json!({"text": "https://cdn.example/v/2.wav"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"textReponse": "Got your note"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let client = ApiClient::new(&settings).unwrap();
    let mut thread = ChatThread::new(ConversationId::new(5, 9), &settings);
    let pending = thread.begin_send_voice(Recording {
        bytes: vec![0u8; 8000],
        mime: "audio/wav".into(),
        duration_secs: 2.0,
        estimated: true,
    });

    let outcome = thread::deliver(&client, TOKEN, &pending).await;
    assert!(thread.complete(pending.conversation, pending.message_id, outcome));

    let sent = thread.message(pending.message_id).unwrap();
    let attachment = sent.attachment.as_ref().unwrap();
    assert_eq!(attachment.kind, AttachmentKind::Audio);
    assert_eq!(attachment.url, "https://cdn.example/v/2.wav");
    assert_eq!(attachment.duration_ms, Some(2000));
    assert_eq!(thread.messages().last().unwrap().text.as_deref(), Some("Got your note"));
}

#[tokio::test]
async fn failed_send_can_be_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/conversation"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/conversation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"textReponse": ""})))
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let client = ApiClient::new(&settings).unwrap();
    let mut thread = ChatThread::new(ConversationId::new(5, 9), &settings);
    let pending = thread.begin_send_text("hello").unwrap();

    let outcome = thread::deliver(&client, TOKEN, &pending).await;
    assert!(thread.complete(pending.conversation, pending.message_id, outcome));
    assert!(matches!(
        thread.message(pending.message_id).unwrap().delivery,
        Delivery::Failed(_)
    ));

    let again = thread.retry(pending.message_id).unwrap();
    assert_eq!(again, pending);
    let outcome = thread::deliver(&client, TOKEN, &again).await;
    assert!(thread.complete(again.conversation, again.message_id, outcome));
    assert_eq!(thread.messages().len(), 1, "blank reply adds nothing");
    assert_eq!(thread.messages()[0].delivery, Delivery::Confirmed);
}

#[tokio::test]
async fn file_send_posts_data_url() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/conversation"))
        .and(header("authorization", "Bearer tok-123"))
        .and(body_partial_json(json!({
            "text": "cv.pdf",
            "companyId": "5",
            "jobId": "9",
            "file": {
                "name": "cv.pdf",
                "type": "application/pdf",
                "url": "data:application/pdf;base64,JVBERg=="
            }
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"textReponse": "Thanks for the CV"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let settings = settings_for(&server);
    let client = ApiClient::new(&settings).unwrap();
    let mut thread = ChatThread::new(ConversationId::new(5, 9), &settings);
    let pending = thread
        .begin_send_file(OutgoingFile {
            name: "cv.pdf".into(),
            mime: "application/pdf".into(),
            bytes: b"%PDF".to_vec(),
        })
        .unwrap();

    let outcome = thread::deliver(&client, TOKEN, &pending).await;
    assert!(thread.complete(pending.conversation, pending.message_id, outcome));

    let sent = thread.message(pending.message_id).unwrap();
    assert_eq!(sent.delivery, Delivery::Confirmed);
    assert_eq!(sent.attachment.as_ref().map(|a| a.kind), Some(AttachmentKind::File));
    assert_eq!(
        thread.messages().last().unwrap().text.as_deref(),
        Some("Thanks for the CV")
    );
}

#[tokio::test]
async fn slow_reply_times_out_as_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/conversation"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"textReponse": "too late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let settings = Settings {
        request_timeout_secs: Some(1),
        ..settings_for(&server)
    };
    let client = ApiClient::new(&settings).unwrap();
    let mut thread = ChatThread::new(ConversationId::new(5, 9), &settings);
    let pending = thread.begin_send_text("anyone there?").unwrap();

    let outcome = thread::deliver(&client, TOKEN, &pending).await;
    assert!(matches!(&outcome, Err(err) if err.is_network()));
    assert!(thread.complete(pending.conversation, pending.message_id, outcome));

    assert!(matches!(
        thread.message(pending.message_id).unwrap().delivery,
        Delivery::Failed(_)
    ));
    assert!(!thread.is_typing());
    assert_eq!(thread.messages().len(), 1);
}
