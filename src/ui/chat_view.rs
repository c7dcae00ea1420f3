use adw::prelude::*;
use gtk4 as gtk;
use gtk4::{gio, glib};
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

use crate::api::models::{
    mime_for_name, AttachmentKind, ConversationId, Delivery, Message, MessageId, OutgoingFile,
    Sender,
};
use crate::recording::{CommandCapture, Recorder, RecorderState};
use crate::thread::{self, ChatThread, PendingSend};
use crate::ui::shell::Shell;
use crate::utils::RUNTIME;

pub struct ChatView {
    shell: Rc<Shell>,
    root: gtk::Box,
    scroller: gtk::ScrolledWindow,
    messages_box: gtk::Box,
    spinner: gtk::Spinner,
    typing: gtk::Label,
    composer: gtk::Box,
    entry: gtk::Entry,
    mic_btn: gtk::Button,
    recording_bar: gtk::Box,
    timer: gtk::Label,
    thread: RefCell<Option<ChatThread>>,
    recorder: Option<RefCell<Recorder<CommandCapture>>>,
    file_dialog: RefCell<Option<gtk::FileChooserNative>>,
}

impl ChatView {
    pub fn new(shell: Rc<Shell>) -> Rc<Self> {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);

        let spinner = gtk::Spinner::new();
        spinner.set_visible(false);
        root.append(&spinner);

        let messages_box = gtk::Box::new(gtk::Orientation::Vertical, 6);
        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hexpand(true)
            .hscrollbar_policy(gtk::PolicyType::Never)
            .child(&messages_box)
            .build();
        root.append(&scroller);

        let typing = gtk::Label::new(Some("typing…"));
        typing.add_css_class("dim-label");
        typing.set_halign(gtk::Align::Start);
        typing.set_visible(false);
        root.append(&typing);

        // Input row
        let composer = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let attach_btn = gtk::Button::from_icon_name("mail-attachment-symbolic");
        attach_btn.set_tooltip_text(Some("Attach a file"));
        let entry = gtk::Entry::new();
        entry.set_hexpand(true);
        entry.set_placeholder_text(Some("Type a message…"));
        let mic_btn = gtk::Button::from_icon_name("audio-input-microphone-symbolic");
        mic_btn.set_tooltip_text(Some("Record a voice message"));
        let send_btn = gtk::Button::with_label("Send");
        send_btn.add_css_class("suggested-action");
        composer.append(&attach_btn);
        composer.append(&entry);
        composer.append(&mic_btn);
        composer.append(&send_btn);
        root.append(&composer);

        // Shown instead of the composer while recording
        let recording_bar = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let cancel_btn = gtk::Button::from_icon_name("user-trash-symbolic");
        cancel_btn.set_tooltip_text(Some("Discard recording"));
        let timer = gtk::Label::new(Some(&crate::format::format_timer(0)));
        timer.set_hexpand(true);
        timer.add_css_class("numeric");
        let send_voice_btn = gtk::Button::with_label("Send");
        send_voice_btn.add_css_class("suggested-action");
        recording_bar.append(&cancel_btn);
        recording_bar.append(&timer);
        recording_bar.append(&send_voice_btn);
        recording_bar.set_visible(false);
        root.append(&recording_bar);

        let recorder = match CommandCapture::from_settings(&shell.settings) {
            Ok(device) => Some(RefCell::new(Recorder::new(device))),
            Err(e) => {
                log::warn!("Voice messages disabled: {e}");
                mic_btn.set_sensitive(false);
                None
            }
        };

        let view = Rc::new(Self {
            shell,
            root,
            scroller,
            messages_box,
            spinner,
            typing,
            composer,
            entry,
            mic_btn,
            recording_bar,
            timer,
            thread: RefCell::new(None),
            recorder,
            file_dialog: RefCell::new(None),
        });

        // Weak so the widgets this view owns do not keep it alive.
        let weak = Rc::downgrade(&view);
        {
            let view_for_send = weak.clone();
            send_btn.connect_clicked(move |_| {
                if let Some(view) = view_for_send.upgrade() {
                    view.send_text();
                }
            });
        }
        {
            let view_for_activate = weak.clone();
            view.entry.connect_activate(move |_| {
                if let Some(view) = view_for_activate.upgrade() {
                    view.send_text();
                }
            });
        }
        {
            let view_for_attach = weak.clone();
            attach_btn.connect_clicked(move |_| {
                if let Some(view) = view_for_attach.upgrade() {
                    view.pick_file();
                }
            });
        }
        {
            let view_for_mic = weak.clone();
            view.mic_btn.connect_clicked(move |_| {
                if let Some(view) = view_for_mic.upgrade() {
                    view.start_recording();
                }
            });
        }
        {
            let view_for_cancel = weak.clone();
            cancel_btn.connect_clicked(move |_| {
                if let Some(view) = view_for_cancel.upgrade() {
                    view.cancel_recording();
                }
            });
        }
        send_voice_btn.connect_clicked(move |_| {
            if let Some(view) = weak.upgrade() {
                view.send_recording();
            }
        });
        view
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    fn current(&self) -> Option<ConversationId> {
        self.thread.borrow().as_ref().map(ChatThread::conversation)
    }

    /// Shows `id`, fetching its history. Results still in flight for the
    /// previous conversation are dropped by the new thread.
    pub fn open(self: &Rc<Self>, id: ConversationId) {
        if self.current() == Some(id) {
            return;
        }
        self.cancel_recording();
        *self.thread.borrow_mut() = Some(ChatThread::new(id, &self.shell.settings));
        self.entry.set_text("");
        self.render();

        let token = match self.shell.session.borrow().require_token() {
            Ok(token) => token,
            Err(e) => {
                self.shell.handle_auth_error(&e);
                return;
            }
        };
        let client = self.shell.client.clone();
        let view = self.clone();
        crate::utils::run_async_to_main(
            async move { ChatThread::fetch_history(&client, &token, id).await },
            move |res| {
                let loaded = match res {
                    Ok(history) => {
                        let mut slot = view.thread.borrow_mut();
                        let applied = slot.as_mut().is_some_and(|t| t.load(id, history));
                        if applied {
                            if let Some(t) = slot.as_ref() {
                                let profile = t.profile();
                                if let Some(name) = profile.name.as_deref() {
                                    let status = if profile.is_online() { "Active now" } else { "" };
                                    view.shell.set_title(name, status);
                                }
                            }
                        }
                        applied
                    }
                    Err(err) => {
                        log::error!("Failed to load conversation {id}: {err}");
                        if let Some(t) = view.thread.borrow_mut().as_mut() {
                            t.load_failed(id);
                        }
                        if view.current() == Some(id) {
                            view.shell.toast("Could not load messages");
                        }
                        view.shell.handle_auth_error(&err);
                        true
                    }
                };
                if loaded {
                    view.render();
                }
            },
        );
    }

    fn send_text(self: &Rc<Self>) {
        let pending = {
            let mut slot = self.thread.borrow_mut();
            let Some(t) = slot.as_mut() else { return };
            match t.begin_send_text(&self.entry.text()) {
                Ok(pending) => pending,
                Err(e) => {
                    log::debug!("Not sending: {e}");
                    return;
                }
            }
        };
        self.entry.set_text("");
        self.render();
        self.dispatch(pending);
    }

    fn retry(self: &Rc<Self>, id: MessageId) {
        let pending = self.thread.borrow_mut().as_mut().and_then(|t| t.retry(id));
        if let Some(pending) = pending {
            self.render();
            self.dispatch(pending);
        }
    }

    /// Runs the network side of a send and folds the outcome back into the
    /// thread.
    fn dispatch(self: &Rc<Self>, pending: PendingSend) {
        let client = self.shell.client.clone();
        let token = self.shell.session.borrow().require_token();
        let view = self.clone();
        crate::utils::run_async_to_main(
            async move {
                let outcome = match token {
                    Ok(token) => thread::deliver(&client, &token, &pending).await,
                    Err(e) => Err(e),
                };
                (pending, outcome)
            },
            move |(pending, outcome)| {
                let failure = outcome.as_ref().err().map(|e| {
                    if e.is_network() {
                        "check your connection".to_string()
                    } else {
                        e.to_string()
                    }
                });
                if let Err(err) = &outcome {
                    view.shell.handle_auth_error(err);
                }
                let applied = view.thread.borrow_mut().as_mut().is_some_and(|t| {
                    t.complete(pending.conversation, pending.message_id, outcome)
                });
                if !applied {
                    return;
                }
                if let Some(reason) = failure {
                    view.shell.toast(&format!("Message not sent: {reason}"));
                }
                view.render();
                view.shell.refresh_conversations();
            },
        );
    }

    fn pick_file(self: &Rc<Self>) {
        let dialog = gtk::FileChooserNative::new(
            Some("Attach a file"),
            Some(self.shell.window()),
            gtk::FileChooserAction::Open,
            Some("Attach"),
            Some("Cancel"),
        );
        let view_for_dialog = Rc::downgrade(self);
        dialog.connect_response(move |dialog, response| {
            let Some(view) = view_for_dialog.upgrade() else {
                return;
            };
            if response == gtk::ResponseType::Accept {
                if let Some(path) = dialog.file().and_then(|f| f.path()) {
                    view.attach(path);
                }
            }
            view.file_dialog.borrow_mut().take();
        });
        dialog.show();
        *self.file_dialog.borrow_mut() = Some(dialog);
    }

    fn attach(self: &Rc<Self>, path: PathBuf) {
        let limit = self.shell.settings.max_attachment_bytes;
        if let Ok(meta) = std::fs::metadata(&path) {
            if meta.len() > limit {
                let err = crate::ValidationError::AttachmentTooLarge {
                    size: meta.len(),
                    limit,
                };
                self.shell.toast(&err.to_string());
                return;
            }
        }

        let Some(conversation) = self.current() else { return };
        let view = self.clone();
        crate::utils::run_async_to_main(
            async move {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file".to_string());
                let read = tokio::task::spawn_blocking(move || std::fs::read(&path)).await;
                match read {
                    Ok(Ok(bytes)) => Ok(OutgoingFile {
                        mime: mime_for_name(&name).to_string(),
                        name,
                        bytes,
                    }),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(e.to_string()),
                }
            },
            move |res| {
                let file = match res {
                    Ok(file) => file,
                    Err(e) => {
                        log::error!("Could not read attachment: {e}");
                        view.shell.toast("Could not read the file");
                        return;
                    }
                };
                if view.current() != Some(conversation) {
                    return;
                }
                let begun = view
                    .thread
                    .borrow_mut()
                    .as_mut()
                    .map(|t| t.begin_send_file(file));
                match begun {
                    Some(Ok(pending)) => {
                        view.render();
                        view.dispatch(pending);
                    }
                    Some(Err(e)) => view.shell.toast(&e.to_string()),
                    None => {}
                }
            },
        );
    }

    fn start_recording(self: &Rc<Self>) {
        let Some(recorder) = &self.recorder else { return };
        // The capture process is spawned onto the shared runtime.
        let started = {
            let _guard = RUNTIME.enter();
            recorder.borrow_mut().start()
        };
        if let Err(e) = started {
            self.shell
                .toast(&format!("Microphone unavailable: {e}"));
            return;
        }

        self.composer.set_visible(false);
        self.recording_bar.set_visible(true);
        self.timer.set_label(&crate::format::format_timer(0));

        let view = self.clone();
        glib::timeout_add_seconds_local(1, move || {
            let Some(recorder) = &view.recorder else {
                return glib::ControlFlow::Break;
            };
            let recorder = recorder.borrow();
            if recorder.state() != RecorderState::Recording {
                return glib::ControlFlow::Break;
            }
            view.timer
                .set_label(&crate::format::format_timer(recorder.elapsed_secs()));
            glib::ControlFlow::Continue
        });
    }

    fn cancel_recording(&self) {
        if let Some(recorder) = &self.recorder {
            if recorder.borrow().state() == RecorderState::Recording {
                recorder.borrow_mut().cancel();
            }
        }
        self.recording_bar.set_visible(false);
        self.composer.set_visible(true);
    }

    fn send_recording(self: &Rc<Self>) {
        let Some(recorder) = &self.recorder else { return };
        let Some(finalizer) = recorder.borrow_mut().stop() else { return };
        self.recording_bar.set_visible(false);
        self.composer.set_visible(true);
        self.mic_btn.set_sensitive(false);

        let conversation = self.current();
        let view = self.clone();
        crate::utils::run_async_to_main(finalizer.finish(), move |recording| {
            if let Some(recorder) = &view.recorder {
                recorder.borrow_mut().finish_encoding();
            }
            view.mic_btn.set_sensitive(true);
            if recording.bytes.is_empty() {
                view.shell.toast("Nothing was recorded");
                return;
            }
            if view.current() != conversation {
                return;
            }
            let pending = view
                .thread
                .borrow_mut()
                .as_mut()
                .map(|t| t.begin_send_voice(recording));
            if let Some(pending) = pending {
                view.render();
                view.dispatch(pending);
            }
        });
    }

    fn render(self: &Rc<Self>) {
        while let Some(child) = self.messages_box.first_child() {
            self.messages_box.remove(&child);
        }
        let slot = self.thread.borrow();
        let Some(t) = slot.as_ref() else { return };

        self.spinner.set_visible(t.is_loading());
        if t.is_loading() {
            self.spinner.start();
        } else {
            self.spinner.stop();
        }
        self.typing.set_visible(t.is_typing());

        for message in t.messages() {
            self.messages_box.append(&self.bubble(message));
        }

        let scroller = self.scroller.clone();
        glib::idle_add_local_once(move || {
            let adj = scroller.vadjustment();
            adj.set_value(adj.upper());
        });
    }

    fn bubble(self: &Rc<Self>, message: &Message) -> gtk::Box {
        let bubble = gtk::Box::new(gtk::Orientation::Vertical, 2);
        bubble.add_css_class("card");
        bubble.set_margin_start(6);
        bubble.set_margin_end(6);
        let mine = message.sender == Sender::User;
        bubble.set_halign(if mine { gtk::Align::End } else { gtk::Align::Start });

        if let Some(text) = message.text.as_deref() {
            let lbl = gtk::Label::new(Some(text));
            lbl.set_wrap(true);
            lbl.set_selectable(true);
            lbl.set_xalign(0.0);
            lbl.set_max_width_chars(60);
            lbl.set_margin_top(6);
            lbl.set_margin_bottom(6);
            lbl.set_margin_start(10);
            lbl.set_margin_end(10);
            bubble.append(&lbl);
        }

        if let Some(attachment) = &message.attachment {
            let name = attachment.name.as_deref().unwrap_or("attachment");
            match attachment.kind {
                AttachmentKind::Audio => {
                    let row = gtk::Box::new(gtk::Orientation::Horizontal, 6);
                    if attachment.url.is_empty() {
                        let lbl = gtk::Label::new(Some("Voice message"));
                        row.append(&lbl);
                    } else {
                        let media = gtk::MediaFile::for_file(&gio::File::for_uri(&attachment.url));
                        let controls = gtk::MediaControls::new(Some(&media));
                        controls.set_width_request(220);
                        row.append(&controls);
                    }
                    if let Some(ms) = attachment.duration_ms {
                        let secs = ms as f64 / 1000.0;
                        let dur = gtk::Label::new(Some(&crate::format::format_duration(secs)));
                        dur.add_css_class("dim-label");
                        row.append(&dur);
                    }
                    bubble.append(&row);
                }
                AttachmentKind::Image | AttachmentKind::Video | AttachmentKind::File => {
                    if attachment.url.is_empty() || attachment.url.starts_with("data:") {
                        let lbl = gtk::Label::new(Some(name));
                        lbl.set_margin_start(10);
                        lbl.set_margin_end(10);
                        bubble.append(&lbl);
                    } else {
                        bubble.append(&gtk::LinkButton::with_label(&attachment.url, name));
                    }
                }
            }
        }

        match &message.delivery {
            Delivery::Confirmed => {}
            Delivery::Pending => {
                let lbl = gtk::Label::new(Some("Sending…"));
                lbl.add_css_class("dim-label");
                lbl.set_halign(gtk::Align::End);
                bubble.append(&lbl);
            }
            Delivery::Failed(reason) => {
                let row = gtk::Box::new(gtk::Orientation::Horizontal, 6);
                let lbl = gtk::Label::new(Some("Not sent"));
                lbl.add_css_class("error");
                lbl.set_tooltip_text(Some(reason));
                let retry_btn = gtk::Button::with_label("Retry");
                retry_btn.add_css_class("flat");
                let view = Rc::downgrade(self);
                let id = message.id;
                retry_btn.connect_clicked(move |_| {
                    if let Some(view) = view.upgrade() {
                        view.retry(id);
                    }
                });
                row.append(&lbl);
                row.append(&retry_btn);
                row.set_halign(gtk::Align::End);
                bubble.append(&row);
            }
        }

        bubble
    }
}
