use adw::prelude::*;
use gtk4 as gtk;
use std::rc::Rc;

use crate::api::models::ConversationId;
use crate::directory::DirectoryState;
use crate::ui::chat_view::ChatView;
use crate::ui::shell::Shell;
use crate::ui::sidebar::Sidebar;

/// Sidebar plus the message pane, shown on every `/chat` route.
pub struct MainWindow {
    shell: Rc<Shell>,
    split: adw::Flap,
    stack: gtk::Stack,
    empty: adw::StatusPage,
    sidebar: Rc<Sidebar>,
    chat: Rc<ChatView>,
}

impl MainWindow {
    pub fn new(shell: Rc<Shell>) -> Rc<Self> {
        let split = adw::Flap::builder()
            .reveal_flap(true)
            .locked(true)
            .modal(false)
            .build();

        let sidebar = {
            let shell = Rc::downgrade(&shell);
            Sidebar::new(move |path| {
                if let Some(shell) = shell.upgrade() {
                    shell.navigate(&path);
                }
            })
        };
        split.set_flap(Some(&sidebar.widget()));
        split.set_separator(Some(&gtk::Separator::new(gtk::Orientation::Vertical)));

        let chat = ChatView::new(shell.clone());
        let empty = adw::StatusPage::builder()
            .icon_name("mail-message-new-symbolic")
            .title("No conversation selected")
            .build();

        let stack = gtk::Stack::new();
        stack.set_hexpand(true);
        stack.add_named(&chat.widget(), Some("chat"));
        stack.add_named(&empty, Some("empty"));
        split.set_content(Some(&stack));

        Rc::new(Self {
            shell,
            split,
            stack,
            empty,
            sidebar,
            chat,
        })
    }

    pub fn widget(&self) -> gtk::Widget {
        self.split.clone().upcast()
    }

    pub fn apply_directory(&self, state: &DirectoryState) {
        self.sidebar.apply(state);
        if self.stack.visible_child_name().as_deref() == Some("empty") {
            self.show_empty(state.loading);
        } else if let Some(conv) = state.active() {
            let status = if conv.is_online() { "Active now" } else { "" };
            self.shell.set_title(&conv.name, status);
        }
    }

    pub fn open_conversation(&self, id: ConversationId) {
        self.stack.set_visible_child_name("chat");
        self.chat.open(id);
    }

    pub fn show_empty(&self, loading: bool) {
        self.shell.set_title("Chats", "");
        if loading {
            self.empty.set_title("Loading conversations…");
            self.empty.set_description(None);
        } else {
            self.empty.set_title("No conversations yet");
            self.empty
                .set_description(Some("Conversations with employers will show up here."));
        }
        self.stack.set_visible_child_name("empty");
    }
}
