use gtk4::prelude::*;
use gtk4 as gtk;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::api::models::{Conversation, ConversationId};
use crate::directory::DirectoryState;
use crate::router::Route;

pub struct Sidebar {
    root: gtk::Box,
    list: gtk::ListBox,
    search: gtk::SearchEntry,
    spinner: gtk::Spinner,
    empty: gtk::Label,
    items: RefCell<Vec<Conversation>>,
    shown: RefCell<Vec<ConversationId>>,
    selected: Cell<Option<ConversationId>>,
}

impl Sidebar {
    /// `on_open` receives the route path of the activated conversation.
    pub fn new(on_open: impl Fn(String) + 'static) -> Rc<Self> {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 6);
        root.set_margin_top(8);
        root.set_margin_bottom(8);
        root.set_margin_start(8);
        root.set_margin_end(8);
        root.set_width_request(280);

        let title = gtk::Label::new(Some("Chats"));
        title.add_css_class("title-3");
        title.set_halign(gtk::Align::Start);
        root.append(&title);

        let search = gtk::SearchEntry::new();
        search.set_placeholder_text(Some("Search chats"));
        root.append(&search);

        let spinner = gtk::Spinner::new();
        spinner.set_visible(false);
        root.append(&spinner);

        let empty = gtk::Label::new(Some("No conversations yet"));
        empty.add_css_class("dim-label");
        empty.set_visible(false);
        root.append(&empty);

        let list = gtk::ListBox::new();
        list.add_css_class("navigation-sidebar");
        let scroller = gtk::ScrolledWindow::builder()
            .vexpand(true)
            .hscrollbar_policy(gtk::PolicyType::Never)
            .child(&list)
            .build();
        root.append(&scroller);

        let sidebar = Rc::new(Self {
            root,
            list,
            search,
            spinner,
            empty,
            items: RefCell::new(Vec::new()),
            shown: RefCell::new(Vec::new()),
            selected: Cell::new(None),
        });

        {
            let sidebar_for_rows = Rc::downgrade(&sidebar);
            sidebar.list.connect_row_activated(move |_, row| {
                let Some(sidebar) = sidebar_for_rows.upgrade() else {
                    return;
                };
                let picked = usize::try_from(row.index())
                    .ok()
                    .and_then(|i| sidebar.shown.borrow().get(i).copied());
                if let Some(id) = picked {
                    on_open(Route::Chat(id).path());
                }
            });
        }
        {
            let sidebar_for_search = Rc::downgrade(&sidebar);
            sidebar.search.connect_search_changed(move |_| {
                if let Some(sidebar) = sidebar_for_search.upgrade() {
                    sidebar.rebuild();
                }
            });
        }
        sidebar
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    pub fn apply(&self, state: &DirectoryState) {
        self.spinner.set_visible(state.loading);
        if state.loading {
            self.spinner.start();
        } else {
            self.spinner.stop();
        }
        *self.items.borrow_mut() = state.conversations.clone();
        self.empty
            .set_visible(!state.loading && state.conversations.is_empty());
        self.selected.set(state.selected);
        self.rebuild();
    }

    fn rebuild(&self) {
        let selected = self.selected.get();
        while let Some(child) = self.list.first_child() {
            self.list.remove(&child);
        }
        let query = self.search.text().to_lowercase();
        let now = chrono::Local::now();
        let mut shown = Vec::new();
        for conv in self
            .items
            .borrow()
            .iter()
            .filter(|c| query.is_empty() || c.name.to_lowercase().contains(&query))
        {
            let row = conversation_row(conv, &now);
            self.list.append(&row);
            if Some(conv.id) == selected {
                self.list.select_row(Some(&row));
            }
            shown.push(conv.id);
        }
        *self.shown.borrow_mut() = shown;
    }
}

fn conversation_row(conv: &Conversation, now: &chrono::DateTime<chrono::Local>) -> gtk::ListBoxRow {
    let row = gtk::ListBoxRow::new();
    let line = gtk::Box::new(gtk::Orientation::Horizontal, 8);
    line.set_margin_top(6);
    line.set_margin_bottom(6);

    let avatar = gtk::Label::new(Some(&crate::ui::initials(&conv.name)));
    avatar.add_css_class("title-4");
    avatar.set_width_chars(3);
    line.append(&avatar);

    let text = gtk::Box::new(gtk::Orientation::Vertical, 2);
    text.set_hexpand(true);
    let name = gtk::Label::new(Some(&conv.name));
    name.add_css_class("heading");
    name.set_halign(gtk::Align::Start);
    name.set_ellipsize(gtk::pango::EllipsizeMode::End);
    text.append(&name);

    let preview = match (&conv.last_message, &conv.time) {
        (Some(msg), Some(time)) => format!("{msg} · {}", crate::format::relative_time(time, now)),
        (Some(msg), None) => msg.clone(),
        (None, Some(time)) => crate::format::relative_time(time, now),
        (None, None) => String::new(),
    };
    let last = gtk::Label::new(Some(&preview));
    last.add_css_class("dim-label");
    last.set_halign(gtk::Align::Start);
    last.set_ellipsize(gtk::pango::EllipsizeMode::End);
    text.append(&last);
    line.append(&text);

    if conv.is_online() {
        let dot = gtk::Label::new(Some("●"));
        dot.add_css_class("success");
        dot.set_tooltip_text(Some("Active now"));
        line.append(&dot);
    }

    row.set_child(Some(&line));
    row
}
