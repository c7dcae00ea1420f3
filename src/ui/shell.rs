use adw::Application;
use adw::prelude::*;
use gtk4 as gtk;
use gtk4::glib;
use std::cell::RefCell;
use std::rc::Rc;

use crate::api::ApiClient;
use crate::config::Settings;
use crate::directory::{ConversationDirectory, DirectoryUpdate};
use crate::error::{Error, Result};
use crate::router::{Navigator, Route};
use crate::session::SessionStore;
use crate::storage::Cache;
use crate::ui::main_window::MainWindow;

/// Owns the window and the state shared by every page, and swaps pages on
/// navigation.
pub struct Shell {
    window: adw::ApplicationWindow,
    overlay: adw::ToastOverlay,
    title: adw::WindowTitle,
    refresh_btn: gtk::Button,
    logout_btn: gtk::Button,
    pub settings: Settings,
    pub client: ApiClient,
    pub session: RefCell<SessionStore>,
    pub directory: RefCell<ConversationDirectory>,
    cache: RefCell<Option<Cache>>,
    navigator: RefCell<Navigator>,
    layout: RefCell<Option<Rc<MainWindow>>>,
}

impl Shell {
    pub fn new(app: &Application) -> Result<Rc<Self>> {
        let settings = Settings::load();
        let client = ApiClient::new(&settings).or_else(|e| {
            log::error!("Invalid server settings ({e}), using defaults");
            ApiClient::new(&Settings::default())
        })?;
        log::info!("Using chat service at {}", client.base_url());
        let session = SessionStore::open_default();
        if let Some(path) = session.path() {
            log::debug!("Session file: {}", path.display());
        }
        let cache = match Cache::open_default() {
            Ok(cache) => Some(cache),
            Err(e) => {
                log::warn!("Conversation cache unavailable: {e}");
                None
            }
        };

        let window = adw::ApplicationWindow::builder()
            .application(app)
            .title("Job Chat")
            .default_width(960)
            .default_height(640)
            .build();

        let overlay = adw::ToastOverlay::new();
        let container = gtk::Box::new(gtk::Orientation::Vertical, 0);
        let header = adw::HeaderBar::new();
        let title = adw::WindowTitle::new("Job Chat", "");
        header.set_title_widget(Some(&title));

        let logout_btn = gtk::Button::with_label("Log out");
        let refresh_btn = gtk::Button::from_icon_name("view-refresh-symbolic");
        refresh_btn.set_tooltip_text(Some("Refresh conversations"));
        header.pack_end(&logout_btn);
        header.pack_start(&refresh_btn);
        container.append(&header);
        overlay.set_vexpand(true);
        container.append(&overlay);
        window.set_content(Some(&container));

        let shell = Rc::new(Self {
            window,
            overlay,
            title,
            refresh_btn,
            logout_btn,
            settings,
            client,
            session: RefCell::new(session),
            directory: RefCell::new(ConversationDirectory::new()),
            cache: RefCell::new(cache),
            navigator: RefCell::new(Navigator::default()),
            layout: RefCell::new(None),
        });

        // The shell owns these buttons; the handlers must not own the shell.
        {
            let shell_for_refresh = Rc::downgrade(&shell);
            shell.refresh_btn.connect_clicked(move |_| {
                if let Some(shell) = shell_for_refresh.upgrade() {
                    shell.refresh_conversations();
                }
            });
        }
        {
            let shell_for_logout = Rc::downgrade(&shell);
            shell.logout_btn.connect_clicked(move |_| {
                if let Some(shell) = shell_for_logout.upgrade() {
                    shell.logout();
                }
            });
        }
        Ok(shell)
    }

    pub fn present(&self) {
        self.window.present();
    }

    pub fn window(&self) -> &adw::ApplicationWindow {
        &self.window
    }

    pub fn toast(&self, message: &str) {
        self.overlay.add_toast(adw::Toast::new(message));
    }

    pub fn set_title(&self, title: &str, subtitle: &str) {
        self.title.set_title(title);
        self.title.set_subtitle(subtitle);
    }

    pub fn navigate(self: &Rc<Self>, path: &str) {
        let result = {
            let mut session = self.session.borrow_mut();
            self.navigator.borrow_mut().navigate(path, &mut session)
        };
        match result {
            Ok(route) => self.show(route),
            Err(e) => {
                log::error!("Navigation to {path} failed: {e}");
                self.show(Route::Login);
            }
        }
    }

    /// Called by the login page once a token is stored.
    pub fn on_logged_in(self: &Rc<Self>) {
        let result = {
            let mut session = self.session.borrow_mut();
            self.navigator.borrow_mut().complete_login(&mut session)
        };
        match result {
            Ok(route) => self.show(route),
            Err(e) => {
                log::error!("Could not restore redirect: {e}");
                self.navigate(crate::router::CHAT_PATH);
            }
        }
    }

    fn show(self: &Rc<Self>, route: Route) {
        let on_chat = route.is_protected();
        self.refresh_btn.set_visible(on_chat);
        self.logout_btn.set_visible(on_chat);

        match route {
            Route::Login => {
                self.set_title("Job Chat", "Sign in with your phone number");
                self.overlay
                    .set_child(Some(&crate::ui::login::LoginPage::new(self.clone()).widget()));
            }
            Route::NotFound => {
                self.set_title("Job Chat", "");
                self.overlay
                    .set_child(Some(&crate::ui::not_found::page(self.clone())));
            }
            Route::ChatIndex => {
                let layout = self.ensure_layout();
                let selected = self.directory.borrow().state().selected;
                let settled = self.navigator.borrow_mut().settle_index(selected);
                match settled {
                    Route::Chat(id) => layout.open_conversation(id),
                    _ => layout.show_empty(self.directory.borrow().state().loading),
                }
            }
            Route::Chat(id) => {
                let layout = self.ensure_layout();
                self.directory
                    .borrow_mut()
                    .dispatch(DirectoryUpdate::Select(id));
                layout.open_conversation(id);
            }
        }
    }

    fn ensure_layout(self: &Rc<Self>) -> Rc<MainWindow> {
        if let Some(layout) = self.layout.borrow().as_ref() {
            self.overlay.set_child(Some(&layout.widget()));
            return layout.clone();
        }

        let layout = MainWindow::new(self.clone());
        self.overlay.set_child(Some(&layout.widget()));
        *self.layout.borrow_mut() = Some(layout.clone());

        {
            let shell_for_updates = Rc::downgrade(self);
            let layout_for_updates = Rc::downgrade(&layout);
            self.directory.borrow_mut().subscribe(move |state| {
                let (Some(shell), Some(layout)) =
                    (shell_for_updates.upgrade(), layout_for_updates.upgrade())
                else {
                    return;
                };
                layout.apply_directory(state);
                if shell.navigator.borrow().current() == Route::ChatIndex {
                    if let Some(id) = state.selected {
                        // Navigation re-enters the directory, so leave dispatch first.
                        let shell = shell.clone();
                        glib::idle_add_local_once(move || {
                            shell.navigate(&Route::Chat(id).path());
                        });
                    }
                }
            });
        }

        let cached = self
            .cache
            .borrow()
            .as_ref()
            .and_then(|cache| cache.conversations(Some(200)).ok())
            .unwrap_or_default();
        if !cached.is_empty() {
            self.directory
                .borrow_mut()
                .dispatch(DirectoryUpdate::Loaded(cached));
        }
        self.refresh_conversations();
        layout
    }

    pub fn refresh_conversations(self: &Rc<Self>) {
        let Some(token) = self.session.borrow().token().map(str::to_string) else {
            return;
        };
        self.directory.borrow_mut().dispatch(DirectoryUpdate::Loading);

        let client = self.client.clone();
        let shell = self.clone();
        crate::utils::run_async_to_main(
            async move { ConversationDirectory::fetch(&client, &token).await },
            move |res| match res {
                Ok((items, raw)) => {
                    if let Some(cache) = shell.cache.borrow_mut().as_mut() {
                        if let Err(e) = cache.replace_conversations(&items, Some(&raw)) {
                            log::warn!("Could not cache conversations: {e}");
                        }
                    }
                    shell
                        .directory
                        .borrow_mut()
                        .dispatch(DirectoryUpdate::Loaded(items));
                }
                Err(err) => {
                    shell
                        .directory
                        .borrow_mut()
                        .dispatch(DirectoryUpdate::Failed(err.to_string()));
                    shell.handle_auth_error(&err);
                    shell.toast(&format!("Failed to load chats: {err}"));
                }
            },
        );
    }

    /// A rejected token sends the user back through login on the next navigation.
    pub fn handle_auth_error(self: &Rc<Self>, err: &Error) {
        if matches!(err, Error::Status { status: 401, .. } | Error::Unauthenticated) {
            log::info!("Session rejected by server, signing out");
            let current = self.navigator.borrow().current().path();
            if let Err(e) = self.session.borrow_mut().clear() {
                log::warn!("Could not clear session: {e}");
            }
            self.navigate(&current);
        }
    }

    pub fn logout(self: &Rc<Self>) {
        if let Err(e) = self.session.borrow_mut().clear() {
            log::warn!("Could not clear session: {e}");
        }
        if let Some(cache) = self.cache.borrow_mut().as_mut() {
            if let Err(e) = cache.clear() {
                log::warn!("Could not clear cache: {e}");
            }
        }
        *self.layout.borrow_mut() = None;
        *self.directory.borrow_mut() = ConversationDirectory::new();
        self.navigate(crate::router::LOGIN_PATH);
    }
}
