use adw::prelude::*;
use gtk4 as gtk;
use gtk4::glib;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::auth::{format_phone, LoginStep, OtpEntry, PhoneNumber, ResendCountdown};
use crate::config::AuthFlow;
use crate::ui::shell::Shell;

pub struct LoginPage {
    shell: Rc<Shell>,
    root: gtk::Box,
    stack: gtk::Stack,
    phone_entry: gtk::Entry,
    status: gtk::Label,
    login_btn: gtk::Button,
    cells: Vec<gtk::Entry>,
    verify_btn: gtk::Button,
    resend_btn: gtk::Button,
    otp: RefCell<OtpEntry>,
    phone: RefCell<Option<PhoneNumber>>,
    countdown: Cell<ResendCountdown>,
    step: Cell<LoginStep>,
    // Set while a cell is being rewritten from code.
    syncing: Cell<bool>,
}

impl LoginPage {
    pub fn new(shell: Rc<Shell>) -> Rc<Self> {
        let root = gtk::Box::new(gtk::Orientation::Vertical, 12);
        root.set_margin_top(24);
        root.set_margin_bottom(24);
        root.set_margin_start(24);
        root.set_margin_end(24);
        root.set_halign(gtk::Align::Center);
        root.set_valign(gtk::Align::Center);
        root.set_width_request(360);

        let title = gtk::Label::new(Some("Welcome back"));
        title.add_css_class("title-2");
        title.set_halign(gtk::Align::Start);
        root.append(&title);

        let stack = gtk::Stack::new();
        stack.set_transition_type(gtk::StackTransitionType::SlideLeftRight);

        // Phone step
        let phone_form = gtk::Box::new(gtk::Orientation::Vertical, 8);
        let phone_entry = gtk::Entry::new();
        phone_entry.set_placeholder_text(Some("Phone number"));
        phone_entry.set_input_purpose(gtk::InputPurpose::Phone);
        phone_entry.set_hexpand(true);
        phone_form.append(&phone_entry);
        let login_btn = gtk::Button::with_label("Continue");
        login_btn.add_css_class("suggested-action");
        login_btn.set_halign(gtk::Align::End);
        phone_form.append(&login_btn);
        stack.add_named(&phone_form, Some("phone"));

        // Code step
        let code_form = gtk::Box::new(gtk::Orientation::Vertical, 8);
        let hint = gtk::Label::new(Some("Enter the code we sent you"));
        hint.set_halign(gtk::Align::Start);
        code_form.append(&hint);
        let cell_row = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        cell_row.set_halign(gtk::Align::Center);
        let otp_len = shell.settings.otp_digits;
        let cells: Vec<gtk::Entry> = (0..otp_len)
            .map(|_| {
                let cell = gtk::Entry::new();
                cell.set_max_length(1);
                cell.set_width_chars(2);
                cell.set_max_width_chars(2);
                cell.set_alignment(0.5);
                cell.set_input_purpose(gtk::InputPurpose::Digits);
                cell_row.append(&cell);
                cell
            })
            .collect();
        code_form.append(&cell_row);
        let code_actions = gtk::Box::new(gtk::Orientation::Horizontal, 6);
        let back_btn = gtk::Button::with_label("Change number");
        back_btn.add_css_class("flat");
        let resend_btn = gtk::Button::with_label("Resend code");
        resend_btn.add_css_class("flat");
        let verify_btn = gtk::Button::with_label("Verify");
        verify_btn.add_css_class("suggested-action");
        verify_btn.set_hexpand(true);
        verify_btn.set_halign(gtk::Align::End);
        code_actions.append(&back_btn);
        code_actions.append(&resend_btn);
        code_actions.append(&verify_btn);
        code_form.append(&code_actions);
        stack.add_named(&code_form, Some("code"));

        root.append(&stack);

        // Status label (small, muted)
        let status = gtk::Label::new(None);
        status.add_css_class("dim-label");
        status.set_halign(gtk::Align::Start);
        status.set_wrap(true);
        root.append(&status);

        let page = Rc::new(Self {
            shell,
            root,
            stack,
            phone_entry,
            status,
            login_btn,
            cells,
            verify_btn,
            resend_btn,
            otp: RefCell::new(OtpEntry::new(otp_len)),
            phone: RefCell::new(None),
            countdown: Cell::new(ResendCountdown::start()),
            step: Cell::new(LoginStep::Phone),
            syncing: Cell::new(false),
        });

        {
            let max_digits = page.shell.settings.phone_digits;
            page.phone_entry.connect_changed(move |entry| {
                let formatted = format_phone(&entry.text(), max_digits);
                if formatted != entry.text().as_str() {
                    entry.set_text(&formatted);
                    entry.set_position(-1);
                }
            });
        }
        // Handlers hold the page weakly so dropping the page frees it.
        let weak = Rc::downgrade(&page);
        {
            let page_for_click = weak.clone();
            page.login_btn.connect_clicked(move |_| {
                if let Some(page) = page_for_click.upgrade() {
                    page.submit_phone();
                }
            });
        }
        {
            let page_for_enter = weak.clone();
            page.phone_entry.connect_activate(move |_| {
                if let Some(page) = page_for_enter.upgrade() {
                    page.submit_phone();
                }
            });
        }
        for (index, cell) in page.cells.iter().enumerate() {
            let page_for_cell = weak.clone();
            cell.connect_changed(move |cell| {
                if let Some(page) = page_for_cell.upgrade() {
                    page.cell_changed(index, cell);
                }
            });
            let page_for_verify = weak.clone();
            cell.connect_activate(move |_| {
                if let Some(page) = page_for_verify.upgrade() {
                    page.submit_code();
                }
            });
        }
        {
            let page_for_verify = weak.clone();
            page.verify_btn.connect_clicked(move |_| {
                if let Some(page) = page_for_verify.upgrade() {
                    page.submit_code();
                }
            });
        }
        {
            let page_for_resend = weak.clone();
            page.resend_btn.connect_clicked(move |_| {
                if let Some(page) = page_for_resend.upgrade() {
                    page.request_code();
                }
            });
        }
        back_btn.connect_clicked(move |_| {
            if let Some(page) = weak.upgrade() {
                page.show_step(LoginStep::Phone);
            }
        });

        page.phone_entry.grab_focus();
        page
    }

    pub fn widget(&self) -> gtk::Widget {
        self.root.clone().upcast()
    }

    fn set_status(&self, text: &str, is_error: bool) {
        self.status.set_label(text);
        if is_error {
            self.status.remove_css_class("dim-label");
            self.status.add_css_class("error");
        } else {
            self.status.remove_css_class("error");
            self.status.add_css_class("dim-label");
        }
    }

    fn set_busy(&self, busy: bool) {
        self.login_btn.set_sensitive(!busy);
        self.verify_btn.set_sensitive(!busy);
    }

    fn show_step(&self, step: LoginStep) {
        self.step.set(step);
        match step {
            LoginStep::Phone => {
                self.stack.set_visible_child_name("phone");
                self.phone_entry.grab_focus();
            }
            LoginStep::Code => {
                self.otp.borrow_mut().clear();
                self.syncing.set(true);
                for cell in &self.cells {
                    cell.set_text("");
                }
                self.syncing.set(false);
                self.stack.set_visible_child_name("code");
                if let Some(first) = self.cells.first() {
                    first.grab_focus();
                }
            }
        }
        self.set_status("", false);
    }

    fn cell_changed(&self, index: usize, cell: &gtk::Entry) {
        if self.syncing.get() {
            return;
        }
        let text = cell.text();
        let next = self.otp.borrow_mut().set(index, text.as_str());
        match next {
            Some(next) => {
                if !text.is_empty() {
                    if let Some(target) = self.cells.get(next) {
                        target.grab_focus();
                    }
                }
            }
            None => {
                // Not a digit: drop what was typed.
                self.syncing.set(true);
                cell.set_text("");
                self.syncing.set(false);
                self.otp.borrow_mut().set(index, "");
            }
        }
    }

    fn submit_phone(self: &Rc<Self>) {
        let digits = self.shell.settings.phone_digits;
        let phone = match PhoneNumber::parse(&self.phone_entry.text(), digits) {
            Ok(phone) => phone,
            Err(e) => {
                log::debug!("Rejected phone input: {e}");
                self.set_status(
                    &format!("Please enter a valid {digits}-digit phone number"),
                    true,
                );
                return;
            }
        };
        *self.phone.borrow_mut() = Some(phone.clone());

        match self.shell.settings.auth_flow {
            AuthFlow::Direct => {
                self.set_busy(true);
                self.set_status("Signing in…", false);
                let client = self.shell.client.clone();
                let page = self.clone();
                crate::utils::run_async_to_main(
                    async move { client.login(phone.digits()).await },
                    move |res| page.finish(res),
                );
            }
            AuthFlow::Otp => self.request_code(),
        }
    }

    fn request_code(self: &Rc<Self>) {
        if self.step.get() == LoginStep::Code && !self.countdown.get().can_resend() {
            return;
        }
        let Some(phone) = self.phone.borrow().clone() else {
            self.show_step(LoginStep::Phone);
            return;
        };
        self.set_busy(true);
        self.set_status("Sending code…", false);
        let client = self.shell.client.clone();
        let page = self.clone();
        crate::utils::run_async_to_main(
            async move { client.send_otp(phone.digits()).await },
            move |res| {
                page.set_busy(false);
                match res {
                    Ok(()) => {
                        if page.step.get() != LoginStep::Code {
                            page.show_step(LoginStep::Code);
                        }
                        page.start_countdown();
                        page.set_status("Code sent", false);
                    }
                    Err(err) => {
                        log::error!("Sending code failed: {err}");
                        page.set_status("Could not send the code", true);
                        page.shell.toast(&format!("Could not send the code: {err}"));
                    }
                }
            },
        );
    }

    fn start_countdown(self: &Rc<Self>) {
        self.countdown.set(ResendCountdown::start());
        self.resend_btn.set_sensitive(false);
        self.resend_btn
            .set_label(&format!("Resend in {}s", self.countdown.get().remaining()));

        let page = self.clone();
        glib::timeout_add_seconds_local(1, move || {
            let mut countdown = page.countdown.get();
            let running = countdown.tick();
            page.countdown.set(countdown);
            if running {
                page.resend_btn
                    .set_label(&format!("Resend in {}s", countdown.remaining()));
                glib::ControlFlow::Continue
            } else {
                page.resend_btn.set_label("Resend code");
                page.resend_btn.set_sensitive(true);
                glib::ControlFlow::Break
            }
        });
    }

    fn submit_code(self: &Rc<Self>) {
        let code = match self.otp.borrow().code() {
            Ok(code) => code,
            Err(e) => {
                self.set_status(&format!("{e}"), true);
                return;
            }
        };
        let Some(phone) = self.phone.borrow().clone() else {
            self.show_step(LoginStep::Phone);
            return;
        };
        self.set_busy(true);
        self.set_status("Verifying…", false);
        let client = self.shell.client.clone();
        let page = self.clone();
        crate::utils::run_async_to_main(
            async move { client.verify_otp(phone.digits(), &code).await },
            move |res| page.finish(res),
        );
    }

    fn finish(&self, res: crate::Result<String>) {
        self.set_busy(false);
        match res {
            Ok(token) => {
                let stored = self
                    .shell
                    .session
                    .borrow_mut()
                    .set_token(token, self.shell.settings.token_ttl());
                if let Err(e) = stored {
                    log::warn!("Session not persisted: {e}");
                    self.shell.toast("Signed in, but the session could not be saved");
                }
                log::info!("Signed in");
                self.shell.on_logged_in();
            }
            Err(err) => {
                log::error!("Login failed: {err}");
                self.set_status("Login failed. Check your number and try again.", true);
                self.shell.toast(&format!("Login failed: {err}"));
            }
        }
    }
}
