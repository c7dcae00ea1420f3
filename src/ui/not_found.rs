use adw::prelude::*;
use gtk4 as gtk;
use std::rc::Rc;

use crate::router::CHAT_PATH;
use crate::ui::shell::Shell;

pub fn page(shell: Rc<Shell>) -> gtk::Widget {
    let home_btn = gtk::Button::with_label("Go to Home");
    home_btn.add_css_class("suggested-action");
    home_btn.add_css_class("pill");
    home_btn.set_halign(gtk::Align::Center);
    let shell = Rc::downgrade(&shell);
    home_btn.connect_clicked(move |_| {
        if let Some(shell) = shell.upgrade() {
            shell.navigate(CHAT_PATH);
        }
    });

    adw::StatusPage::builder()
        .icon_name("dialog-question-symbolic")
        .title("404 - Page Not Found")
        .description("The page you are looking for does not exist.")
        .child(&home_btn)
        .build()
        .upcast()
}
