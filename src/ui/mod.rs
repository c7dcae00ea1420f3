pub mod chat_view;
pub mod login;
pub mod main_window;
pub mod not_found;
pub mod shell;
pub mod sidebar;

use adw::Application;
use adw::prelude::*;

pub fn build_ui(app: &Application, initial_path: &str) {
    match shell::Shell::new(app) {
        Ok(shell) => {
            shell.navigate(initial_path);
            shell.present();
        }
        Err(e) => {
            log::error!("Could not start: {e}");
            app.quit();
        }
    }
}

/// Up to two initials for an avatar placeholder.
pub(crate) fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|w| w.chars().next())
        .take(2)
        .flat_map(char::to_uppercase)
        .collect()
}
