use adw::prelude::*;
use adw::Application;

fn main() -> gtk4::glib::ExitCode {
    jobchat::utils::init_logging();

    // An optional route to open first, e.g. `jobchat /chat/5/9`.
    let mut args = std::env::args();
    let program: Vec<String> = args.next().into_iter().collect();
    let initial = args
        .next()
        .unwrap_or_else(|| jobchat::router::CHAT_PATH.to_string());

    let app = Application::builder()
        .application_id("com.example.JobChat")
        .build();
    app.connect_activate(move |app| jobchat::ui::build_ui(app, &initial));
    app.run_with_args(&program)
}
