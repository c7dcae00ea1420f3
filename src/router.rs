use crate::api::models::ConversationId;
use crate::error::Result;
use crate::session::SessionStore;

pub const LOGIN_PATH: &str = "/login";
pub const CHAT_PATH: &str = "/chat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Login,
    ChatIndex,
    Chat(ConversationId),
    NotFound,
}

impl Route {
    pub fn parse(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match segments.as_slice() {
            ["login"] => Route::Login,
            ["chat"] => Route::ChatIndex,
            ["chat", company, job] => match (company.parse::<u64>(), job.parse::<u64>()) {
                (Ok(company_id), Ok(job_id)) => Route::Chat(ConversationId::new(company_id, job_id)),
                _ => Route::NotFound,
            },
            _ => Route::NotFound,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Login => LOGIN_PATH.to_string(),
            Route::ChatIndex => CHAT_PATH.to_string(),
            Route::Chat(id) => format!("{CHAT_PATH}/{}/{}", id.company_id, id.job_id),
            Route::NotFound => "/404".to_string(),
        }
    }

    pub fn is_protected(&self) -> bool {
        matches!(self, Route::ChatIndex | Route::Chat(_))
    }
}

/// Decides what to show for a requested path. Unauthenticated access to a
/// protected route remembers the path and lands on the login page.
pub fn guard(path: &str, session: &mut SessionStore) -> Result<Route> {
    let route = Route::parse(path);
    if route.is_protected() && !session.is_authenticated() {
        log::info!("Redirecting {path} to login");
        session.remember_redirect(path)?;
        return Ok(Route::Login);
    }
    Ok(route)
}

/// Where to go once a token has been stored.
pub fn after_login(session: &mut SessionStore) -> Result<Route> {
    let target = session
        .take_redirect()?
        .unwrap_or_else(|| CHAT_PATH.to_string());
    guard(&target, session)
}

/// `/chat` has no content of its own; it forwards to the selected conversation.
pub fn resolve_index(route: Route, selected: Option<ConversationId>) -> Route {
    match (route, selected) {
        (Route::ChatIndex, Some(id)) => Route::Chat(id),
        _ => route,
    }
}

/// Tracks the current route. Navigation only ever goes through `guard`.
#[derive(Debug)]
pub struct Navigator {
    current: Route,
}

impl Default for Navigator {
    fn default() -> Self {
        Self {
            current: Route::Login,
        }
    }
}

impl Navigator {
    pub fn current(&self) -> Route {
        self.current
    }

    pub fn navigate(&mut self, path: &str, session: &mut SessionStore) -> Result<Route> {
        self.current = guard(path, session)?;
        log::debug!("Navigated to {}", self.current.path());
        Ok(self.current)
    }

    pub fn complete_login(&mut self, session: &mut SessionStore) -> Result<Route> {
        self.current = after_login(session)?;
        Ok(self.current)
    }

    /// Replaces `/chat` with the selected conversation, if there is one.
    pub fn settle_index(&mut self, selected: Option<ConversationId>) -> Route {
        self.current = resolve_index(self.current, selected);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn parses_known_routes() {
        assert_eq!(Route::parse("/login"), Route::Login);
        assert_eq!(Route::parse("/chat"), Route::ChatIndex);
        assert_eq!(Route::parse("/chat/"), Route::ChatIndex);
        assert_eq!(
            Route::parse("/chat/5/9"),
            Route::Chat(ConversationId::new(5, 9))
        );
        assert_eq!(Route::parse("/chat/5/9?x=1"), Route::Chat(ConversationId::new(5, 9)));
        assert_eq!(Route::parse("/chat/a/9"), Route::NotFound);
        assert_eq!(Route::parse("/chat/5"), Route::NotFound);
        assert_eq!(Route::parse("/"), Route::NotFound);
        assert_eq!(Route::parse("/settings"), Route::NotFound);
        assert_eq!(Route::Chat(ConversationId::new(5, 9)).path(), "/chat/5/9");
    }

    #[test]
    fn login_replays_requested_path() {
        let mut session = SessionStore::in_memory();
        let mut nav = Navigator::default();

        assert_eq!(nav.navigate("/chat/5/9", &mut session).unwrap(), Route::Login);

        session.set_token("token", Duration::days(7)).unwrap();
        assert_eq!(
            nav.complete_login(&mut session).unwrap(),
            Route::Chat(ConversationId::new(5, 9))
        );
        assert_eq!(nav.current().path(), "/chat/5/9");

        // The remembered path is used only once.
        assert_eq!(after_login(&mut session).unwrap(), Route::ChatIndex);
    }

    #[test]
    fn public_routes_skip_the_guard() {
        let mut session = SessionStore::in_memory();
        assert_eq!(guard("/login", &mut session).unwrap(), Route::Login);
        assert_eq!(guard("/nowhere", &mut session).unwrap(), Route::NotFound);
        assert_eq!(session.take_redirect().unwrap(), None);
    }

    #[test]
    fn index_forwards_to_selection() {
        let id = ConversationId::new(1, 2);
        assert_eq!(resolve_index(Route::ChatIndex, Some(id)), Route::Chat(id));
        assert_eq!(resolve_index(Route::ChatIndex, None), Route::ChatIndex);
        let other = Route::Chat(ConversationId::new(3, 4));
        assert_eq!(resolve_index(other, Some(id)), other);
    }
}
