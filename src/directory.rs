use crate::api::ApiClient;
use crate::api::models::{Conversation, ConversationId};
use crate::error::Result;
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryState {
    pub conversations: Vec<Conversation>,
    pub selected: Option<ConversationId>,
    pub loading: bool,
}

impl DirectoryState {
    pub fn find(&self, id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn active(&self) -> Option<&Conversation> {
        self.selected.and_then(|id| self.find(id))
    }
}

#[derive(Debug, Clone)]
pub enum DirectoryUpdate {
    Loading,
    Loaded(Vec<Conversation>),
    Failed(String),
    Select(ConversationId),
}

pub type SubscriberId = usize;

type Subscriber = Box<dyn Fn(&DirectoryState)>;

/// The user's conversation list, shared by the sidebar, header and shell.
///
/// All changes go through [`ConversationDirectory::dispatch`], which then
/// notifies every subscriber with the new state.
pub struct ConversationDirectory {
    state: DirectoryState,
    subscribers: Vec<(SubscriberId, Subscriber)>,
    next_subscriber: SubscriberId,
}

impl Default for ConversationDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationDirectory {
    pub fn new() -> Self {
        Self {
            state: DirectoryState {
                loading: true,
                ..DirectoryState::default()
            },
            subscribers: Vec::new(),
            next_subscriber: 0,
        }
    }

    pub fn state(&self) -> &DirectoryState {
        &self.state
    }

    pub fn subscribe(&mut self, f: impl Fn(&DirectoryState) + 'static) -> SubscriberId {
        let id = self.next_subscriber;
        self.next_subscriber += 1;
        self.subscribers.push((id, Box::new(f)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn dispatch(&mut self, update: DirectoryUpdate) {
        match update {
            DirectoryUpdate::Loading => self.state.loading = true,
            DirectoryUpdate::Loaded(list) => {
                if self.state.selected.is_none() {
                    self.state.selected = list.first().map(|c| c.id);
                }
                self.state.conversations = list;
                self.state.loading = false;
            }
            DirectoryUpdate::Failed(reason) => {
                log::error!("Failed to load conversations: {reason}");
                self.state.loading = false;
            }
            DirectoryUpdate::Select(id) => self.state.selected = Some(id),
        }
        for (_, subscriber) in &self.subscribers {
            subscriber(&self.state);
        }
    }

    /// Fetches the list. The caller feeds the outcome back through `dispatch`.
    pub async fn fetch(client: &ApiClient, token: &str) -> Result<(Vec<Conversation>, Vec<Value>)> {
        client.conversations(token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn conv(company: u64, job: u64) -> Conversation {
        Conversation {
            id: ConversationId::new(company, job),
            name: format!("Company {company}"),
            photo_url: None,
            status: None,
            last_message: None,
            time: None,
        }
    }

    #[test]
    fn first_conversation_is_selected() {
        let mut dir = ConversationDirectory::new();
        assert!(dir.state().loading);
        dir.dispatch(DirectoryUpdate::Loaded(vec![conv(7, 1), conv(3, 2)]));
        assert_eq!(dir.state().selected, Some(ConversationId::new(7, 1)));
        assert!(!dir.state().loading);
        assert_eq!(dir.state().active().map(|c| c.name.as_str()), Some("Company 7"));
    }

    #[test]
    fn existing_selection_survives_refresh() {
        let mut dir = ConversationDirectory::new();
        dir.dispatch(DirectoryUpdate::Select(ConversationId::new(3, 2)));
        dir.dispatch(DirectoryUpdate::Loaded(vec![conv(7, 1), conv(3, 2)]));
        assert_eq!(dir.state().selected, Some(ConversationId::new(3, 2)));
    }

    #[test]
    fn empty_list_selects_nothing() {
        let mut dir = ConversationDirectory::new();
        dir.dispatch(DirectoryUpdate::Loaded(Vec::new()));
        assert_eq!(dir.state().selected, None);
        assert!(!dir.state().loading);
    }

    #[test]
    fn failure_only_stops_loading() {
        let mut dir = ConversationDirectory::new();
        dir.dispatch(DirectoryUpdate::Loaded(vec![conv(1, 1)]));
        dir.dispatch(DirectoryUpdate::Loading);
        assert!(dir.state().loading);
        dir.dispatch(DirectoryUpdate::Failed("HTTP 500".into()));
        assert!(!dir.state().loading);
        assert_eq!(dir.state().conversations.len(), 1);
    }

    #[test]
    fn subscribers_see_every_update() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut dir = ConversationDirectory::new();
        let id = {
            let seen = seen.clone();
            dir.subscribe(move |state| seen.borrow_mut().push(state.conversations.len()))
        };
        dir.dispatch(DirectoryUpdate::Loaded(vec![conv(1, 1), conv(2, 2)]));
        dir.dispatch(DirectoryUpdate::Loading);
        assert_eq!(*seen.borrow(), vec![2, 2]);

        assert!(dir.unsubscribe(id));
        assert!(!dir.unsubscribe(id));
        dir.dispatch(DirectoryUpdate::Loaded(Vec::new()));
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn owner_subscribed_weakly_is_freed() {
        struct Owner {
            directory: RefCell<ConversationDirectory>,
            updates: std::cell::Cell<usize>,
        }

        let owner = Rc::new(Owner {
            directory: RefCell::new(ConversationDirectory::new()),
            updates: std::cell::Cell::new(0),
        });
        {
            let owner_for_updates = Rc::downgrade(&owner);
            owner.directory.borrow_mut().subscribe(move |_| {
                if let Some(owner) = owner_for_updates.upgrade() {
                    owner.updates.set(owner.updates.get() + 1);
                }
            });
        }
        owner
            .directory
            .borrow_mut()
            .dispatch(DirectoryUpdate::Loaded(vec![conv(1, 1)]));
        assert_eq!(owner.updates.get(), 1);
        assert_eq!(Rc::strong_count(&owner), 1);

        let weak = Rc::downgrade(&owner);
        drop(owner);
        assert!(weak.upgrade().is_none());
    }
}
