//! Shared fixtures for the integration tests.
//!
//! `InMemoryBoard` implements `BoardTracker` over a vector of lists and
//! cards. Every call yields to the scheduler first so concurrent
//! reconciliations interleave the way real HTTP calls would.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use trello_mirror::integrations::{
    BoardList, BoardTracker, Card, CardUpdate, Label, NewCard, TrackerError, TrackerResult,
    Webhook, WebhookRegistration,
};
use trello_mirror::mirror::backref::references;

pub const BOARD_ID: &str = "board-1";
pub const MASTER_LIST_ID: &str = "master";

#[derive(Default)]
struct State {
    lists: Vec<BoardList>,
    cards: Vec<Card>,
    next_id: u64,
    calls: HashMap<&'static str, usize>,
    failing: HashSet<&'static str>,
}

impl State {
    fn record(&mut self, op: &'static str) -> TrackerResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.contains(op) {
            return Err(TrackerError::Api {
                status: 503,
                body: format!("{} unavailable", op),
            });
        }
        Ok(())
    }

    fn next(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Default)]
pub struct InMemoryBoard {
    state: Mutex<State>,
}

impl InMemoryBoard {
    /// Board holding only the master list
    pub fn new() -> Self {
        let board = Self::default();
        board.add_list(MASTER_LIST_ID, "Master");
        board
    }

    pub fn add_list(&self, id: &str, name: &str) {
        self.state
            .lock()
            .unwrap()
            .lists
            .push(BoardList::new(id, name));
    }

    /// Put a card on the master list
    pub fn add_master_card(&self, id: &str, name: &str, desc: &str, labels: Vec<Label>) {
        self.state.lock().unwrap().cards.push(Card {
            id: id.to_string(),
            name: name.to_string(),
            desc: desc.to_string(),
            id_list: MASTER_LIST_ID.to_string(),
            labels,
        });
    }

    /// Edit a card in place, as a user would in the Trello UI
    pub fn edit_card(&self, id: &str, edit: impl FnOnce(&mut Card)) {
        let mut state = self.state.lock().unwrap();
        let card = state
            .cards
            .iter_mut()
            .find(|c| c.id == id)
            .expect("card exists");
        edit(card);
    }

    pub fn remove_card(&self, id: &str) {
        self.state.lock().unwrap().cards.retain(|c| c.id != id);
    }

    pub fn fail_on(&self, op: &'static str) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub fn recover(&self, op: &'static str) {
        self.state.lock().unwrap().failing.remove(op);
    }

    pub fn calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    pub fn lists_named(&self, name: &str) -> Vec<BoardList> {
        self.state
            .lock()
            .unwrap()
            .lists
            .iter()
            .filter(|l| l.name == name)
            .cloned()
            .collect()
    }

    /// Mirrors of `master_id` in the list called `list_name`
    pub fn mirrors_in(&self, list_name: &str, master_id: &str) -> Vec<Card> {
        let state = self.state.lock().unwrap();
        let list_ids: Vec<&str> = state
            .lists
            .iter()
            .filter(|l| l.name == list_name)
            .map(|l| l.id.as_str())
            .collect();
        state
            .cards
            .iter()
            .filter(|c| list_ids.contains(&c.id_list.as_str()) && references(&c.desc, master_id))
            .cloned()
            .collect()
    }

    /// Every mirror of `master_id` on the board
    pub fn all_mirrors(&self, master_id: &str) -> Vec<Card> {
        self.state
            .lock()
            .unwrap()
            .cards
            .iter()
            .filter(|c| c.id_list != MASTER_LIST_ID && references(&c.desc, master_id))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BoardTracker for InMemoryBoard {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn board_lists(&self, _board_id: &str) -> TrackerResult<Vec<BoardList>> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.record("board_lists")?;
        Ok(state.lists.clone())
    }

    async fn create_list(&self, _board_id: &str, name: &str) -> TrackerResult<BoardList> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.record("create_list")?;
        let list = BoardList::new(state.next("list"), name);
        state.lists.push(list.clone());
        Ok(list)
    }

    async fn list_cards(&self, list_id: &str) -> TrackerResult<Vec<Card>> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.record("list_cards")?;
        Ok(state
            .cards
            .iter()
            .filter(|c| c.id_list == list_id)
            .cloned()
            .collect())
    }

    async fn get_card(&self, card_id: &str) -> TrackerResult<Card> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.record("get_card")?;
        state
            .cards
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
            .ok_or_else(|| TrackerError::Api {
                status: 404,
                body: "The requested resource was not found.".to_string(),
            })
    }

    async fn create_card(&self, card: NewCard) -> TrackerResult<Card> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.record("create_card")?;
        let created = Card {
            id: state.next("card"),
            name: card.name,
            desc: card.desc,
            id_list: card.id_list,
            labels: Vec::new(),
        };
        state.cards.push(created.clone());
        Ok(created)
    }

    async fn update_card(&self, card_id: &str, update: CardUpdate) -> TrackerResult<Card> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.record("update_card")?;
        let card = state
            .cards
            .iter_mut()
            .find(|c| c.id == card_id)
            .ok_or_else(|| TrackerError::Api {
                status: 404,
                body: "The requested resource was not found.".to_string(),
            })?;
        card.name = update.name;
        card.desc = update.desc;
        Ok(card.clone())
    }

    async fn delete_card(&self, card_id: &str) -> TrackerResult<()> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.record("delete_card")?;
        state.cards.retain(|c| c.id != card_id);
        Ok(())
    }

    async fn register_webhook(
        &self,
        registration: WebhookRegistration,
    ) -> TrackerResult<Webhook> {
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.record("register_webhook")?;
        Ok(Webhook {
            id: state.next("hook"),
            description: registration.description,
            callback_url: registration.callback_url,
        })
    }
}

pub fn label(id: &str, name: &str, color: &str) -> Label {
    Label::new(id, name, Some(color))
}

/// Board plus shared handle, ready to hand to an engine
pub fn board() -> Arc<InMemoryBoard> {
    Arc::new(InMemoryBoard::new())
}
