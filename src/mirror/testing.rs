//! In-memory board used by the mirror unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::integrations::traits::{
    BoardList, BoardTracker, Card, CardUpdate, NewCard, TrackerError, TrackerResult, Webhook,
    WebhookRegistration,
};

#[derive(Default)]
struct BoardState {
    lists: Vec<BoardList>,
    cards: Vec<Card>,
    next_id: u64,
    calls: HashMap<&'static str, usize>,
    failing: HashSet<&'static str>,
}

impl BoardState {
    fn record(&mut self, op: &'static str) -> TrackerResult<()> {
        *self.calls.entry(op).or_default() += 1;
        if self.failing.contains(op) {
            return Err(TrackerError::Api {
                status: 500,
                body: format!("{} unavailable", op),
            });
        }
        Ok(())
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{}", prefix, self.next_id)
    }
}

#[derive(Default)]
pub(crate) struct FakeBoard {
    state: Mutex<BoardState>,
}

impl FakeBoard {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_list(self, id: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .lists
            .push(BoardList::new(id, name));
        self
    }

    pub(crate) fn with_card(self, card: Card) -> Self {
        self.state.lock().unwrap().cards.push(card);
        self
    }

    pub(crate) fn fail_on(&self, op: &'static str) {
        self.state.lock().unwrap().failing.insert(op);
    }

    pub(crate) fn calls(&self, op: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .get(op)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn cards_in(&self, list_id: &str) -> Vec<Card> {
        self.state
            .lock()
            .unwrap()
            .cards
            .iter()
            .filter(|c| c.id_list == list_id)
            .cloned()
            .collect()
    }

    pub(crate) fn lists_named(&self, name: &str) -> Vec<BoardList> {
        self.state
            .lock()
            .unwrap()
            .lists
            .iter()
            .filter(|l| l.name == name)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BoardTracker for FakeBoard {
    fn name(&self) -> &str {
        "fake"
    }

    async fn board_lists(&self, _board_id: &str) -> TrackerResult<Vec<BoardList>> {
        let mut state = self.state.lock().unwrap();
        state.record("board_lists")?;
        Ok(state.lists.clone())
    }

    async fn create_list(&self, _board_id: &str, name: &str) -> TrackerResult<BoardList> {
        let mut state = self.state.lock().unwrap();
        state.record("create_list")?;
        let id = state.fresh_id("list");
        let list = BoardList::new(id, name);
        state.lists.push(list.clone());
        Ok(list)
    }

    async fn list_cards(&self, list_id: &str) -> TrackerResult<Vec<Card>> {
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
        let mut state = self.state.lock().unwrap();
        state.record("get_card")?;
        state
            .cards
            .iter()
            .find(|c| c.id == card_id)
            .cloned()
            .ok_or_else(|| TrackerError::Api {
                status: 404,
                body: "card not found".to_string(),
            })
    }

    async fn create_card(&self, card: NewCard) -> TrackerResult<Card> {
        let mut state = self.state.lock().unwrap();
        state.record("create_card")?;
        let created = Card {
            id: state.fresh_id("card"),
            name: card.name,
            desc: card.desc,
            id_list: card.id_list,
            labels: Vec::new(),
        };
        state.cards.push(created.clone());
        Ok(created)
    }

    async fn update_card(&self, card_id: &str, update: CardUpdate) -> TrackerResult<Card> {
        let mut state = self.state.lock().unwrap();
        state.record("update_card")?;
        let card = state
            .cards
            .iter_mut()
            .find(|c| c.id == card_id)
            .ok_or_else(|| TrackerError::Api {
                status: 404,
                body: "card not found".to_string(),
            })?;
        card.name = update.name;
        card.desc = update.desc;
        Ok(card.clone())
    }

    async fn delete_card(&self, card_id: &str) -> TrackerResult<()> {
        let mut state = self.state.lock().unwrap();
        state.record("delete_card")?;
        state.cards.retain(|c| c.id != card_id);
        Ok(())
    }

    async fn register_webhook(
        &self,
        registration: WebhookRegistration,
    ) -> TrackerResult<Webhook> {
        let mut state = self.state.lock().unwrap();
        state.record("register_webhook")?;
        Ok(Webhook {
            id: state.fresh_id("hook"),
            description: registration.description,
            callback_url: registration.callback_url,
        })
    }
}
