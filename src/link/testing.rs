//! In-memory connector for driving the channel from tests

use crate::link::transport::{Connector, Link, LinkWriter, TransportError, TransportEvent};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Clone, Copy, Debug)]
pub enum Outcome {
    Accept,
    Refuse,
}

/// Remote end of an accepted link
struct Remote {
    events: mpsc::Sender<TransportEvent>,
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

struct ScriptedWriter {
    sent: Arc<Mutex<Vec<String>>>,
    closed_with: Arc<Mutex<Option<u16>>>,
}

#[async_trait]
impl LinkWriter for ScriptedWriter {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sent.lock().unwrap().push(text);
        Ok(())
    }

    async fn close(&mut self, code: u16, _reason: &str) -> Result<(), TransportError> {
        *self.closed_with.lock().unwrap() = Some(code);
        Ok(())
    }
}

#[derive(Default)]
struct Script {
    outcomes: VecDeque<Outcome>,
    connects: usize,
    remotes: Vec<Remote>,
}

/// Answers connects from a queue of outcomes, refusing once it runs dry
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnector {
    pub fn with(outcomes: &[Outcome]) -> Self {
        let connector = Self::default();
        connector.script.lock().unwrap().outcomes = outcomes.iter().copied().collect();
        connector
    }

    pub fn push_outcome(&self, outcome: Outcome) {
        self.script.lock().unwrap().outcomes.push_back(outcome);
    }

    pub fn connects(&self) -> usize {
        self.script.lock().unwrap().connects
    }

    /// Delivers `event` as if it came from the socket of the `link`-th accept
    pub async fn inject(&self, link: usize, event: TransportEvent) {
        let events = self.script.lock().unwrap().remotes[link].events.clone();
        events.send(event).await.unwrap();
    }

    /// Frames written to the `link`-th accepted link so far
    pub fn sent(&self, link: usize) -> Vec<String> {
        self.script.lock().unwrap().remotes[link]
            .sent
            .lock()
            .unwrap()
            .clone()
    }

    pub fn closed_with(&self, link: usize) -> Option<u16> {
        *self.script.lock().unwrap().remotes[link]
            .closed_with
            .lock()
            .unwrap()
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Link, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.connects += 1;
        match script.outcomes.pop_front().unwrap_or(Outcome::Refuse) {
            Outcome::Refuse => Err(TransportError::Refused("scripted".into())),
            Outcome::Accept => {
                let (events_tx, events_rx) = mpsc::channel(16);
                let sent = Arc::new(Mutex::new(Vec::new()));
                let closed_with = Arc::new(Mutex::new(None));
                script.remotes.push(Remote {
                    events: events_tx,
                    sent: sent.clone(),
                    closed_with: closed_with.clone(),
                });
                Ok(Link::new(
                    Box::new(ScriptedWriter { sent, closed_with }),
                    events_rx,
                ))
            }
        }
    }
}
