//! Per-job state kept by the calling layer. The core never sees it.

use crate::speaker::Narration;
use crate::timeline::TimelineDescription;
use rand::Rng;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let value: u64 = rand::thread_rng().r#gen();
        SessionId(format!("{:016x}", value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Created,
    Extracted,
    Narrated,
    Composed,
    Rendered,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub source_url: String,
    pub stage: Stage,
    pub narration: Option<Narration>,
    pub timeline: Option<TimelineDescription>,
    pub video: Option<PathBuf>,
}

impl SessionRecord {
    fn new(source_url: &str) -> Self {
        Self {
            source_url: source_url.to_string(),
            stage: Stage::Created,
            narration: None,
            timeline: None,
            video: None,
        }
    }
}

pub trait SessionStore: Send + Sync {
    fn create(&self, source_url: &str) -> SessionId;

    fn get(&self, id: &SessionId) -> Option<SessionRecord>;

    fn update(
        &self,
        id: &SessionId,
        apply: &mut dyn FnMut(&mut SessionRecord),
    ) -> anyhow::Result<()>;

    fn remove(&self, id: &SessionId) -> Option<SessionRecord>;
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionRecord>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, source_url: &str) -> SessionId {
        let mut sessions = self.sessions();
        let mut id = SessionId::generate();
        while sessions.contains_key(&id) {
            id = SessionId::generate();
        }
        sessions.insert(id.clone(), SessionRecord::new(source_url));
        id
    }

    fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions().get(id).cloned()
    }

    fn update(
        &self,
        id: &SessionId,
        apply: &mut dyn FnMut(&mut SessionRecord),
    ) -> anyhow::Result<()> {
        let mut sessions = self.sessions();
        let record = sessions
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("Session not found: {}", id))?;
        apply(record);
        Ok(())
    }

    fn remove(&self, id: &SessionId) -> Option<SessionRecord> {
        self.sessions().remove(id)
    }
}
