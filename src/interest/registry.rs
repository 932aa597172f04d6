use crate::protocol::InterestKey;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Where an interest observation came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestSource {
    /// A subscriber announced the topic on the introspection topic
    Subscriber,
    /// The gateway's own re-announcement of a reading it relayed
    SelfEcho,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub key: InterestKey,
    pub source: InterestSource,
}

/// Registry contents taken out by [`TopicRegistry::snapshot_and_clear`]
///
/// Owned storage, never a view into the live registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterestSnapshot {
    observations: Vec<Observation>,
}

impl InterestSnapshot {
    pub fn keys(&self) -> impl Iterator<Item = &InterestKey> {
        self.observations.iter().map(|o| &o.key)
    }

    pub fn contains(&self, key: &InterestKey) -> bool {
        self.observations.iter().any(|o| &o.key == key)
    }

    pub fn source_of(&self, key: &InterestKey) -> Option<InterestSource> {
        self.observations
            .iter()
            .find(|o| &o.key == key)
            .map(|o| o.source)
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl FromIterator<Observation> for InterestSnapshot {
    fn from_iter<I: IntoIterator<Item = Observation>>(iter: I) -> Self {
        let mut observations: Vec<Observation> = Vec::new();
        for observation in iter {
            if !observations.iter().any(|o| o.key == observation.key) {
                observations.push(observation);
            }
        }
        Self { observations }
    }
}

/// Set of topics with live interest in the current generation
///
/// Clones share the same storage. Every operation takes the one lock, so
/// `add` and `snapshot_and_clear` are linearizable with respect to each other.
/// Keys keep insertion order.
#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    inner: Arc<Mutex<Vec<Observation>>>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert, returns true if the key was not present yet
    ///
    /// A subscriber observation upgrades an entry first seen as a self echo.
    pub async fn add(&self, key: InterestKey, source: InterestSource) -> bool {
        let mut observations = self.inner.lock().await;
        match observations.iter_mut().find(|o| o.key == key) {
            Some(existing) => {
                if source == InterestSource::Subscriber
                    && existing.source == InterestSource::SelfEcho
                {
                    debug!("Interest in {} confirmed by a subscriber", key);
                    existing.source = InterestSource::Subscriber;
                }
                false
            }
            None => {
                observations.push(Observation { key, source });
                true
            }
        }
    }

    pub async fn remove(&self, key: &InterestKey) -> bool {
        let mut observations = self.inner.lock().await;
        let before = observations.len();
        observations.retain(|o| &o.key != key);
        observations.len() != before
    }

    /// Returns the current members and empties the registry in one step
    pub async fn snapshot_and_clear(&self) -> InterestSnapshot {
        let observations = std::mem::take(&mut *self.inner.lock().await);
        InterestSnapshot { observations }
    }

    pub async fn contains(&self, key: &InterestKey) -> bool {
        self.inner.lock().await.iter().any(|o| &o.key == key)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }
}
