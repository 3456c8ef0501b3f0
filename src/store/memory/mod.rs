use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::store::{Error, SessionStore, StoreConfig};
use crate::{Id, IdGenerator, OsIdGenerator, Session};

/// An in-memory session store implementation.
///
/// Sessions live in a sharded concurrent map keyed by id. Expired sessions
/// are destroyed when a request presents their id, or by [`SessionStore::sweep`]
/// (see [`crate::store::spawn_sweeper`] to run it periodically).
///
/// ### Note
///
/// Sessions are lost on restart and are not shared between processes.
#[derive(Debug)]
pub struct MemoryStore<G: IdGenerator = OsIdGenerator> {
    sessions: DashMap<Id, Session>,
    config: StoreConfig,
    id_generator: G,
}

impl MemoryStore {
    /// Creates a store drawing ids from the operating system's random source.
    pub fn new(config: StoreConfig) -> Result<Self, Error> {
        Self::with_id_generator(config, OsIdGenerator)
    }
}

impl<G> MemoryStore<G>
where
    G: IdGenerator,
{
    /// Creates a store with an explicit id source.
    ///
    /// Fails if the configuration is invalid or the generator cannot
    /// produce an id.
    pub fn with_id_generator(config: StoreConfig, id_generator: G) -> Result<Self, Error> {
        config.validate()?;
        id_generator.generate().map_err(|err| {
            tracing::error!(err = %err, "session id generator is unusable");
            err
        })?;

        Ok(Self {
            sessions: DashMap::new(),
            config,
            id_generator,
        })
    }

    /// Number of sessions currently indexed, expired or not.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, session_id: &Id) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// Returns the indexed session without marking it accessed.
    pub fn get(&self, session_id: &Id) -> Option<Session> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    fn create(&self) -> Result<Session, Error> {
        loop {
            let session = Session::new(self)?;
            match self.sessions.entry(session.id()) {
                Entry::Vacant(entry) => {
                    entry.insert(session.clone());
                    tracing::debug!(session_id = %session.id(), "created session");
                    return Ok(session);
                }
                Entry::Occupied(_) => {
                    tracing::warn!(session_id = %session.id(), "session id collision, regenerating");
                }
            }
        }
    }

    /// Timeout path for a session already removed from the index.
    /// Returns `false` if the session had already been destroyed.
    fn expire(&self, session: &Session) -> bool {
        if !session.mark_destroyed() {
            return false;
        }

        tracing::debug!(session_id = %session.id(), "session timed out");
        self.config.notify_timeout(session);
        self.config.notify_destroy(session);
        true
    }
}

// A destroyed session can linger if a save raced its destruction.
fn is_stale(session: &Session) -> bool {
    session.is_destroyed() || session.is_expired()
}

impl<G> SessionStore for MemoryStore<G>
where
    G: IdGenerator,
{
    fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn create_session_id(&self) -> Result<Id, Error> {
        self.id_generator.generate()
    }

    #[tracing::instrument(name = "loading session", skip(self))]
    async fn load(&self, session_id: Option<&Id>) -> Result<Session, Error> {
        if let Some(session_id) = session_id {
            let found = self.get(session_id);
            match found {
                Some(session) if !is_stale(&session) => {
                    session.mark_accessed();
                    return Ok(session);
                }
                Some(_) => {
                    let removed = self
                        .sessions
                        .remove_if(session_id, |_, session| is_stale(session));
                    if let Some((_, session)) = removed {
                        self.expire(&session);
                    }
                    tracing::debug!("session expired, issuing a new one");
                }
                None => tracing::debug!("unknown session id, issuing a new one"),
            }
        }

        self.create()
    }

    #[tracing::instrument(name = "saving session", skip(self, session), fields(session_id = %session.id()))]
    async fn save(&self, session: &Session) -> Result<(), Error> {
        if session.is_destroyed() {
            return Ok(());
        }

        // The index shares state with this handle; persisting only has to keep it indexed.
        self.sessions
            .entry(session.id())
            .or_insert_with(|| session.clone());
        session.mark_persisted();

        Ok(())
    }

    #[tracing::instrument(name = "destroying session", skip(self, session), fields(session_id = %session.id()))]
    async fn destroy_session(&self, session: &Session) -> Result<(), Error> {
        if !session.mark_destroyed() {
            tracing::debug!("session already destroyed");
            return Ok(());
        }

        self.sessions
            .remove_if(&session.id(), |_, indexed| indexed.ptr_eq(session));
        self.config.notify_destroy(session);

        Ok(())
    }

    #[tracing::instrument(name = "sweeping expired sessions", skip(self))]
    async fn sweep(&self) -> Result<usize, Error> {
        let expired: Vec<Id> = self
            .sessions
            .iter()
            .filter(|entry| is_stale(entry.value()))
            .map(|entry| *entry.key())
            .take(self.config.sweep_batch_size)
            .collect();

        let mut swept = 0;
        for session_id in expired {
            let removed = self
                .sessions
                .remove_if(&session_id, |_, session| is_stale(session));
            if let Some((_, session)) = removed {
                if self.expire(&session) {
                    swept += 1;
                }
            }
        }

        Ok(swept)
    }
}
