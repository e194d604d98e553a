//! Wiring of the engines over one store.

use std::sync::Arc;

use crate::content::ContentEngine;
use crate::directory::UserDirectory;
use crate::messaging::Messenger;
use crate::moderation::Moderation;
use crate::notifications::NotificationCenter;
use crate::policy::AccessPolicy;
use crate::social::SocialGraph;
use crate::store::{MemoryStore, RealtimeStore};

/// Every engine, sharing a store handle and access policy.
#[derive(Clone)]
pub struct Atelier {
    pub store: Arc<dyn RealtimeStore>,
    pub policy: Arc<AccessPolicy>,
    pub directory: UserDirectory,
    pub notifications: NotificationCenter,
    pub social: SocialGraph,
    pub messenger: Messenger,
    pub content: ContentEngine,
    pub moderation: Moderation,
}

impl Atelier {
    pub fn new(store: Arc<dyn RealtimeStore>, policy: AccessPolicy) -> Self {
        let policy = Arc::new(policy);
        let directory = UserDirectory::new(store.clone(), policy.clone());
        let notifications = NotificationCenter::new(store.clone(), policy.clone());
        let social = SocialGraph::new(
            store.clone(),
            directory.clone(),
            notifications.clone(),
            policy.clone(),
        );
        let messenger = Messenger::new(
            store.clone(),
            directory.clone(),
            social.clone(),
            policy.clone(),
        );
        let content = ContentEngine::new(
            store.clone(),
            directory.clone(),
            notifications.clone(),
            policy.clone(),
        );
        let moderation = Moderation::new(directory.clone(), notifications.clone());
        Self {
            store,
            policy,
            directory,
            notifications,
            social,
            messenger,
            content,
            moderation,
        }
    }

    /// A fresh in-memory instance.
    pub fn in_memory(policy: AccessPolicy) -> Self {
        Self::new(Arc::new(MemoryStore::new()), policy)
    }

    pub fn with_thread_limit(mut self, limit: usize) -> Self {
        self.messenger = self.messenger.with_thread_limit(limit);
        self
    }
}
