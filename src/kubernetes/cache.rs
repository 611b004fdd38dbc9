// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! In-process object cache with a sync gate and a typed change stream.
//!
//! Objects from the initial list are held back until the list completes, so no
//! change event leaves the gate before it reports itself synced.

use crate::constants::CHANGE_CHANNEL_CAPACITY;
use crate::error::{OperatorError, Result};
use futures::StreamExt;
use kube::runtime::reflector::{store::Writer, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// An add or update observed by the cache
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent<K> {
    Added(K),
    Updated(K),
}

impl<K> ChangeEvent<K> {
    pub fn object(&self) -> &K {
        match self {
            ChangeEvent::Added(obj) | ChangeEvent::Updated(obj) => obj,
        }
    }

    pub fn into_object(self) -> K {
        match self {
            ChangeEvent::Added(obj) | ChangeEvent::Updated(obj) => obj,
        }
    }
}

/// Cloneable read side of the cache: sync state and the reflector store
pub struct CacheHandle<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
    synced: watch::Receiver<bool>,
}

impl<K> Clone for CacheHandle<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            synced: self.synced.clone(),
        }
    }
}

impl<K> CacheHandle<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn is_synced(&self) -> bool {
        *self.synced.borrow()
    }

    /// Block until the initial list has completed. Returns false when cancelled,
    /// when `timeout` elapses first, or when the cache driver is gone.
    pub async fn wait_for_sync(&self, cancel: &CancellationToken, timeout: Option<Duration>) -> bool {
        let mut synced = self.synced.clone();
        let wait = async move { synced.wait_for(|s| *s).await.is_ok() };

        tokio::select! {
            _ = cancel.cancelled() => false,
            ok = async {
                match timeout {
                    Some(t) => tokio::time::timeout(t, wait).await.unwrap_or(false),
                    None => wait.await,
                }
            } => ok,
        }
    }

    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        self.store.get(&ObjectRef::new(name).within(namespace))
    }
}

/// Turns watcher events into store updates and change notifications
struct Dispatcher<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    writer: Writer<K>,
    known: HashSet<ObjectRef<K>>,
    pending: Vec<K>,
    synced: watch::Sender<bool>,
    subscriber: Option<mpsc::Sender<ChangeEvent<K>>>,
}

impl<K> Dispatcher<K>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn apply(&mut self, event: watcher::Event<K>) -> Vec<ChangeEvent<K>> {
        self.writer.apply_watcher_event(&event);

        match event {
            watcher::Event::Init => {
                self.pending.clear();
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                self.pending.push(obj);
                Vec::new()
            }
            watcher::Event::InitDone => {
                let listed: HashSet<ObjectRef<K>> =
                    self.pending.iter().map(ObjectRef::from_obj).collect();
                // Objects that vanished during a relist are gone from the store too
                self.known.retain(|r| listed.contains(r));

                if !*self.synced.borrow() {
                    info!("Cache synced with {} objects", self.pending.len());
                    self.synced.send_replace(true);
                }

                std::mem::take(&mut self.pending)
                    .into_iter()
                    .map(|obj| self.classify(obj))
                    .collect()
            }
            watcher::Event::Apply(obj) => vec![self.classify(obj)],
            watcher::Event::Delete(obj) => {
                self.known.remove(&ObjectRef::from_obj(&obj));
                Vec::new()
            }
        }
    }

    fn classify(&mut self, obj: K) -> ChangeEvent<K> {
        if self.known.insert(ObjectRef::from_obj(&obj)) {
            ChangeEvent::Added(obj)
        } else {
            ChangeEvent::Updated(obj)
        }
    }

    async fn dispatch(&mut self, event: watcher::Event<K>) {
        for change in self.apply(event) {
            let Some(tx) = &self.subscriber else {
                continue;
            };
            if tx.send(change).await.is_err() {
                debug!("Change subscriber dropped, discarding further notifications");
                self.subscriber = None;
            }
        }
    }
}

/// Watches one resource kind for the process lifetime
pub struct CacheGate<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    api: Api<K>,
    watcher_config: watcher::Config,
    dispatcher: Dispatcher<K>,
    handle: CacheHandle<K>,
    subscribed: bool,
}

impl<K> CacheGate<K>
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn new(api: Api<K>, watcher_config: watcher::Config) -> Self {
        let writer = Writer::default();
        let store = writer.as_reader();
        let (synced_tx, synced_rx) = watch::channel(false);

        Self {
            api,
            watcher_config,
            dispatcher: Dispatcher {
                writer,
                known: HashSet::new(),
                pending: Vec::new(),
                synced: synced_tx,
                subscriber: None,
            },
            handle: CacheHandle {
                store,
                synced: synced_rx,
            },
            subscribed: false,
        }
    }

    pub fn handle(&self) -> CacheHandle<K> {
        self.handle.clone()
    }

    /// Register the single consumer of change events. Must happen before `start`.
    pub fn subscribe(&mut self) -> Result<mpsc::Receiver<ChangeEvent<K>>> {
        if self.subscribed {
            return Err(OperatorError::AlreadySubscribed);
        }
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        self.dispatcher.subscriber = Some(tx);
        self.subscribed = true;
        Ok(rx)
    }

    /// Spawn the watch loop and return immediately
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(cancel))
    }

    pub async fn run(mut self, cancel: CancellationToken) -> Result<()> {
        let kind = K::kind(&K::DynamicType::default()).to_string();
        info!("Starting {} cache", kind);

        let mut stream = watcher(self.api.clone(), self.watcher_config.clone())
            .default_backoff()
            .boxed();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("{} cache stopped", kind);
                    return Ok(());
                }
                event = stream.next() => match event {
                    Some(Ok(event)) => self.dispatcher.dispatch(event).await,
                    Some(Err(e)) => warn!("Watch error on {}: {}", kind, e),
                    None => {
                        return Err(OperatorError::CacheDriver(format!(
                            "{} watch stream ended",
                            kind
                        )));
                    }
                },
            }
        }
    }

    #[cfg(test)]
    pub(crate) async fn dispatch(&mut self, event: watcher::Event<K>) {
        self.dispatcher.dispatch(event).await;
    }
}
