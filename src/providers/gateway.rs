//! Request-scoped retrieval of callback-style scripts.
//!
//! Every retrieval is tagged with its own correlation id and parked in a
//! pending table until its loader delivers a result. The entry is removed on
//! delivery, failure, timeout, or when the caller stops waiting, so a late
//! delivery for an abandoned request finds nothing and is dropped.

use crate::core::error::RetrievalError;
use crate::providers::script::Script;
use reqwest::Url;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

type Delivery = Result<Script, RetrievalError>;
type PendingTable = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Delivery>>>>;

#[derive(Clone)]
pub struct CallbackGateway {
    client: reqwest::Client,
    timeout: Duration,
    pending: PendingTable,
}

impl CallbackGateway {
    pub fn new(timeout: Duration) -> Result<Self, RetrievalError> {
        let client = reqwest::Client::builder()
            .user_agent("fundwatch/1.0")
            .build()
            .map_err(|source| RetrievalError::Transport {
                url: String::new(),
                source,
            })?;
        Ok(Self::with_client(client, timeout))
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Number of retrievals still waiting for their loader.
    pub fn pending_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Loads the script at `url` and returns its body.
    pub async fn retrieve(&self, url: &str) -> Result<Script, RetrievalError> {
        self.retrieve_tagged(Uuid::new_v4(), url.to_string()).await
    }

    /// Loads a script that reports back through a caller-named callback.
    ///
    /// A callback name unique to this request is passed as the `param` query
    /// parameter, and the argument the script hands to that callback is
    /// returned.
    pub async fn retrieve_callback(&self, url: &str, param: &str) -> Result<String, RetrievalError> {
        let id = Uuid::new_v4();
        let callback = format!("fundwatch_cb_{}", id.simple());

        let mut parsed = Url::parse(url).map_err(|e| RetrievalError::Parse {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        parsed.query_pairs_mut().append_pair(param, &callback);
        let full_url = parsed.to_string();

        let script = self.retrieve_tagged(id, full_url.clone()).await?;
        script
            .call_argument(&callback)
            .map(str::to_string)
            .ok_or(RetrievalError::MissingCallback {
                url: full_url,
                callback,
            })
    }

    async fn retrieve_tagged(&self, id: Uuid, url: String) -> Result<Script, RetrievalError> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        let _entry = PendingEntry {
            pending: &self.pending,
            id,
        };

        debug!(%id, %url, "Loading script");
        let _loader = Loader(tokio::spawn(load(
            self.client.clone(),
            url.clone(),
            Arc::clone(&self.pending),
            id,
        )));

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(delivery)) => delivery,
            Ok(Err(_)) => Err(RetrievalError::Abandoned { url }),
            Err(_) => {
                debug!(%id, %url, "Script load timed out");
                Err(RetrievalError::Timeout {
                    url,
                    timeout: self.timeout,
                })
            }
        }
    }
}

async fn load(client: reqwest::Client, url: String, pending: PendingTable, id: Uuid) {
    let result = fetch_script(&client, &url).await;
    deliver(&pending, id, result);
}

async fn fetch_script(client: &reqwest::Client, url: &str) -> Delivery {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| RetrievalError::Transport {
            url: url.to_string(),
            source,
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(RetrievalError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|source| RetrievalError::Transport {
            url: url.to_string(),
            source,
        })?;
    debug!(%url, bytes = body.len(), "Script loaded");
    Ok(Script::new(body))
}

/// Hands `result` to whoever is waiting on `id`, if anyone still is.
fn deliver(pending: &PendingTable, id: Uuid, result: Delivery) {
    let waiter = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&id);
    match waiter {
        Some(tx) => {
            if tx.send(result).is_err() {
                debug!(%id, "Requester went away before delivery");
            }
        }
        None => debug!(%id, "Late delivery for a finished request, dropping"),
    }
}

/// Removes the pending entry when the request ends, however it ends.
struct PendingEntry<'a> {
    pending: &'a PendingTable,
    id: Uuid,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Aborts the loader task when the request ends.
struct Loader(JoinHandle<()>);

impl Drop for Loader {
    fn drop(&mut self) {
        self.0.abort();
    }
}
