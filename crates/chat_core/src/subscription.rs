use std::{
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use storage::{Storage, StoreChange};
use tokio::{sync::Mutex, task::JoinHandle};
use tokio_stream::{wrappers::errors::BroadcastStreamRecvError, wrappers::BroadcastStream, StreamExt};
use tracing::{debug, warn};

use crate::ChatError;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// A live subscription. Snapshots are delivered while the gate is held, so
/// once [`SubscriptionHandle::detach`] returns no further callback can run.
/// Dropping the handle stops the background task as well.
#[derive(Debug)]
pub struct SubscriptionHandle {
    id: u64,
    gate: Arc<Mutex<bool>>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// False once detached, or once the subscription died on a store error.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    pub async fn detach(self) {
        *self.gate.lock().await = false;
        self.task.abort();
        debug!(subscription_id = self.id, "subscription detached");
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Ok(mut open) = self.gate.try_lock() {
            *open = false;
        }
        self.task.abort();
    }
}

/// Spawns a subscription that delivers the full result of `load` now and
/// again after every store change accepted by `relevant`.
pub(crate) fn spawn_snapshot_subscription<T, R, L, Fut, U, E>(
    kind: &'static str,
    storage: Storage,
    relevant: R,
    load: L,
    on_update: U,
    on_error: E,
) -> SubscriptionHandle
where
    T: Send + 'static,
    R: Fn(&StoreChange) -> bool + Send + 'static,
    L: Fn(Storage) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    U: FnMut(Vec<T>) + Send + 'static,
    E: FnOnce(ChatError) + Send + 'static,
{
    let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
    let gate = Arc::new(Mutex::new(true));
    // Subscribe before the first query so no write between the two is missed.
    let changes = BroadcastStream::new(storage.watch());

    let task_gate = gate.clone();
    let task = tokio::spawn(async move {
        let mut on_update = on_update;
        let outcome = pump(id, kind, storage, changes, relevant, load, &mut on_update, &task_gate).await;
        if let Err(error) = outcome {
            let open = task_gate.lock().await;
            if *open {
                warn!(subscription_id = id, kind, error = %format!("{error:#}"), "subscription failed");
                on_error(ChatError::Subscription(error));
            }
        }
    });
    debug!(subscription_id = id, kind, "subscription attached");

    SubscriptionHandle { id, gate, task }
}

#[allow(clippy::too_many_arguments)]
async fn pump<T, R, L, Fut, U>(
    id: u64,
    kind: &'static str,
    storage: Storage,
    mut changes: BroadcastStream<StoreChange>,
    relevant: R,
    load: L,
    on_update: &mut U,
    gate: &Mutex<bool>,
) -> anyhow::Result<()>
where
    T: Send + 'static,
    R: Fn(&StoreChange) -> bool,
    L: Fn(Storage) -> Fut,
    Fut: Future<Output = anyhow::Result<Vec<T>>>,
    U: FnMut(Vec<T>),
{
    loop {
        let snapshot = load(storage.clone()).await?;
        {
            let open = gate.lock().await;
            if !*open {
                return Ok(());
            }
            on_update(snapshot);
        }

        loop {
            match changes.next().await {
                Some(Ok(change)) if relevant(&change) => break,
                Some(Ok(_)) => continue,
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    debug!(subscription_id = id, kind, skipped, "change feed lagged; reloading");
                    break;
                }
                None => return Ok(()),
            }
        }
    }
}
