//! The entropy generator state machine.
//!
//! One driver task advances the beacon; every other entry point is a
//! synchronous ingress that takes the generator mutex, mutates state and
//! signals the driver. BLS verification is kept off the critical path by
//! snapshotting inputs under the lock and verifying before (re)storing.

use super::aeon::AeonDetails;
use super::store::ShareStore;
use super::types::{entropy_message, ComputedEntropy, EntropyShare};
use super::ENTROPY_HISTORY_LENGTH;
use crate::metrics;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::sleep;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, warn, Span};

/// Upper bound on the driver's wait, so pruning and aeon rotation are
/// checked even without notifications.
const COMPUTE_ENTROPY_INTERVAL: Duration = Duration::from_millis(100);

/// Bytes of a signature shown in logs.
const SHORT_SIG_BYTES: usize = 3;

pub struct EntropyGenerator {
    inner: Arc<Inner>,
}

pub struct Inner {
    chain_id: String,
    aeon_file: Option<PathBuf>,
    store: Mutex<ShareStore>,
    share_tx: Mutex<Option<mpsc::UnboundedSender<EntropyShare>>>,
    wake: Notify,
    tracker: TaskTracker,
    running: AtomicBool,
    stopped: AtomicBool,
    l: Span,
}

impl EntropyGenerator {
    /// Creates an unstarted generator.
    ///
    /// `last_computed_height` is 0 at genesis; a restarting node passes the
    /// height it recovered from the block store. When `aeon_file` is set,
    /// promoted aeons are persisted there across rollovers.
    pub fn new(
        chain_id: impl Into<String>,
        last_computed_height: u64,
        aeon_file: Option<PathBuf>,
    ) -> Self {
        let chain_id = chain_id.into();
        let l = info_span!("entropy_gen", chain = %chain_id);
        Self {
            inner: Arc::new(Inner {
                chain_id,
                aeon_file,
                store: Mutex::new(ShareStore::new(last_computed_height)),
                share_tx: Mutex::new(None),
                wake: Notify::new(),
                tracker: TaskTracker::new(),
                running: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                l,
            }),
        }
    }

    /// Seeds the entropy buffer. Idempotent: re-seeding a height is only
    /// permitted with byte-identical content.
    pub fn set_last_computed_entropy(&self, entropy: ComputedEntropy) -> bool {
        let inner = &self.inner;
        let mut store = inner.lock_store();
        if let Some(existing) = store.get_computed(entropy.height) {
            if *existing != entropy.group_signature {
                warn!(
                    parent: &inner.l,
                    "rejecting differing entropy overwrite at height {}", entropy.height
                );
                return false;
            }
            return true;
        }
        store.seed_computed(entropy.height, entropy.group_signature);
        inner.wake.notify_one();
        true
    }

    /// Installs `aeon` as current when it covers the next block height,
    /// queues it when it starts later, drops it when already expired.
    pub fn set_aeon_details(&self, aeon: AeonDetails) {
        let inner = &self.inner;
        let aeon = Arc::new(aeon);
        let mut store = inner.lock_store();
        let next_height = store.last_block_height() + 1;
        if aeon.start() <= next_height && next_height <= aeon.end() {
            info!(
                parent: &inner.l,
                "installing aeon [{}, {}], threshold {}", aeon.start(), aeon.end(), aeon.threshold()
            );
            metrics::report_metrics_on_aeon(aeon.validators().len(), aeon.threshold());
            store.set_current_aeon(aeon);
        } else if aeon.end() <= store.last_block_height() {
            warn!(
                parent: &inner.l,
                "dropping stale aeon [{}, {}], last block height {}",
                aeon.start(),
                aeon.end(),
                store.last_block_height()
            );
        } else {
            info!(
                parent: &inner.l,
                "queueing aeon [{}, {}] for future activation", aeon.start(), aeon.end()
            );
            store.set_next_aeon(aeon);
        }
        drop(store);
        inner.wake.notify_one();
    }

    /// Queues DKG output for rotation once the current aeon completes.
    pub fn add_new_aeon_details(&self, aeon: AeonDetails) {
        let inner = &self.inner;
        let aeon = Arc::new(aeon);
        let mut store = inner.lock_store();
        if let Some(current) = store.current_aeon() {
            if aeon.start() <= current.end() {
                warn!(
                    parent: &inner.l,
                    "dropping queued aeon [{}, {}] overlapping current aeon ending at {}",
                    aeon.start(),
                    aeon.end(),
                    current.end()
                );
                return;
            }
        }
        info!(parent: &inner.l, "queueing aeon [{}, {}]", aeon.start(), aeon.end());
        store.set_next_aeon(aeon);
        drop(store);
        inner.wake.notify_one();
    }

    /// Spawns the driver. No-op when already running; a stopped generator
    /// stays stopped.
    pub fn start(&self) {
        let inner = &self.inner;
        if inner.stopped.load(Ordering::Acquire) {
            warn!(parent: &inner.l, "cannot start: generator is stopped");
            return;
        }
        if inner.running.swap(true, Ordering::AcqRel) {
            debug!(parent: &inner.l, "generator already running");
            return;
        }
        info!(parent: &inner.l, "starting entropy generator");
        let driver = Arc::clone(inner);
        inner.tracker.spawn(async move { driver.run_driver().await });
    }

    /// Signals the driver to halt. Idempotent; terminal.
    pub fn stop(&self) {
        let inner = &self.inner;
        inner.stopped.store(true, Ordering::Release);
        if inner.running.swap(false, Ordering::AcqRel) {
            info!(parent: &inner.l, "stopping entropy generator");
        }
        inner.wake.notify_one();
        inner.tracker.close();
    }

    /// Waits for the driver to quiesce after [`stop`](Self::stop).
    pub async fn wait(&self) {
        self.inner.tracker.wait().await;
    }

    /// Ingests a share from a peer. Returns whether it was stored; every
    /// rejection is silent towards the sender (logged and counted here).
    pub fn apply_entropy_share(&self, share: &EntropyShare) -> bool {
        let inner = &self.inner;
        let height = share.height;

        let (index, validator_key, previous, aeon) = {
            let store = inner.lock_store();
            if height != store.last_computed_height() + 1 {
                debug!(
                    parent: &inner.l,
                    "ignoring entropy share for height {height}, last computed {}",
                    store.last_computed_height()
                );
                metrics::share_dropped("height");
                return false;
            }
            let Some(aeon) = store.current_aeon() else {
                debug!(parent: &inner.l, "ignoring entropy share for height {height}: no active aeon");
                metrics::share_dropped("no_aeon");
                return false;
            };
            if !aeon.covers(height) {
                debug!(
                    parent: &inner.l,
                    "ignoring entropy share for height {height} outside aeon [{}, {}]",
                    aeon.start(),
                    aeon.end()
                );
                metrics::share_dropped("outside_aeon");
                return false;
            }
            let Some((index, validator)) =
                aeon.validators().get_by_address(&share.signer_address)
            else {
                debug!(
                    parent: &inner.l,
                    "ignoring entropy share from unknown signer {}", share.signer_address
                );
                metrics::share_dropped("unknown_signer");
                return false;
            };
            if store.has_share(height, index) {
                debug!(
                    parent: &inner.l,
                    "ignoring duplicate entropy share from index {index} for height {height}"
                );
                metrics::share_dropped("duplicate");
                return false;
            }
            let Some(previous) = store.get_computed(height - 1) else {
                debug!(
                    parent: &inner.l,
                    "ignoring entropy share for height {height}: previous entropy missing"
                );
                metrics::share_dropped("missing_previous");
                return false;
            };
            (
                index,
                validator.pub_key.clone(),
                previous.clone(),
                Arc::clone(aeon),
            )
        };

        // Both signature checks run outside the lock.
        if !validator_key.verify(
            &share.canonical_sign_bytes(&inner.chain_id),
            &share.validator_signature,
        ) {
            warn!(
                parent: &inner.l,
                "entropy share from index {index} for height {height} failed validator signature"
            );
            metrics::share_dropped("validator_signature");
            return false;
        }
        let message = entropy_message(&previous);
        if !aeon
            .exec_unit()
            .verify_share(&message, &share.signature_share, index)
        {
            warn!(
                parent: &inner.l,
                "entropy share from index {index} for height {height} failed bls verification"
            );
            metrics::share_dropped("invalid_share");
            return false;
        }

        let stored = {
            let mut store = inner.lock_store();
            if height != store.last_computed_height() + 1 || store.has_share(height, index) {
                return false;
            }
            store.add_share(index, share.clone());
            let count = store.shares_count(height);
            debug!(
                parent: &inner.l,
                "stored entropy share from index {index} for height {height} ({count}/{})",
                aeon.threshold()
            );
            count == aeon.threshold()
        };

        inner.forward_share(share.clone());
        if stored {
            inner.wake.notify_one();
        }
        true
    }

    /// Ingests an already combined entropy, e.g. while catching up from a
    /// peer or the block store. The node advances one height at a time.
    pub fn apply_computed_entropy(&self, entropy: &ComputedEntropy) -> bool {
        let inner = &self.inner;
        let height = entropy.height;

        let (previous, aeon) = {
            let store = inner.lock_store();
            if height != store.last_computed_height() + 1 {
                debug!(
                    parent: &inner.l,
                    "ignoring computed entropy for height {height}, last computed {}",
                    store.last_computed_height()
                );
                metrics::computed_entropy_dropped("height");
                return false;
            }
            let Some(aeon) = store.current_aeon() else {
                debug!(
                    parent: &inner.l,
                    "ignoring computed entropy for height {height}: no active aeon"
                );
                metrics::computed_entropy_dropped("no_aeon");
                return false;
            };
            if store.shares_count(height) >= aeon.threshold() {
                debug!(
                    parent: &inner.l,
                    "ignoring computed entropy for height {height}: local quorum buffered"
                );
                metrics::computed_entropy_dropped("local_quorum");
                return false;
            }
            let Some(previous) = store.get_computed(height - 1) else {
                debug!(
                    parent: &inner.l,
                    "ignoring computed entropy for height {height}: previous entropy missing"
                );
                metrics::computed_entropy_dropped("missing_previous");
                return false;
            };
            (previous.clone(), Arc::clone(aeon))
        };

        let message = entropy_message(&previous);
        if !aeon
            .exec_unit()
            .verify_group_signature(&message, &entropy.group_signature)
        {
            warn!(
                parent: &inner.l,
                "computed entropy for height {height} failed group signature verification"
            );
            metrics::computed_entropy_dropped("invalid_signature");
            return false;
        }

        let mut store = inner.lock_store();
        if height != store.last_computed_height() + 1 {
            return false;
        }
        store.advance_computed(height, entropy.group_signature.clone());
        metrics::last_computed_height(height);
        info!(
            parent: &inner.l,
            "caught up entropy: height {height}, sig {}",
            short_sig(&entropy.group_signature)
        );
        drop(store);
        inner.wake.notify_one();
        true
    }

    pub fn get_computed_entropy(&self, height: u64) -> Option<Vec<u8>> {
        self.inner.lock_store().get_computed(height).cloned()
    }

    pub fn get_last_computed_entropy_height(&self) -> u64 {
        self.inner.lock_store().last_computed_height()
    }

    /// Snapshot of the shares buffered for `height`, keyed by signer index.
    pub fn get_entropy_shares(&self, height: u64) -> BTreeMap<u32, EntropyShare> {
        self.inner
            .lock_store()
            .shares_at(height)
            .cloned()
            .unwrap_or_default()
    }

    /// True iff an aeon is active and this node holds a signing share.
    pub fn is_signing_entropy(&self) -> bool {
        self.inner
            .lock_store()
            .current_aeon()
            .is_some_and(|aeon| aeon.can_sign())
    }

    /// Block-commit hook; called once per committed block, monotonically.
    pub fn set_last_block_height(&self, height: u64) {
        let inner = &self.inner;
        let mut store = inner.lock_store();
        if store.set_last_block_height(height) {
            drop(store);
            inner.wake.notify_one();
        }
    }

    /// Hands out the relay stream of accepted shares (own and remote).
    /// A later subscription replaces the previous one.
    pub fn subscribe_shares(&self) -> mpsc::UnboundedReceiver<EntropyShare> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.share_tx.lock().expect("share_tx mutex poisoned") = Some(tx);
        rx
    }

    /// Runs the self-sign step once (the driver does this every tick).
    #[cfg(test)]
    pub(crate) fn sign(&self) {
        self.inner.sign();
    }

    /// Heights currently buffered as (shares, computed entropies).
    #[cfg(test)]
    pub(crate) fn buffered_heights(&self) -> (usize, usize) {
        let store = self.inner.lock_store();
        (store.share_heights(), store.computed_heights())
    }
}

impl Clone for EntropyGenerator {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl std::ops::Deref for EntropyGenerator {
    type Target = Inner;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Inner {
    fn lock_store(&self) -> std::sync::MutexGuard<'_, ShareStore> {
        self.store.lock().expect("generator mutex poisoned")
    }

    fn forward_share(&self, share: EntropyShare) {
        let mut guard = self.share_tx.lock().expect("share_tx mutex poisoned");
        if let Some(tx) = guard.as_ref() {
            if tx.send(share).is_err() {
                *guard = None;
            }
        }
    }

    async fn run_driver(self: Arc<Self>) {
        debug!(parent: &self.l, "entropy driver started");
        loop {
            if !self.running.load(Ordering::Acquire) {
                break;
            }
            self.rotate_aeon();
            self.sign();
            let progressed = self.try_combine();
            self.prune();
            if progressed {
                continue;
            }
            tokio::select! {
                () = self.wake.notified() => {}
                () = sleep(COMPUTE_ENTROPY_INTERVAL) => {}
            }
        }
        debug!(parent: &self.l, "entropy driver stopped");
    }

    /// Promotes a queued aeon once its start is reachable and retires the
    /// current one when its range has passed.
    fn rotate_aeon(&self) {
        let promoted = {
            let mut store = self.lock_store();
            let next_height = store.last_block_height() + 1;
            let next_ready = store
                .next_aeon()
                .is_some_and(|aeon| aeon.start() <= next_height);
            let current_end = store.current_aeon().map(|aeon| aeon.end());
            match current_end {
                None if next_ready => store.promote_next_aeon(),
                Some(end) if end < next_height => {
                    info!(
                        parent: &self.l,
                        "aeon completed at height {end}, last block height {}",
                        store.last_block_height()
                    );
                    store.clear_current_aeon();
                    if next_ready {
                        store.promote_next_aeon()
                    } else {
                        warn!(parent: &self.l, "no queued aeon: entering observer mode");
                        None
                    }
                }
                _ => None,
            }
        };

        if let Some(aeon) = promoted {
            info!(
                parent: &self.l,
                "moving to new aeon [{}, {}], threshold {}, signing {}",
                aeon.start(),
                aeon.end(),
                aeon.threshold(),
                aeon.can_sign()
            );
            metrics::report_metrics_on_aeon(aeon.validators().len(), aeon.threshold());
            if let Some(path) = &self.aeon_file {
                if let Err(err) = aeon.save(path) {
                    warn!(parent: &self.l, "failed to persist promoted aeon: {err}");
                }
            }
        }
    }

    /// Produces and stores this validator's own share for the next height.
    /// Idempotent: repeated calls never yield a second stored share.
    fn sign(&self) {
        let (height, message, aeon, signer) = {
            let store = self.lock_store();
            let Some(aeon) = store.current_aeon() else {
                return;
            };
            if !aeon.can_sign() {
                return;
            }
            let height = store.last_computed_height() + 1;
            if !aeon.covers(height) {
                return;
            }
            let index = aeon.exec_unit().dkg_index().expect("signing aeon has an index");
            if !aeon.exec_unit().in_qual(index) || store.has_share(height, index) {
                return;
            }
            let Some(previous) = store.get_computed(height - 1) else {
                return;
            };
            let signer = aeon
                .priv_validator()
                .expect("signing aeon has a priv validator")
                .clone();
            (height, entropy_message(previous), Arc::clone(aeon), signer)
        };

        let signature_share = match aeon.exec_unit().sign(&message) {
            Ok(share) => share,
            Err(err) => {
                error!(parent: &self.l, "failed to sign entropy share at height {height}: {err}");
                return;
            }
        };
        let mut share = EntropyShare {
            height,
            signer_address: signer.address(),
            signature_share,
            validator_signature: vec![],
        };
        if let Err(err) = signer.sign_entropy(&self.chain_id, &mut share) {
            error!(parent: &self.l, "failed to seal entropy share at height {height}: {err}");
            return;
        }

        let index = aeon.exec_unit().dkg_index().expect("signing aeon has an index");
        let stored = {
            let mut store = self.lock_store();
            store.last_computed_height() + 1 == height && store.add_share(index, share.clone())
        };
        if stored {
            debug!(parent: &self.l, "signed own entropy share for height {height}");
            self.forward_share(share);
        }
    }

    /// Combines the buffered shares for the next height once the threshold
    /// is reached. The driver is the sole caller, so combination at a given
    /// height happens at most once.
    fn try_combine(&self) -> bool {
        let (height, subset, message, aeon) = {
            let store = self.lock_store();
            let Some(aeon) = store.current_aeon() else {
                return false;
            };
            let height = store.last_computed_height() + 1;
            if !aeon.covers(height) || store.get_computed(height).is_some() {
                return false;
            }
            let Some(shares) = store.shares_at(height) else {
                return false;
            };
            if shares.len() < aeon.threshold() {
                return false;
            }
            // Lowest signer indices first; the result is subset-independent
            // but the selection is kept deterministic.
            let subset: BTreeMap<u32, Vec<u8>> = shares
                .iter()
                .take(aeon.threshold())
                .map(|(&index, share)| (index, share.signature_share.clone()))
                .collect();
            let Some(previous) = store.get_computed(height - 1) else {
                return false;
            };
            (height, subset, entropy_message(previous), Arc::clone(aeon))
        };

        let group_signature = match aeon.exec_unit().combine(&subset, aeon.threshold()) {
            Ok(signature) => signature,
            Err(err) => {
                error!(
                    parent: &self.l,
                    "failed to combine verified shares at height {height}: {err}, please report this"
                );
                panic!("entropy keying corrupted at height {height}");
            }
        };
        if !aeon
            .exec_unit()
            .verify_group_signature(&message, &group_signature)
        {
            error!(
                parent: &self.l,
                "combined group signature invalid at height {height}, please report this"
            );
            panic!("entropy keying corrupted at height {height}");
        }

        let mut store = self.lock_store();
        if store.last_computed_height() + 1 != height || store.get_computed(height).is_some() {
            return false;
        }
        store.advance_computed(height, group_signature.clone());
        metrics::last_computed_height(height);
        info!(
            parent: &self.l,
            "new entropy computed: height {height}, sig {}",
            short_sig(&group_signature)
        );
        true
    }

    fn prune(&self) {
        self.lock_store().prune(ENTROPY_HISTORY_LENGTH);
    }
}

fn short_sig(signature: &[u8]) -> String {
    hex::encode(signature.get(..SHORT_SIG_BYTES).unwrap_or_default())
}
