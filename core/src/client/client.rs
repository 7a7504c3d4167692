// Protocol client: connection lifecycle, registration handshake,
// notification submission, inbound event dispatch
//
// Submission calls fire toward eventual delivery: transport failures are
// absorbed by the retry machinery and surface only through the listener.
// Codec and configuration failures return synchronously.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::listener::{ErrorStatus, GntpListener};
use super::registry::{Delivery, PendingNotifications};
use super::retry::RetryScheduler;
use crate::crypto::{Credential, EncryptionAlgorithm};
use crate::message::{
    CallbackResult, CodecError, DaemonResponse, GntpMessage, ResponseKind, WireMode,
};
use crate::transport::{TcpTransport, Transport};
use crate::types::{ApplicationInfo, Notification};

/// Client lifecycle. Monotonic except `RegistrationInFlight` backing off
/// to `Unregistered` on failure; `Closed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unregistered,
    RegistrationInFlight,
    Registered,
    Closed,
}

/// Construction-time validation failures. Raised before any I/O.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("encrypted messages require a credential")]
    EncryptionWithoutCredential,
}

/// Synchronous failures of a submission call. Everything else reaches the
/// caller through the listener.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Daemon address, `host:port`.
    pub address: String,
    /// Shared secret for authentication/encryption.
    pub credential: Option<Credential>,
    /// Cipher the header block and binary payloads. Requires `credential`.
    pub encrypted: bool,
    /// Delay between re-attempts. `None` disables retries entirely; every
    /// transport failure is then terminal.
    pub retry_delay: Option<Duration>,
    /// Retry ceiling per notification (registration retries are
    /// unbounded).
    pub notification_retries: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:23053".to_string(),
            credential: None,
            encrypted: false,
            retry_delay: Some(Duration::from_secs(3)),
            notification_retries: 3,
        }
    }
}

/// Registration latch value observed by all waiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LatchState {
    Pending,
    Registered,
    Closed,
}

enum RetryTask {
    Register,
    Notify(Delivery),
}

/// GNTP protocol client.
///
/// Cheap to clone; all clones share one engine. Construct, call
/// [`register`](GntpClient::register), then submit notifications with
/// [`notify`](GntpClient::notify). Daemon outcomes arrive through the
/// [`GntpListener`] supplied at construction.
#[derive(Clone)]
pub struct GntpClient {
    inner: Arc<Inner>,
}

struct Inner {
    app: ApplicationInfo,
    config: ClientConfig,
    listener: Arc<dyn GntpListener>,
    transport: Arc<dyn Transport>,
    state: Mutex<ConnectionState>,
    latch: watch::Sender<LatchState>,
    closed: AtomicBool,
    next_notification_id: AtomicU64,
    next_token: AtomicU64,
    pending: PendingNotifications,
    retry_counts: Mutex<HashMap<u64, u32>>,
    retrying_registration: AtomicBool,
    scheduler: Option<RetryScheduler<RetryTask>>,
}

impl GntpClient {
    /// Create a client speaking TCP to `config.address`.
    ///
    /// Spawns the dispatcher and retry worker tasks, so this must run
    /// inside a tokio runtime.
    pub fn new(
        app: ApplicationInfo,
        config: ClientConfig,
        listener: Arc<dyn GntpListener>,
    ) -> Result<Self, ConfigError> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let transport = Arc::new(TcpTransport::new(config.address.clone(), events_tx));
        Self::with_transport(app, config, listener, transport, events_rx)
    }

    /// Create a client over an arbitrary transport. `events` must deliver
    /// the daemon responses read off that transport's connections.
    pub fn with_transport(
        app: ApplicationInfo,
        config: ClientConfig,
        listener: Arc<dyn GntpListener>,
        transport: Arc<dyn Transport>,
        mut events: mpsc::UnboundedReceiver<DaemonResponse>,
    ) -> Result<Self, ConfigError> {
        if config.encrypted && config.credential.is_none() {
            return Err(ConfigError::EncryptionWithoutCredential);
        }

        let (latch, _) = watch::channel(LatchState::Pending);
        let (scheduler, due_rx) = match config.retry_delay {
            Some(_) => {
                let (due_tx, due_rx) = mpsc::unbounded_channel();
                (Some(RetryScheduler::new(due_tx)), Some(due_rx))
            }
            None => (None, None),
        };

        let inner = Arc::new(Inner {
            app,
            config,
            listener,
            transport,
            state: Mutex::new(ConnectionState::Unregistered),
            latch,
            closed: AtomicBool::new(false),
            next_notification_id: AtomicU64::new(1),
            next_token: AtomicU64::new(1),
            pending: PendingNotifications::new(),
            retry_counts: Mutex::new(HashMap::new()),
            retrying_registration: AtomicBool::new(false),
            scheduler,
        });

        // dispatcher: inbound daemon events
        let dispatcher = Arc::downgrade(&inner);
        tokio::spawn(async move {
            while let Some(response) = events.recv().await {
                let Some(inner) = dispatcher.upgrade() else {
                    break;
                };
                inner.handle_response(response);
            }
        });

        // driver: retry tasks coming due
        if let Some(mut due_rx) = due_rx {
            let driver = Arc::downgrade(&inner);
            tokio::spawn(async move {
                while let Some(task) = due_rx.recv().await {
                    let Some(inner) = driver.upgrade() else {
                        break;
                    };
                    inner.run_retry_task(task).await;
                }
            });
        }

        Ok(Self { inner })
    }

    /// Announce the application to the daemon. Idempotent; each call is a
    /// fresh connect+write cycle. The client only becomes registered when
    /// the daemon's OK response arrives.
    pub async fn register(&self) -> Result<(), ClientError> {
        self.inner.register().await
    }

    /// True once the registration OK has been observed, until shutdown.
    pub fn is_registered(&self) -> bool {
        self.inner.is_registered()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Suspend until registered or shut down. Safe to call from any
    /// number of tasks; all are released together.
    pub async fn wait_registration(&self) {
        self.inner.wait_registration().await;
    }

    /// Like [`wait_registration`](GntpClient::wait_registration) but
    /// bounded; returns whether the client is registered.
    pub async fn wait_registration_timeout(&self, timeout: Duration) -> bool {
        self.inner.wait_registration_timeout(timeout).await
    }

    /// Submit a notification. Suspends until registered, then performs
    /// one delivery attempt; transport failures retry under the
    /// notification policy. After shutdown this is a no-op.
    pub async fn notify(&self, notification: Notification) -> Result<(), ClientError> {
        self.inner.wait_registration().await;
        if !self.inner.is_registered() {
            return Ok(());
        }
        let delivery = self.inner.new_delivery(notification);
        self.inner.notify_attempt(delivery).await
    }

    /// Submit a notification, waiting at most `timeout` for registration.
    /// If registration does not complete in time the notification is
    /// silently dropped: no delivery attempt, no error.
    pub async fn notify_timeout(
        &self,
        notification: Notification,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        if !self.inner.wait_registration_timeout(timeout).await {
            return Ok(());
        }
        let delivery = self.inner.new_delivery(notification);
        self.inner.notify_attempt(delivery).await
    }

    /// Tear down: release registration waiters, cancel scheduled retries,
    /// close tracked connections. `timeout` bounds the total teardown;
    /// steps that overrun are abandoned, not waited on.
    pub async fn shutdown(&self, timeout: Duration) {
        self.inner.shutdown(timeout).await;
    }
}

impl Inner {
    fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn is_registered(&self) -> bool {
        matches!(*self.latch.borrow(), LatchState::Registered) && !self.closed()
    }

    fn wire_mode(&self) -> WireMode<'_> {
        match (&self.config.credential, self.config.encrypted) {
            (Some(credential), true) => WireMode::Encrypted {
                credential,
                algorithm: EncryptionAlgorithm::Aes,
            },
            (credential, _) => WireMode::Cleartext {
                credential: credential.as_ref(),
            },
        }
    }

    fn new_delivery(&self, notification: Notification) -> Delivery {
        Delivery {
            token: self.next_token.fetch_add(1, Ordering::SeqCst),
            id: None,
            notification,
        }
    }

    async fn wait_registration(&self) {
        let mut latch = self.latch.subscribe();
        let _ = latch
            .wait_for(|state| !matches!(state, LatchState::Pending))
            .await;
    }

    async fn wait_registration_timeout(&self, timeout: Duration) -> bool {
        let mut latch = self.latch.subscribe();
        let released = tokio::time::timeout(
            timeout,
            latch.wait_for(|state| !matches!(state, LatchState::Pending)),
        )
        .await;
        match released {
            Ok(Ok(state)) => matches!(*state, LatchState::Registered) && !self.closed(),
            Ok(Err(_)) | Err(_) => false,
        }
    }

    async fn register(&self) -> Result<(), ClientError> {
        if self.closed() {
            return Ok(());
        }
        debug!(application = %self.app.name, "registering application");
        {
            let mut state = self.state.lock();
            match *state {
                ConnectionState::Closed => return Ok(()),
                ConnectionState::Unregistered => *state = ConnectionState::RegistrationInFlight,
                _ => {}
            }
        }

        // codec failures are synchronous and fatal; encode before any I/O
        let message = GntpMessage::register(&self.app);
        let bytes = message.encode(self.wire_mode())?;

        match self.transport.connect().await {
            Ok(connection) => {
                if let Err(e) = connection.write(&bytes).await {
                    warn!(error = %e, "registration write failed");
                    self.registration_failed();
                }
            }
            Err(e) => {
                debug!(error = %e, "registration connect failed");
                self.registration_failed();
            }
        }
        Ok(())
    }

    /// Back off the state machine and reschedule a fresh registration
    /// attempt. Registration retries have no ceiling.
    fn registration_failed(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::RegistrationInFlight) {
                *state = ConnectionState::Unregistered;
            }
        }
        if self.closed() {
            return;
        }
        let (Some(scheduler), Some(delay)) = (&self.scheduler, self.config.retry_delay) else {
            return;
        };
        if self.retrying_registration.load(Ordering::SeqCst) {
            // a guarded retry is already queued
            return;
        }
        debug!(?delay, "registration failed, retrying");
        scheduler.schedule_after(delay, RetryTask::Register);
    }

    /// Schedule a registration retry from the response path. At most one
    /// such chain is in flight at a time.
    fn retry_registration(&self) {
        let (Some(scheduler), Some(delay)) = (&self.scheduler, self.config.retry_delay) else {
            return;
        };
        if self.closed() {
            return;
        }
        if self.retrying_registration.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(?delay, "scheduling registration retry");
        scheduler.schedule_after(delay, RetryTask::Register);
    }

    /// One delivery attempt: connect, allocate the series id if this is
    /// the first attempt, record the delivery, write.
    async fn notify_attempt(&self, mut delivery: Delivery) -> Result<(), ClientError> {
        if self.closed() {
            return Ok(());
        }
        debug!(notification = %delivery.notification.name, "sending notification");
        match self.transport.connect().await {
            Ok(connection) => {
                // the id survives retries of this delivery series
                let id = match delivery.id {
                    Some(id) => id,
                    None => {
                        let id = self.next_notification_id.fetch_add(1, Ordering::SeqCst);
                        delivery.id = Some(id);
                        id
                    }
                };
                let message = GntpMessage::notify(&self.app.name, &delivery.notification, id);
                let bytes = message.encode(self.wire_mode())?;
                self.pending.insert(id, delivery.clone());
                if let Err(e) = connection.write(&bytes).await {
                    warn!(error = %e, "notification write failed");
                    self.pending.remove_by_id(id);
                    self.schedule_notification_retry(delivery);
                }
                Ok(())
            }
            Err(e) => {
                debug!(error = %e, "notification connect failed");
                self.schedule_notification_retry(delivery);
                Ok(())
            }
        }
    }

    /// Consult the bounded notification retry policy after a transport
    /// failure. Attempt counting starts at 1 on the first failure; past
    /// the ceiling the delivery is dropped and only logged.
    fn schedule_notification_retry(&self, delivery: Delivery) {
        let (Some(scheduler), Some(delay)) = (&self.scheduler, self.config.retry_delay) else {
            debug!(
                notification = %delivery.notification.name,
                "delivery failed and retries are disabled, dropping"
            );
            return;
        };
        if self.closed() {
            return;
        }
        let max_retries = self.config.notification_retries;
        let attempt = {
            let mut counts = self.retry_counts.lock();
            let attempt = counts.get(&delivery.token).copied().unwrap_or(1);
            if attempt <= max_retries {
                counts.insert(delivery.token, attempt + 1);
                Some(attempt)
            } else {
                counts.remove(&delivery.token);
                None
            }
        };
        match attempt {
            Some(attempt) => {
                debug!(
                    notification = %delivery.notification.name,
                    attempt,
                    max = max_retries,
                    ?delay,
                    "delivery failed, retry scheduled"
                );
                scheduler.schedule_after(delay, RetryTask::Notify(delivery));
            }
            None => {
                debug!(
                    notification = %delivery.notification.name,
                    "delivery failed, giving up"
                );
            }
        }
    }

    async fn run_retry_task(&self, task: RetryTask) {
        if self.closed() {
            return;
        }
        match task {
            RetryTask::Register => {
                self.retrying_registration.store(false, Ordering::SeqCst);
                if let Err(e) = self.register().await {
                    error!(error = %e, "registration retry aborted: codec failure");
                }
            }
            RetryTask::Notify(delivery) => {
                if !self.is_registered() {
                    return;
                }
                if let Err(e) = self.notify_attempt(delivery).await {
                    error!(error = %e, "notification retry aborted: codec failure");
                }
            }
        }
    }

    /// Dispatch one inbound daemon event against the registry and the
    /// retry machinery.
    fn handle_response(&self, response: DaemonResponse) {
        if self.closed() {
            return;
        }
        match response.kind {
            ResponseKind::Ok => {
                let for_register = match response.action.as_deref() {
                    Some(action) => action.eq_ignore_ascii_case("REGISTER"),
                    None => response.internal_id.is_none(),
                };
                if for_register {
                    self.set_registered();
                } else if let Some(id) = response.internal_id {
                    self.resolve_notification_ok(id);
                } else {
                    debug!("ok response without correlation id, ignoring");
                }
            }
            ResponseKind::Callback => self.resolve_callback(&response),
            ResponseKind::Error => self.resolve_error(response),
        }
    }

    /// One-time `Registered` transition; releases every waiter.
    fn set_registered(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ConnectionState::Closed) {
                return;
            }
            *state = ConnectionState::Registered;
        }
        let fired = self.latch.send_if_modified(|latch| {
            if matches!(latch, LatchState::Pending) {
                *latch = LatchState::Registered;
                true
            } else {
                false
            }
        });
        if fired {
            info!(application = %self.app.name, "application registered");
            self.listener.on_registered();
        }
    }

    fn resolve_notification_ok(&self, id: u64) {
        let Some(delivery) = self.pending.get_by_id(id) else {
            debug!(id, "ok response for unknown notification");
            return;
        };
        self.retry_counts.lock().remove(&delivery.token);
        let awaiting_callback = delivery.notification.callback_requested
            && delivery.notification.callback_target.is_none();
        if !awaiting_callback {
            self.pending.remove_by_id(id);
        }
        self.listener.on_notification_ok(&delivery.notification);
    }

    fn resolve_callback(&self, response: &DaemonResponse) {
        let Some(id) = response.internal_id else {
            warn!("callback without correlation id, ignoring");
            return;
        };
        let Some(delivery) = self.pending.remove_by_id(id) else {
            debug!(id, "callback for unknown notification");
            return;
        };
        match response.callback_result {
            Some(CallbackResult::Clicked) => self.listener.on_click(&delivery.notification),
            Some(CallbackResult::Closed) => self.listener.on_close(&delivery.notification),
            Some(CallbackResult::TimedOut) | None => {
                self.listener.on_timeout(&delivery.notification)
            }
        }
    }

    fn resolve_error(&self, response: DaemonResponse) {
        let status = ErrorStatus {
            code: response.error_code,
            description: response.error_description,
        };
        warn!(code = ?status.code, description = ?status.description, "daemon reported an error");
        if let Some(id) = response.internal_id {
            if let Some(delivery) = self.pending.remove_by_id(id) {
                self.retry_counts.lock().remove(&delivery.token);
            }
        } else if !self.is_registered() {
            self.retry_registration();
        }
        self.listener.on_error(status);
    }

    async fn shutdown(&self, timeout: Duration) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("shutting down client");
        let deadline = tokio::time::Instant::now() + timeout;
        {
            let mut state = self.state.lock();
            *state = ConnectionState::Closed;
        }
        // release anyone stuck waiting for a registration that will
        // never happen
        self.latch.send_if_modified(|latch| {
            if matches!(latch, LatchState::Pending) {
                *latch = LatchState::Closed;
                true
            } else {
                false
            }
        });
        if let Some(scheduler) = &self.scheduler {
            scheduler.cancel_all();
        }
        if tokio::time::timeout_at(deadline, self.transport.close_all())
            .await
            .is_err()
        {
            warn!("transport close timed out during shutdown");
        }
    }
}
