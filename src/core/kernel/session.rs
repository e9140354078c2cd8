use crate::core::errors::ExchangeError;
use crate::core::kernel::codec::{InboundMessage, WsCodec};
use crate::core::kernel::subscriptions::{AddOutcome, SubscriptionRegistry};
use crate::core::kernel::ws::{TungsteniteConnector, WsConfig, WsConnection, WsConnector, WsStream};
use crate::core::traits::{ErrorCallback, MessageHandler};
use crate::core::types::{SessionState, WsEvent};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Produces the signed authentication frame for a private feed.
///
/// Called once per connection epoch, so each attempt carries a fresh timestamp.
pub trait WsAuthenticator: Send + Sync {
    fn auth_frame(&self) -> Result<String, ExchangeError>;
}

#[derive(Debug, PartialEq, Eq)]
enum ReadExit {
    Shutdown,
    Disconnected,
}

/// Resolves once `close()` has been requested
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let requested = *shutdown.borrow_and_update();
        if requested {
            return;
        }
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

struct SessionInner<C: WsCodec> {
    url: String,
    codec: C,
    connector: Arc<dyn WsConnector>,
    config: WsConfig,
    authenticator: Option<Arc<dyn WsAuthenticator>>,
    on_error: Option<ErrorCallback>,
    registry: SubscriptionRegistry,
    connection: WsConnection,
    state: watch::Sender<SessionState>,
    shutdown: watch::Sender<bool>,
    closed: AtomicBool,
    // bumped on every successful dial
    epoch: AtomicU64,
    // epoch whose write failure raised `reconnect_requested`
    failed_epoch: AtomicU64,
    reconnect_requested: Notify,
    // held while deciding whether a subscribe frame goes out now or at replay
    sub_lock: Mutex<()>,
}

/// A logical WebSocket session that survives reconnects.
///
/// `open()` runs the first connection epoch inline and then hands the socket
/// to a driver task, which owns the read loop and the reconnect loop. Callers
/// subscribe from any task; frames are written one at a time through the
/// shared connection.
pub struct WsSession<C: WsCodec> {
    inner: Arc<SessionInner<C>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

/// Builder for [`WsSession`]
pub struct WsSessionBuilder<C: WsCodec> {
    url: String,
    codec: C,
    connector: Arc<dyn WsConnector>,
    config: WsConfig,
    authenticator: Option<Arc<dyn WsAuthenticator>>,
    on_error: Option<ErrorCallback>,
}

impl<C: WsCodec> WsSessionBuilder<C> {
    pub fn new(url: impl Into<String>, codec: C) -> Self {
        Self {
            url: url.into(),
            codec,
            connector: Arc::new(TungsteniteConnector),
            config: WsConfig::default(),
            authenticator: None,
            on_error: None,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn WsConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_config(mut self, config: WsConfig) -> Self {
        self.config = config;
        self
    }

    /// Make this a private feed that authenticates on every connection epoch
    pub fn with_authenticator(mut self, authenticator: Arc<dyn WsAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Session-level error sink for errors no subscription handler owns
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ExchangeError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> WsSession<C> {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (shutdown, _) = watch::channel(false);
        let connection = WsConnection::from_config(&self.config);

        WsSession {
            inner: Arc::new(SessionInner {
                url: self.url,
                codec: self.codec,
                connector: self.connector,
                config: self.config,
                authenticator: self.authenticator,
                on_error: self.on_error,
                registry: SubscriptionRegistry::new(),
                connection,
                state,
                shutdown,
                closed: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                failed_epoch: AtomicU64::new(0),
                reconnect_requested: Notify::new(),
                sub_lock: Mutex::new(()),
            }),
            driver: Mutex::new(None),
        }
    }
}

impl<C: WsCodec> std::fmt::Debug for WsSession<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSession")
            .field("url", &self.inner.url)
            .finish_non_exhaustive()
    }
}

impl<C: WsCodec> WsSession<C> {
    pub fn builder(url: impl Into<String>, codec: C) -> WsSessionBuilder<C> {
        WsSessionBuilder::new(url, codec)
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state transition
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.inner.registry
    }

    /// Connect, authenticate if configured, replay registered subscriptions,
    /// and return once the session is `Ready`.
    ///
    /// A failure leaves the session `Disconnected` and is not retried here.
    /// Calling `open` on a session that is already running is a no-op.
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub async fn open(&self) -> Result<(), ExchangeError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ExchangeError::SessionClosed);
        }

        let mut driver = self.driver.lock().await;
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let mut shutdown = self.inner.shutdown.subscribe();
        let stream = self.inner.establish(&mut shutdown).await?;
        info!("WebSocket session ready");

        let inner = Arc::clone(&self.inner);
        *driver = Some(tokio::spawn(inner.run(stream, shutdown)));

        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ExchangeError::SessionClosed);
        }
        Ok(())
    }

    /// Register `handler` for `topic` and subscribe on the live connection.
    ///
    /// The frame is only sent while `Ready`; otherwise the topic goes out with
    /// the next replay. Re-subscribing a registered topic swaps its handler
    /// without sending anything.
    #[instrument(skip(self, handler), fields(topic = %topic))]
    pub async fn subscribe<H>(&self, topic: &str, handler: H) -> Result<(), ExchangeError>
    where
        H: MessageHandler + 'static,
    {
        self.subscribe_arc(topic, Arc::new(handler)).await
    }

    pub async fn subscribe_arc(
        &self,
        topic: &str,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<(), ExchangeError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ExchangeError::SessionClosed);
        }

        let _guard = self.inner.sub_lock.lock().await;
        if self.inner.registry.add(topic, handler) == AddOutcome::Replaced {
            debug!("Replaced handler of existing subscription");
            return Ok(());
        }

        if self.state() != SessionState::Ready {
            debug!(state = %self.state(), "Subscription deferred to next replay");
            return Ok(());
        }

        let Some(subscription) = self.inner.registry.get(topic) else {
            return Ok(());
        };
        let frame = match self.inner.codec.encode_subscription(topic, &subscription.id) {
            Ok(frame) => frame,
            Err(e) => {
                self.inner.registry.remove(topic);
                return Err(e);
            }
        };
        self.inner.send_or_reconnect(&frame).await
    }

    /// Drop `topic` from the registry and unsubscribe on the live connection.
    /// Unknown topics are ignored.
    #[instrument(skip(self), fields(topic = %topic))]
    pub async fn unsubscribe(&self, topic: &str) -> Result<(), ExchangeError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ExchangeError::SessionClosed);
        }

        let _guard = self.inner.sub_lock.lock().await;
        let Some(subscription) = self.inner.registry.remove(topic) else {
            return Ok(());
        };

        if self.state() == SessionState::Ready {
            let frame = self
                .inner
                .codec
                .encode_unsubscription(topic, &subscription.id)?;
            self.inner.send_or_reconnect(&frame).await?;
        }
        Ok(())
    }

    /// Terminal shutdown. Safe from any state and idempotent.
    ///
    /// Stops the driver (aborting it after the configured grace period) and
    /// releases the socket.
    #[instrument(skip(self), fields(url = %self.inner.url))]
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.inner.transition(SessionState::Closing);
        self.inner.shutdown.send_replace(true);

        let handle = self.driver.lock().await.take();
        if let Some(mut handle) = handle {
            if tokio::time::timeout(self.inner.config.close_grace, &mut handle)
                .await
                .is_err()
            {
                warn!("Session driver did not stop within grace period, aborting");
                handle.abort();
            }
        }

        self.inner.connection.close().await;
        self.inner.transition(SessionState::Disconnected);
        info!("WebSocket session closed");
    }
}

impl<C: WsCodec> Drop for WsSession<C> {
    fn drop(&mut self) {
        self.inner.shutdown.send_replace(true);
    }
}

impl<C: WsCodec> SessionInner<C> {
    /// Move to `next` if the state machine allows it. Returns whether it did.
    fn transition(&self, next: SessionState) -> bool {
        let mut accepted = false;
        let mut from = next;
        self.state.send_if_modified(|state| {
            if !state.can_transition_to(next) {
                return false;
            }
            accepted = true;
            from = *state;
            *state = next;
            from != next
        });

        if accepted && from != next {
            debug!(from = %from, to = %next, "Session state changed");
        }
        accepted
    }

    fn report(&self, error: &ExchangeError) {
        if let Some(callback) = &self.on_error {
            callback(error);
        }
    }

    /// Caller-side write. Gives way to `close()`; a dead socket hands the
    /// frame over to the next replay and wakes the driver.
    async fn send_or_reconnect(&self, frame: &str) -> Result<(), ExchangeError> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let mut shutdown = self.shutdown.subscribe();

        let result = tokio::select! {
            result = self.connection.send(frame) => result,
            () = shutdown_requested(&mut shutdown) => return Err(ExchangeError::SessionClosed),
        };

        match result {
            Err(e @ ExchangeError::SendError(_)) => {
                warn!(error = %e, epoch, "Write failed, forcing reconnect");
                self.report(&e);
                self.failed_epoch.store(epoch, Ordering::SeqCst);
                self.reconnect_requested.notify_one();
                Ok(())
            }
            other => other,
        }
    }

    fn dispatch(&self, event: &WsEvent) {
        match self.registry.handler(&event.topic) {
            Some(handler) => handler.handle(event),
            None => warn!(topic = %event.topic, "No handler registered, dropping message"),
        }
    }

    fn resolve_topic(&self, topic: Option<String>, id: Option<String>) -> Option<String> {
        topic.or_else(|| {
            id.and_then(|id| self.registry.get_by_id(&id))
                .map(|subscription| subscription.topic)
        })
    }

    /// The exchange refused a subscription. It is dropped from the registry
    /// and the error goes to its handler.
    fn subscription_rejected(&self, topic: Option<String>, id: Option<String>, message: String) {
        let Some(topic) = self.resolve_topic(topic, id) else {
            warn!(%message, "Subscribe request rejected for unknown subscription");
            self.report(&ExchangeError::SubscriptionRejected {
                topic: String::new(),
                message,
            });
            return;
        };

        warn!(topic = %topic, %message, "Subscribe request rejected");
        let error = ExchangeError::SubscriptionRejected {
            topic: topic.clone(),
            message,
        };
        match self.registry.remove(&topic) {
            Some(subscription) => subscription.handler.on_error(&error),
            None => self.report(&error),
        }
    }

    /// Run one connection epoch up to `Ready`, racing it against shutdown.
    async fn establish(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Box<dyn WsStream>, ExchangeError> {
        let result = tokio::select! {
            result = self.handshake() => result,
            () = shutdown_requested(shutdown) => Err(ExchangeError::SessionClosed),
        };

        if let Err(e) = &result {
            debug!(error = %e, "Connection epoch failed");
            self.connection.close().await;
            self.transition(SessionState::Disconnected);
        }
        result
    }

    async fn handshake(&self) -> Result<Box<dyn WsStream>, ExchangeError> {
        if !self.transition(SessionState::Connecting) {
            return Err(ExchangeError::SessionClosed);
        }

        let mut stream = self
            .connection
            .connect(self.connector.as_ref(), &self.url, self.config.connect_timeout)
            .await?;
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.transition(SessionState::Connected);

        if let Some(authenticator) = &self.authenticator {
            self.transition(SessionState::Authenticating);
            self.authenticate(authenticator.as_ref(), stream.as_mut())
                .await?;
        }

        self.replay_subscriptions(stream.as_mut()).await?;
        Ok(stream)
    }

    async fn authenticate(
        &self,
        authenticator: &dyn WsAuthenticator,
        stream: &mut dyn WsStream,
    ) -> Result<(), ExchangeError> {
        let frame = authenticator.auth_frame()?;
        self.connection.send(&frame).await?;

        let deadline = Instant::now() + self.config.ack_timeout;
        loop {
            let next = tokio::time::timeout_at(
                deadline,
                self.connection.next_message(stream, &self.codec),
            )
            .await
            .map_err(|_| {
                ExchangeError::ConnectError("no authentication response before timeout".to_string())
            })?;

            match next {
                None => {
                    return Err(ExchangeError::ConnectError(
                        "connection closed during authentication".to_string(),
                    ))
                }
                Some(Err(e)) if e.is_decode_error() => {
                    warn!(error = %e, "Skipping undecodable frame");
                    self.report(&e);
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(InboundMessage::AuthAck)) => {
                    info!("Authenticated");
                    return Ok(());
                }
                Some(Ok(InboundMessage::AuthRejected { code, message })) => {
                    error!(code, %message, "Authentication rejected");
                    return Err(ExchangeError::AuthError(format!("{}: {}", code, message)));
                }
                Some(Ok(_)) => {}
            }
        }
    }

    /// Re-send every registered subscription in insertion order and wait for
    /// each acknowledgement, then mark the session `Ready`.
    ///
    /// Data for a topic is buffered until that topic is acknowledged in this
    /// epoch. Topics registered while the replay runs are picked up before
    /// the session becomes `Ready`.
    async fn replay_subscriptions(&self, stream: &mut dyn WsStream) -> Result<(), ExchangeError> {
        let mut sent: HashSet<String> = HashSet::new();
        let mut pending: HashMap<String, Vec<WsEvent>> = HashMap::new();

        loop {
            let guard = self.sub_lock.lock().await;
            let fresh: Vec<_> = self
                .registry
                .all()
                .into_iter()
                .filter(|subscription| !sent.contains(&subscription.topic))
                .collect();

            if fresh.is_empty() {
                if !self.transition(SessionState::Ready) {
                    return Err(ExchangeError::SessionClosed);
                }
                drop(guard);
                return Ok(());
            }
            drop(guard);

            for subscription in fresh {
                let frame = self
                    .codec
                    .encode_subscription(&subscription.topic, &subscription.id)?;
                self.connection.send(&frame).await?;
                debug!(topic = %subscription.topic, "Subscribe frame sent");
                pending.insert(subscription.topic.clone(), Vec::new());
                sent.insert(subscription.topic);
            }

            self.await_acks(stream, &mut pending, &sent).await?;
        }
    }

    async fn await_acks(
        &self,
        stream: &mut dyn WsStream,
        pending: &mut HashMap<String, Vec<WsEvent>>,
        sent: &HashSet<String>,
    ) -> Result<(), ExchangeError> {
        let deadline = Instant::now() + self.config.ack_timeout;

        while !pending.is_empty() {
            let next = tokio::time::timeout_at(
                deadline,
                self.connection.next_message(stream, &self.codec),
            )
            .await
            .map_err(|_| {
                ExchangeError::ConnectError(format!(
                    "{} subscription(s) not acknowledged before timeout",
                    pending.len()
                ))
            })?;

            match next {
                None => {
                    return Err(ExchangeError::ConnectError(
                        "connection closed while replaying subscriptions".to_string(),
                    ))
                }
                Some(Err(e)) if e.is_decode_error() => {
                    warn!(error = %e, "Skipping undecodable frame");
                    self.report(&e);
                }
                Some(Err(e)) => return Err(e),
                Some(Ok(InboundMessage::SubscribeAck { topic })) => {
                    if let Some(buffered) = pending.remove(&topic) {
                        debug!(topic = %topic, buffered = buffered.len(), "Subscription acknowledged");
                        for event in &buffered {
                            self.dispatch(event);
                        }
                    }
                }
                Some(Ok(InboundMessage::SubscribeError { topic, id, message })) => {
                    if let Some(topic) = self.resolve_topic(topic.clone(), id.clone()) {
                        pending.remove(&topic);
                    }
                    self.subscription_rejected(topic, id, message);
                }
                Some(Ok(InboundMessage::Data(event))) => {
                    if let Some(buffer) = pending.get_mut(&event.topic) {
                        buffer.push(event);
                    } else if sent.contains(&event.topic) {
                        self.dispatch(&event);
                    } else {
                        warn!(topic = %event.topic, "Dropping message for topic not subscribed on this connection");
                    }
                }
                Some(Ok(_)) => {}
            }
        }
        Ok(())
    }

    /// Driver task: read until the connection drops, then reconnect, until
    /// shutdown or a fatal error.
    async fn run(
        self: Arc<Self>,
        mut stream: Box<dyn WsStream>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            let exit = self.read_loop(stream.as_mut(), &mut shutdown).await;
            if exit == ReadExit::Shutdown {
                self.connection.close().await;
                break;
            }

            // callers must stop seeing Ready before the writer goes away
            self.transition(SessionState::Disconnected);
            self.connection.close().await;
            match self.reconnect(&mut shutdown).await {
                Some(next) => stream = next,
                None => break,
            }
        }
        debug!(url = %self.url, "Session driver stopped");
    }

    async fn read_loop(
        &self,
        stream: &mut dyn WsStream,
        shutdown: &mut watch::Receiver<bool>,
    ) -> ReadExit {
        let epoch = self.epoch.load(Ordering::SeqCst);
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown_requested(shutdown) => return ReadExit::Shutdown,
                () = self.reconnect_requested.notified() => {
                    if self.failed_epoch.load(Ordering::SeqCst) == epoch {
                        return ReadExit::Disconnected;
                    }
                    debug!(epoch, "Ignoring write failure from an earlier connection");
                    continue;
                }
                next = self.connection.next_message(stream, &self.codec) => next,
            };

            match next {
                None => {
                    info!(url = %self.url, "WebSocket connection lost");
                    self.report(&ExchangeError::ConnectError("connection lost".to_string()));
                    return ReadExit::Disconnected;
                }
                Some(Ok(InboundMessage::Data(event))) => self.dispatch(&event),
                Some(Ok(InboundMessage::SubscribeAck { topic })) => {
                    debug!(topic = %topic, "Subscription acknowledged");
                }
                Some(Ok(InboundMessage::SubscribeError { topic, id, message })) => {
                    self.subscription_rejected(topic, id, message);
                }
                Some(Ok(InboundMessage::Unsubscribed { topic })) => {
                    debug!(topic = %topic, "Unsubscribed");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) if e.is_decode_error() => {
                    warn!(error = %e, "Skipping undecodable frame");
                    self.report(&e);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Connection failed");
                    self.report(&e);
                    return ReadExit::Disconnected;
                }
            }
        }
    }

    /// Retry epochs with backoff until one reaches `Ready`. `None` means stop.
    async fn reconnect(&self, shutdown: &mut watch::Receiver<bool>) -> Option<Box<dyn WsStream>> {
        let policy = &self.config.reconnect;
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            if !policy.allows(attempt) {
                error!(attempts = attempt - 1, url = %self.url, "Giving up reconnecting");
                self.report(&ExchangeError::ConnectError(format!(
                    "reconnect abandoned after {} attempts",
                    attempt - 1
                )));
                return None;
            }

            let backoff = policy.backoff(attempt - 1);
            info!(
                attempt,
                backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                url = %self.url,
                "Reconnecting"
            );
            tokio::select! {
                () = tokio::time::sleep(backoff) => {}
                () = shutdown_requested(shutdown) => return None,
            }

            match self.establish(shutdown).await {
                Ok(stream) => {
                    info!(attempt, "Reconnected");
                    return Some(stream);
                }
                Err(ExchangeError::SessionClosed) => return None,
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Reconnect failed permanently");
                    self.report(&e);
                    return None;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnect attempt failed");
                    self.report(&e);
                }
            }
        }
    }
}
