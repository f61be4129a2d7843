//! Reconnecting push-connection lifecycle.
//!
//! [`ConnectionManager::open`] spawns one driver task per connection. The
//! task connects, pumps payloads into a [`StreamHandler`], and on any
//! closure it did not ask for waits and reconnects, up to the
//! [`ReconnectPolicy`] budget. The retry decision itself lives in
//! [`Reconnector`], which does no I/O.
//!
//! ```text
//! Connecting ──▶ Open ──(dropped)──▶ Reconnecting{n} ──▶ Connecting ...
//!     │                                   │
//!     └──(failed)──▶ Reconnecting{n}      └──(budget spent)──▶ Closed(Exhausted)
//!
//! close() from any state ──▶ Closed(Explicit)
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Default wait between reconnect attempts.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(3000);

/// Default number of consecutive failed retries before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;

/// Opens physical connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, TransportError>;
}

/// One open physical connection.
#[async_trait]
pub trait Connection: Send {
    /// Next payload, an error, or `None` once the peer closed the connection.
    async fn next_message(&mut self) -> Option<Result<String, TransportError>>;
}

/// Callbacks for one stream.
///
/// Callbacks run on the driver task while it holds the handler lock, so
/// they must not block and must not call [`Controller::close`] on their own
/// controller.
pub trait StreamHandler: Send + 'static {
    /// A connection was established.
    fn on_open(&mut self) {}

    /// A payload arrived. Payloads are delivered in arrival order.
    fn on_message(&mut self, payload: &str);

    /// An open connection dropped, or the retry budget ran out.
    fn on_close(&mut self, _reason: &CloseReason) {}

    /// Retry `attempt` is scheduled after the reconnect interval.
    fn on_reconnecting(&mut self, _attempt: u32) {}
}

/// Why a connection is (or ended up) closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The caller closed it. Terminal.
    Explicit,
    /// The peer ended the stream.
    Remote,
    /// Connect or read failure.
    Transport(String),
    /// Every retry failed. Terminal.
    Exhausted { attempts: u32 },
}

impl CloseReason {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CloseReason::Explicit | CloseReason::Exhausted { .. })
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Explicit => write!(f, "closed by caller"),
            CloseReason::Remote => write!(f, "closed by peer"),
            CloseReason::Transport(e) => write!(f, "{}", e),
            CloseReason::Exhausted { attempts } => {
                write!(f, "gave up after {} reconnect attempts", attempts)
            }
        }
    }
}

/// Lifecycle state of a controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting { attempt: u32 },
    Closed(CloseReason),
}

impl ConnectionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed(_))
    }
}

/// Fixed-interval, bounded reconnection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RECONNECT_INTERVAL,
            max_attempts: DEFAULT_RECONNECT_ATTEMPTS,
        }
    }
}

/// What to do after a connection failed or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Retry { attempt: u32, delay: Duration },
    GiveUp { attempts: u32 },
}

/// Retry bookkeeping for one controller.
///
/// Counts consecutive failed retries; a successful open resets the count.
#[derive(Debug, Clone)]
pub struct Reconnector {
    policy: ReconnectPolicy,
    retries: u32,
}

impl Reconnector {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy, retries: 0 }
    }

    /// A connection opened.
    pub fn opened(&mut self) {
        self.retries = 0;
    }

    /// The initial attempt or a retry failed, or an open connection dropped.
    pub fn failed(&mut self) -> Decision {
        if self.retries >= self.policy.max_attempts {
            return Decision::GiveUp {
                attempts: self.retries,
            };
        }
        self.retries += 1;
        Decision::Retry {
            attempt: self.retries,
            delay: self.policy.interval,
        }
    }

    /// Retries since the last successful open.
    pub fn retries(&self) -> u32 {
        self.retries
    }
}

type SharedHandler = Arc<Mutex<Option<Box<dyn StreamHandler>>>>;

/// Opens reconnecting connections with a common policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionManager {
    policy: ReconnectPolicy,
}

impl ConnectionManager {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    /// Open `url` and start delivering payloads to `handler`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open<H>(&self, connector: Arc<dyn Connector>, url: &str, handler: H) -> Controller
    where
        H: StreamHandler,
    {
        let handler: SharedHandler = Arc::new(Mutex::new(Some(Box::new(handler))));
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
        let state_tx = Arc::new(state_tx);
        let (stop_tx, stop_rx) = watch::channel(false);

        let driver = Driver {
            connector,
            url: url.to_string(),
            reconnector: Reconnector::new(self.policy),
            handler: handler.clone(),
            state: state_tx.clone(),
            stop: stop_rx,
        };
        let task = tokio::spawn(driver.run());

        Controller {
            url: url.to_string(),
            handler,
            state_tx,
            state_rx,
            stop_tx,
            task,
        }
    }
}

/// Handle to one reconnecting connection.
///
/// Dropping the controller closes the connection.
pub struct Controller {
    url: String,
    handler: SharedHandler,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_rx: watch::Receiver<ConnectionState>,
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("url", &self.url)
            .field("state", &*self.state_rx.borrow())
            .finish()
    }
}

impl Controller {
    /// Close the connection and stop reconnecting.
    ///
    /// Once this returns, no handler callback runs again. Idempotent.
    pub fn close(&self) {
        // Waits for a callback in progress to finish.
        if self.handler.lock().take().is_some() {
            debug!(url = %self.url, "Closing stream");
        }
        set_state(&self.state_tx, ConnectionState::Closed(CloseReason::Explicit));
        let _ = self.stop_tx.send(true);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    /// Watch lifecycle changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.close();
        self.task.abort();
    }
}

/// Update the state unless it is already terminal.
fn set_state(state: &watch::Sender<ConnectionState>, next: ConnectionState) {
    state.send_if_modified(|current| {
        if current.is_closed() || *current == next {
            return false;
        }
        *current = next;
        true
    });
}

/// Run `f` against the handler. Returns `false` if the controller was closed.
fn with_handler(handler: &SharedHandler, f: impl FnOnce(&mut dyn StreamHandler)) -> bool {
    let mut guard = handler.lock();
    match guard.as_mut() {
        Some(h) => {
            f(h.as_mut());
            true
        }
        None => false,
    }
}

/// Resolves once a stop was requested or the controller is gone.
async fn stopped(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

struct Driver {
    connector: Arc<dyn Connector>,
    url: String,
    reconnector: Reconnector,
    handler: SharedHandler,
    state: Arc<watch::Sender<ConnectionState>>,
    stop: watch::Receiver<bool>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            set_state(&self.state, ConnectionState::Connecting);

            let connected = tokio::select! {
                _ = stopped(&mut self.stop) => return,
                result = self.connector.connect(&self.url) => result,
            };

            match connected {
                Ok(connection) => {
                    let Some(reason) = self.pump(connection).await else {
                        return;
                    };
                    info!(url = %self.url, %reason, "Stream connection closed");
                    if !with_handler(&self.handler, |h| h.on_close(&reason)) {
                        return;
                    }
                }
                Err(e) => {
                    warn!(url = %self.url, error = %e, "Stream connection failed");
                }
            }

            match self.reconnector.failed() {
                Decision::Retry { attempt, delay } => {
                    set_state(&self.state, ConnectionState::Reconnecting { attempt });
                    if !with_handler(&self.handler, |h| h.on_reconnecting(attempt)) {
                        return;
                    }
                    debug!(url = %self.url, attempt, ?delay, "Reconnecting");
                    tokio::select! {
                        _ = stopped(&mut self.stop) => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Decision::GiveUp { attempts } => {
                    let reason = CloseReason::Exhausted { attempts };
                    warn!(url = %self.url, attempts, "Giving up on stream");
                    set_state(&self.state, ConnectionState::Closed(reason.clone()));
                    with_handler(&self.handler, |h| h.on_close(&reason));
                    return;
                }
            }
        }
    }

    /// Deliver payloads until the connection ends.
    ///
    /// Returns `None` if the controller was closed meanwhile.
    async fn pump(&mut self, mut connection: Box<dyn Connection>) -> Option<CloseReason> {
        self.reconnector.opened();
        set_state(&self.state, ConnectionState::Open);
        debug!(url = %self.url, "Stream connection open");
        if !with_handler(&self.handler, |h| h.on_open()) {
            return None;
        }

        loop {
            let next = tokio::select! {
                _ = stopped(&mut self.stop) => return None,
                next = connection.next_message() => next,
            };
            match next {
                Some(Ok(payload)) => {
                    if !with_handler(&self.handler, |h| h.on_message(&payload)) {
                        return None;
                    }
                }
                Some(Err(e)) => return Some(CloseReason::Transport(e.to_string())),
                None => return Some(CloseReason::Remote),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted outcome of one connect call.
    enum Script {
        Fail,
        /// Deliver these payloads, then close (`hold == false`) or stay open.
        Open { payloads: Vec<&'static str>, hold: bool },
    }

    struct MockConnector {
        scripts: Mutex<VecDeque<Script>>,
        attempts: AtomicUsize,
    }

    impl MockConnector {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                attempts: AtomicUsize::new(0),
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Connection>, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.scripts.lock().pop_front() {
                Some(Script::Open { payloads, hold }) => Ok(Box::new(MockConnection {
                    payloads: payloads.into_iter().map(String::from).collect(),
                    hold,
                })),
                Some(Script::Fail) | None => Err(TransportError::Connect("refused".into())),
            }
        }
    }

    struct MockConnection {
        payloads: VecDeque<String>,
        hold: bool,
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn next_message(&mut self) -> Option<Result<String, TransportError>> {
            if let Some(payload) = self.payloads.pop_front() {
                return Some(Ok(payload));
            }
            if self.hold {
                std::future::pending::<()>().await;
            }
            None
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().clone()
        }
    }

    impl StreamHandler for Recorder {
        fn on_open(&mut self) {
            self.events.lock().push("open".into());
        }

        fn on_message(&mut self, payload: &str) {
            self.events.lock().push(format!("message {}", payload));
        }

        fn on_close(&mut self, reason: &CloseReason) {
            self.events.lock().push(format!("close {:?}", reason));
        }

        fn on_reconnecting(&mut self, attempt: u32) {
            self.events.lock().push(format!("reconnecting {}", attempt));
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_reconnector_budget() {
        let mut reconnector = Reconnector::new(ReconnectPolicy::default());
        for attempt in 1..=10 {
            assert_eq!(
                reconnector.failed(),
                Decision::Retry {
                    attempt,
                    delay: Duration::from_millis(3000)
                }
            );
        }
        assert_eq!(reconnector.failed(), Decision::GiveUp { attempts: 10 });
        assert_eq!(reconnector.failed(), Decision::GiveUp { attempts: 10 });
    }

    #[test]
    fn test_reconnector_resets_on_open() {
        let mut reconnector = Reconnector::new(ReconnectPolicy {
            interval: Duration::from_millis(10),
            max_attempts: 2,
        });
        reconnector.failed();
        reconnector.failed();
        reconnector.opened();
        assert_eq!(reconnector.retries(), 0);
        assert!(matches!(reconnector.failed(), Decision::Retry { attempt: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_ten_failed_retries() {
        let connector = MockConnector::new(vec![]);
        let recorder = Recorder::default();
        let controller =
            ConnectionManager::default().open(connector.clone(), "ws://test", recorder.clone());

        let mut state = controller.subscribe();
        state.wait_for(ConnectionState::is_closed).await.unwrap();

        assert_eq!(
            controller.state(),
            ConnectionState::Closed(CloseReason::Exhausted { attempts: 10 })
        );
        // Initial attempt plus ten retries.
        assert_eq!(connector.attempts(), 11);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 11);

        let events = recorder.events();
        assert_eq!(events.last().unwrap(), "close Exhausted { attempts: 10 }");
        assert_eq!(events.iter().filter(|e| e.starts_with("reconnecting")).count(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_interval_between_attempts() {
        let connector = MockConnector::new(vec![]);
        let _controller =
            ConnectionManager::default().open(connector.clone(), "ws://test", Recorder::default());

        settle().await;
        assert_eq!(connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(2900)).await;
        assert_eq!(connector.attempts(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_order_and_reconnects() {
        let connector = MockConnector::new(vec![
            Script::Open {
                payloads: vec!["a", "b"],
                hold: false,
            },
            Script::Fail,
            Script::Open {
                payloads: vec!["c"],
                hold: true,
            },
        ]);
        let recorder = Recorder::default();
        let controller =
            ConnectionManager::default().open(connector.clone(), "ws://test", recorder.clone());

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(connector.attempts(), 3);
        assert_eq!(controller.state(), ConnectionState::Open);
        assert_eq!(
            recorder.events(),
            vec![
                "open",
                "message a",
                "message b",
                "close Remote",
                "reconnecting 1",
                "reconnecting 2",
                "open",
                "message c",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_count_resets_after_open() {
        // Each open drops immediately, so the budget is never spent.
        let scripts = (0..15)
            .map(|_| Script::Open {
                payloads: vec![],
                hold: false,
            })
            .collect();
        let connector = MockConnector::new(scripts);
        let recorder = Recorder::default();
        let _controller =
            ConnectionManager::default().open(connector.clone(), "ws://test", recorder.clone());

        tokio::time::sleep(Duration::from_secs(3 * 14 + 1)).await;
        assert_eq!(connector.attempts(), 15);
        assert!(recorder
            .events()
            .iter()
            .filter(|e| e.starts_with("reconnecting"))
            .all(|e| e == "reconnecting 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_callbacks_and_reconnects() {
        let connector = MockConnector::new(vec![Script::Open {
            payloads: vec!["a"],
            hold: true,
        }]);
        let recorder = Recorder::default();
        let controller =
            ConnectionManager::default().open(connector.clone(), "ws://test", recorder.clone());

        settle().await;
        assert_eq!(recorder.events(), vec!["open", "message a"]);

        controller.close();
        assert_eq!(
            controller.state(),
            ConnectionState::Closed(CloseReason::Explicit)
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(recorder.events(), vec!["open", "message a"]);

        // Idempotent.
        controller.close();
        assert_eq!(
            controller.state(),
            ConnectionState::Closed(CloseReason::Explicit)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_backoff() {
        let connector = MockConnector::new(vec![]);
        let controller =
            ConnectionManager::default().open(connector.clone(), "ws://test", Recorder::default());

        settle().await;
        assert_eq!(controller.state(), ConnectionState::Reconnecting { attempt: 1 });

        controller.close();
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_closes() {
        let connector = MockConnector::new(vec![]);
        let controller =
            ConnectionManager::default().open(connector.clone(), "ws://test", Recorder::default());
        settle().await;
        drop(controller);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(connector.attempts(), 1);
    }

    #[test]
    fn test_close_reason_display() {
        assert_eq!(
            CloseReason::Exhausted { attempts: 10 }.to_string(),
            "gave up after 10 reconnect attempts"
        );
        assert!(CloseReason::Explicit.is_terminal());
        assert!(!CloseReason::Remote.is_terminal());
    }
}
