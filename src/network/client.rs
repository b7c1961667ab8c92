//! Connection manager: session lifecycle, reconnection, outbound pacing.
//!
//! States: Idle -> Connecting -> Authenticated -> Joined, with disconnects
//! looping back through a fresh `start()`. Idle and Disconnected are both
//! "no session in the slot"; everything per-connection (transport handle,
//! state, the one-shot welcome flag, the keep-alive task) lives in the
//! [`Session`] and is rebuilt on every connect, so a retried `start()` can
//! never observe half-initialized leftovers.

use super::transport::{Transport, TransportEvent};
use crate::commands::Outbound;
use crate::config::Config;
use crate::error::SendError;
use crate::events::{ChatEvent, EventRegistry, ON_QUIT};
use crate::gate::SendGate;
use crate::scheduler::{Scheduler, TaskHandle};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use stray_proto::{Message, RELAY_MAX_LINE};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One second past the rolling window, so a released slot can never beat
/// the window's own expiry.
const BUDGET_RELEASE_SECS: u64 = 31;

/// Where the current session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Transport open, handshake sent, waiting for the welcome.
    Connecting,
    /// Welcome received.
    Authenticated,
    /// Channel joins issued.
    Joined,
}

/// Per-connection state. Destroyed and rebuilt on every reconnect.
struct Session {
    transport: Transport,
    state: SessionState,
    /// One-shot guard: a duplicate welcome must not re-run the join and
    /// announcement sequence.
    welcomed: bool,
    keepalive: TaskHandle,
}

/// The connection manager.
pub struct Client {
    host: String,
    port: u16,
    tls: bool,
    nick: String,
    pass: String,
    greeting: Option<String>,
    farewell: String,
    keepalive_period: Duration,
    retry_delay: Duration,

    scheduler: Arc<Scheduler>,
    events: Arc<EventRegistry>,
    gate: SendGate,
    session: Mutex<Option<Session>>,
    /// Channels to (re)join, growing as `join` is used at runtime.
    channels: Mutex<Vec<String>>,
    event_tx: mpsc::Sender<TransportEvent>,
    generation: AtomicU64,
    shutdown: CancellationToken,
    weak_self: Weak<Client>,
}

impl Client {
    pub fn new(
        config: &Config,
        scheduler: Arc<Scheduler>,
        events: Arc<EventRegistry>,
        event_tx: mpsc::Sender<TransportEvent>,
    ) -> Arc<Self> {
        let mut channels = Vec::new();
        if !config.bot.channel.is_empty() {
            channels.push(config.bot.channel.clone());
        }

        Arc::new_cyclic(|weak_self| Self {
            host: config.server.host.clone(),
            port: config.server.port,
            tls: config.server.tls,
            nick: config.server.nick.clone(),
            pass: config.server.pass.clone(),
            greeting: config.bot.greeting.clone(),
            farewell: config.bot.farewell.clone(),
            keepalive_period: Duration::from_secs(config.limits.keepalive_secs),
            retry_delay: Duration::from_secs(config.limits.retry_delay_secs),
            scheduler,
            events,
            gate: SendGate::new(
                config.limits.privmsg_per_30,
                Duration::from_secs(config.limits.control_interval_secs),
            ),
            session: Mutex::new(None),
            channels: Mutex::new(channels),
            event_tx,
            generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
            weak_self: weak_self.clone(),
        })
    }

    /// Cancelled when `quit` is called; the run loop selects on this.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Current session state, if a session is open.
    #[allow(dead_code)] // diagnostics surface
    pub fn session_state(&self) -> Option<SessionState> {
        self.session.lock().as_ref().map(|s| s.state)
    }

    fn this(&self) -> Option<Arc<Client>> {
        self.weak_self.upgrade()
    }

    /// Open a connection and send the credential handshake.
    ///
    /// Control-gated: a denied reservation propagates so callers pace
    /// themselves. A transport failure is recovered here - partial state is
    /// cleared and a retry scheduled - so the returned `Ok` means "started
    /// or retrying", never "half-connected".
    pub async fn start(&self) -> Result<(), SendError> {
        if !self.gate.try_reserve_control() {
            return Err(SendError::RateLimited);
        }
        assert!(
            self.session.lock().is_none(),
            "start() called while a session is active"
        );

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let transport = match Transport::connect(
            &self.host,
            self.port,
            self.tls,
            generation,
            self.event_tx.clone(),
        )
        .await
        {
            Ok(transport) => transport,
            Err(e) => {
                error!(
                    error = %e,
                    retry_secs = self.retry_delay.as_secs(),
                    "failed to open connection, retrying"
                );
                self.schedule_restart();
                return Ok(());
            }
        };

        if let Err(e) = transport
            .send(&Message::pass(self.pass.as_str()))
            .and_then(|_| transport.send(&Message::nick(self.nick.as_str())))
        {
            // The disconnect notification will drive the retry.
            warn!(code = e.error_code(), "credential handshake failed");
        }

        let keepalive = self.spawn_keepalive();
        *self.session.lock() = Some(Session {
            transport,
            state: SessionState::Connecting,
            welcomed: false,
            keepalive,
        });
        info!(host = %self.host, port = self.port, "connection opened, authenticating");
        Ok(())
    }

    /// Send a chat message.
    ///
    /// With no session or an exhausted budget the message is deferred, not
    /// dropped: a retry is scheduled and re-attempts for as long as the
    /// client is alive. Only protocol violations propagate.
    pub fn privmsg(&self, channel: &str, text: &str) -> Result<(), SendError> {
        let send_result = {
            let session = self.session.lock();
            match &*session {
                None => Err(SendError::NotConnected),
                Some(session) => {
                    if !self.gate.try_reserve() {
                        Err(SendError::RateLimited)
                    } else {
                        session
                            .transport
                            .send(&Message::privmsg(channel, text))
                            .inspect_err(|_| self.gate.release())
                    }
                }
            }
        };

        match send_result {
            Ok(()) => {
                self.schedule_budget_release();
                Ok(())
            }
            Err(e @ SendError::Protocol(_)) => Err(e),
            Err(e) => {
                warn!(
                    code = e.error_code(),
                    channel = %channel,
                    retry_secs = self.retry_delay.as_secs(),
                    "cannot send right now, delaying message"
                );
                self.defer_privmsg(channel, text);
                Ok(())
            }
        }
    }

    /// Join a channel and remember it for future reconnects.
    ///
    /// Control-gated like `start`; denial propagates to the caller.
    pub fn join(&self, channel: &str) -> Result<(), SendError> {
        if !self.gate.try_reserve_control() {
            return Err(SendError::RateLimited);
        }

        let session = self.session.lock();
        let Some(session) = &*session else {
            return Err(SendError::NotConnected);
        };
        session.transport.send(&Message::join(channel))?;

        let mut channels = self.channels.lock();
        if !channels.iter().any(|c| c == channel) {
            channels.push(channel.to_string());
        }
        info!(channel = %channel, "joined channel");
        Ok(())
    }

    /// Answer a server PING. Not budget-counted; the relay expects this
    /// regardless of our own pacing.
    pub fn pong(&self, token: &str) {
        let session = self.session.lock();
        if let Some(session) = &*session {
            if let Err(e) = session.transport.send(&Message::pong(token)) {
                debug!(code = e.error_code(), "pong failed");
            }
        }
    }

    /// Handle the server's welcome acknowledgment.
    ///
    /// Idempotent per session: the one-shot flag is reset only on a fresh
    /// `Connecting` entry, so a duplicate welcome neither re-joins nor
    /// re-announces.
    pub fn handle_welcome(&self) {
        {
            let mut session = self.session.lock();
            let Some(session) = session.as_mut() else {
                debug!("welcome without a session, ignoring");
                return;
            };
            if session.welcomed {
                debug!("duplicate welcome ignored");
                return;
            }
            session.welcomed = true;
            session.state = SessionState::Authenticated;
            info!("connected and authenticated with the relay");

            // Re-join everything we track, comma-joined into as few frames
            // as the transport allows. Joins issued during the welcome are
            // part of the handshake and bypass the control gate.
            let channels = self.channels.lock().clone();
            for group in chunk_channels(&channels, RELAY_MAX_LINE) {
                if let Err(e) = session.transport.send(&Message::join(group)) {
                    warn!(code = e.error_code(), "channel join failed");
                }
            }
            session.state = SessionState::Joined;
        }

        // Announce after releasing the session lock; privmsg takes it again.
        if let Some(greeting) = self.greeting.clone() {
            let home = self.channels.lock().first().cloned();
            if let Some(home) = home {
                let _ = self.privmsg(&home, &greeting);
            }
        }
    }

    /// Handle a transport disconnect notification.
    ///
    /// Generation-checked: a late notification from an already-replaced
    /// connection is ignored. Cancels the keep-alive, clears the session and
    /// reconnects immediately, paced only by the control gate.
    pub async fn handle_disconnect(&self, generation: u64, reason: &str) {
        {
            let mut session = self.session.lock();
            let is_current = matches!(
                &*session,
                Some(current) if current.transport.generation() == generation
            );
            if !is_current {
                debug!(generation, "stale disconnect notification ignored");
                return;
            }
            error!(reason = %reason, "disconnected from the relay");
            if let Some(dead) = session.take() {
                dead.keepalive.cancel();
            }
        }

        if self.shutdown.is_cancelled() {
            return;
        }
        if let Err(e) = self.start().await {
            debug!(code = e.error_code(), "immediate reconnect deferred");
            self.schedule_restart();
        }
    }

    /// Shut down: fire `on_quit` (all handlers run, errors isolated), send
    /// a best-effort farewell, stop the scheduler without waiting, and
    /// release the run loop.
    pub fn quit(&self) {
        info!("shutting down");
        self.events.trigger(ON_QUIT, false, &ChatEvent::Quit);

        {
            let mut session = self.session.lock();
            if let Some(session) = &*session {
                if let Err(e) = session.transport.send(&Message::quit(self.farewell.as_str())) {
                    warn!(code = e.error_code(), "farewell failed");
                }
                session.keepalive.cancel();
            }
            *session = None;
        }

        self.scheduler.shutdown();
        self.shutdown.cancel();
    }

    fn spawn_keepalive(&self) -> TaskHandle {
        let client = self.weak_self.clone();
        self.scheduler.execute_every(
            self.keepalive_period,
            Some(Duration::from_secs(1)),
            "keepalive",
            move || {
                let client = client.clone();
                async move {
                    if let Some(client) = client.upgrade() {
                        client.send_ping();
                    }
                    Ok(())
                }
            },
        )
    }

    /// Send the keep-alive ping. Failures are swallowed: the transport's
    /// disconnect notification is the sole authority on session death.
    fn send_ping(&self) {
        let session = self.session.lock();
        if let Some(session) = &*session {
            if let Err(e) = session.transport.send(&Message::ping(self.host.as_str())) {
                debug!(code = e.error_code(), "keep-alive ping failed");
            }
        }
    }

    fn schedule_restart(&self) {
        let Some(client) = self.this() else { return };
        self.scheduler
            .execute_delayed(self.retry_delay, "reconnect", move || async move {
                if let Err(e) = client.start().await {
                    debug!(code = e.error_code(), "reconnect attempt deferred");
                    client.schedule_restart();
                }
                Ok(())
            });
    }

    fn defer_privmsg(&self, channel: &str, text: &str) {
        let Some(client) = self.this() else { return };
        let channel = channel.to_string();
        let text = text.to_string();
        self.scheduler
            .execute_delayed(self.retry_delay, "privmsg-retry", move || async move {
                let _ = client.privmsg(&channel, &text);
                Ok(())
            });
    }

    fn schedule_budget_release(&self) {
        let Some(client) = self.this() else { return };
        self.scheduler.execute_delayed(
            Duration::from_secs(BUDGET_RELEASE_SECS),
            "budget-release",
            move || async move {
                client.gate.release();
                Ok(())
            },
        );
    }
}

impl Outbound for Client {
    fn privmsg(&self, channel: &str, text: &str) -> Result<(), SendError> {
        Client::privmsg(self, channel, text)
    }

    fn join_channel(&self, channel: &str) -> Result<(), SendError> {
        Client::join(self, channel)
    }

    fn request_quit(&self) {
        Client::quit(self);
    }
}

/// Comma-join channels into the fewest frames that fit the line limit.
fn chunk_channels(channels: &[String], max_line: usize) -> Vec<String> {
    // "JOIN " plus the CR-LF terminator.
    let budget = max_line.saturating_sub(7);
    let mut groups = Vec::new();
    let mut current = String::new();

    for channel in channels {
        if current.is_empty() {
            current.clone_from(channel);
        } else if current.len() + 1 + channel.len() <= budget {
            current.push(',');
            current.push_str(channel);
        } else {
            groups.push(std::mem::take(&mut current));
            current.clone_from(channel);
        }
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chans(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn chunk_channels_joins_everything_into_one_frame_when_it_fits() {
        let groups = chunk_channels(&chans(&["#a", "#b", "#c"]), RELAY_MAX_LINE);
        assert_eq!(groups, vec!["#a,#b,#c"]);
    }

    #[test]
    fn chunk_channels_splits_at_the_frame_limit() {
        // Budget of 13 bytes for the list itself (20 - "JOIN " - CRLF).
        let groups = chunk_channels(&chans(&["#aaaa", "#bbbb", "#cc"]), 20);
        assert_eq!(groups, vec!["#aaaa,#bbbb", "#cc"]);
    }

    #[test]
    fn chunk_channels_handles_empty_input() {
        assert!(chunk_channels(&[], RELAY_MAX_LINE).is_empty());
    }

    #[tokio::test]
    async fn welcome_and_disconnect_without_a_session_are_ignored() {
        let config = Config::default();
        let scheduler = Arc::new(Scheduler::new());
        let events = Arc::new(EventRegistry::new());
        let (tx, _rx) = mpsc::channel(16);
        let client = Client::new(&config, scheduler, events, tx);

        client.handle_welcome();
        client.handle_disconnect(1, "nothing was connected").await;
        assert_eq!(client.session_state(), None);
    }
}
