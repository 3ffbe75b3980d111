use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use super::client::RusshTransport;
use super::transport::{ChannelEvent, ShellChannel, ShellRequest, Transport, WindowSize};
use super::{ConnectionProfile, Session};
use crate::config::SessionSettings;
use crate::error::SessionError;
use crate::events::{EventBridge, SubscriptionId, TerminalEvent, TERMINAL_TOPIC};
use crate::registry::SessionRegistry;
use crate::terminal::{TerminalBuffer, TerminalSize};

/// Lifecycle of a transport session.
///
/// `Idle → Connecting → Authenticating → ShellStarting → Connected →
/// Closing → Closed`; `Failed` ends an attempt that never got a shell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Connecting,
    Authenticating,
    ShellStarting,
    Connected,
    Closing,
    Closed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Failed)
    }

    fn is_connecting(&self) -> bool {
        matches!(
            self,
            SessionState::Connecting | SessionState::Authenticating | SessionState::ShellStarting
        )
    }
}

enum Command {
    Send(Vec<u8>),
    Resize(TerminalSize),
    Dispose,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the session handle and its driver task.
struct Shared {
    state: Mutex<SessionState>,
    size: Mutex<TerminalSize>,
    session: Mutex<Option<Session>>,
    events: EventBridge<TerminalEvent>,
    screen: TerminalBuffer,
    registry: OnceLock<Arc<SessionRegistry>>,
    closed: AtomicBool,
}

impl Shared {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn set_state(&self, state: SessionState) {
        let mut current = lock(&self.state);
        log::debug!("Session state {:?} -> {:?}", *current, state);
        *current = state;
    }

    fn emit(&self, event: TerminalEvent) {
        self.events.emit(TERMINAL_TOPIC, &event);
    }

    /// Enter a terminal state and emit the one `closed` event.
    fn finish(&self, state: SessionState, error: Option<SessionError>) {
        self.set_state(state);
        let session = lock(&self.session).take();
        if let (Some(session), Some(registry)) = (session, self.registry.get()) {
            registry.remove(&session.id);
        }
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.emit(TerminalEvent::Closed { error });
        self.events.clear(TERMINAL_TOPIC);
    }
}

struct Control {
    transport: Option<Box<dyn Transport>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    disposed: bool,
}

/// One remote shell connection and its screen.
///
/// A single driver task, spawned by [`connect`](Self::connect), owns the
/// transport and the channel and performs every state transition. `send`,
/// `resize` and `dispose` queue commands to it in FIFO order, so input
/// written before a resize reaches the channel before the window change.
/// Events are emitted from the driver task on [`TERMINAL_TOPIC`] in order:
/// `connected`, then `data`/`resized`, then exactly one `closed`.
pub struct TransportSession {
    settings: SessionSettings,
    shared: Arc<Shared>,
    control: Mutex<Control>,
}

impl TransportSession {
    /// Session over SSH.
    pub fn new(settings: SessionSettings) -> Self {
        let transport = Box::new(RusshTransport::new(&settings));
        Self::with_transport(settings, transport)
    }

    pub fn with_transport(settings: SessionSettings, transport: Box<dyn Transport>) -> Self {
        let size = TerminalSize::default();
        let shared = Shared {
            state: Mutex::new(SessionState::Idle),
            size: Mutex::new(size),
            session: Mutex::new(None),
            events: EventBridge::new(),
            screen: TerminalBuffer::new(size, settings.scrollback_limit),
            registry: OnceLock::new(),
            closed: AtomicBool::new(false),
        };
        Self {
            settings,
            shared: Arc::new(shared),
            control: Mutex::new(Control {
                transport: Some(transport),
                commands: None,
                disposed: false,
            }),
        }
    }

    /// Record the live session in `registry` while connected.
    pub fn with_registry(self, registry: Arc<SessionRegistry>) -> Self {
        if self.shared.registry.set(registry).is_err() {
            log::warn!("Session registry already attached");
        }
        self
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Last size applied to both the channel and the screen.
    pub fn size(&self) -> TerminalSize {
        *lock(&self.shared.size)
    }

    /// The live session, if the shell is up.
    pub fn session(&self) -> Option<Session> {
        let state = self.state();
        lock(&self.shared.session).clone().map(|mut session| {
            session.status = state;
            session
        })
    }

    /// Shared handle to the screen fed by this session.
    pub fn screen(&self) -> TerminalBuffer {
        self.shared.screen.clone()
    }

    pub fn events(&self) -> &EventBridge<TerminalEvent> {
        &self.shared.events
    }

    /// Subscribe to this session's [`TerminalEvent`]s.
    pub fn on_event<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&TerminalEvent) + Send + Sync + 'static,
    {
        self.shared.events.subscribe(TERMINAL_TOPIC, handler)
    }

    pub fn off_event(&self, id: SubscriptionId) -> bool {
        self.shared.events.unsubscribe(TERMINAL_TOPIC, id)
    }

    /// Connect, authenticate and open a shell sized to `size`.
    ///
    /// Resolves once the shell is up (and the auto-attach command, if any,
    /// has been written) or the attempt failed. Only valid from `Idle`.
    /// `dispose()` while this is pending resolves it with
    /// [`SessionError::Disposed`].
    pub async fn connect(
        &self,
        profile: &ConnectionProfile,
        size: TerminalSize,
    ) -> Result<(), SessionError> {
        let outcome = {
            let mut control = lock(&self.control);
            let state = self.shared.state();
            if control.disposed || state != SessionState::Idle {
                return Err(SessionError::InvalidState(state));
            }
            profile.validate()?;
            size.validate()?;
            let transport = control
                .transport
                .take()
                .ok_or(SessionError::InvalidState(state))?;

            *lock(&self.shared.size) = size;
            self.shared.screen.resize(size);
            self.shared.set_state(SessionState::Connecting);

            let (command_tx, command_rx) = mpsc::unbounded_channel();
            let (outcome_tx, outcome_rx) = oneshot::channel();
            control.commands = Some(command_tx);

            let driver = Driver {
                shared: Arc::clone(&self.shared),
                settings: self.settings.clone(),
                transport,
                commands: command_rx,
                profile: profile.clone(),
                size,
            };
            tokio::spawn(driver.run(outcome_tx));
            outcome_rx
        };

        log::info!("Connecting to {}", profile.target());
        outcome.await.unwrap_or_else(|_| {
            Err(SessionError::Channel(
                "session task ended unexpectedly".to_string(),
            ))
        })
    }

    /// Write raw bytes to the shell. No-op unless connected.
    pub fn send(&self, input: impl AsRef<[u8]>) {
        if !self.is_connected() {
            log::debug!("Dropping input while {:?}", self.state());
            return;
        }
        if let Some(commands) = &lock(&self.control).commands {
            let _ = commands.send(Command::Send(input.as_ref().to_vec()));
        }
    }

    /// Send `command` followed by a newline.
    pub fn run_command(&self, command: &str) {
        self.send(format!("{}\n", command));
    }

    /// Resize the remote window and the screen.
    ///
    /// While connecting the request is queued and applied once the shell is
    /// up. Fails with `InvalidState` when there is no connection to resize.
    pub fn resize(&self, size: TerminalSize) -> Result<(), SessionError> {
        size.validate()?;
        let state = self.state();
        if !(state.is_connecting() || state == SessionState::Connected) {
            return Err(SessionError::InvalidState(state));
        }
        match &lock(&self.control).commands {
            Some(commands) if commands.send(Command::Resize(size)).is_ok() => Ok(()),
            _ => Err(SessionError::InvalidState(self.state())),
        }
    }

    /// Close the session. Only the first call has an effect.
    pub fn dispose(&self) {
        let mut control = lock(&self.control);
        if control.disposed {
            return;
        }
        control.disposed = true;

        if let Some(commands) = control.commands.take() {
            // The driver closes the channel and emits `closed`.
            let _ = commands.send(Command::Dispose);
            return;
        }

        control.transport = None;
        drop(control);
        if self.shared.state() == SessionState::Idle {
            log::debug!("Disposing idle session");
            self.shared.finish(SessionState::Closed, None);
        }
    }
}

impl Drop for TransportSession {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// The task that owns the connection.
struct Driver {
    shared: Arc<Shared>,
    settings: SessionSettings,
    transport: Box<dyn Transport>,
    commands: mpsc::UnboundedReceiver<Command>,
    profile: ConnectionProfile,
    size: TerminalSize,
}

impl Driver {
    async fn run(mut self, outcome: oneshot::Sender<Result<(), SessionError>>) {
        let mut pending_resizes = Vec::new();
        let handshake_result = {
            let handshake = handshake(
                self.transport.as_mut(),
                &self.shared,
                &self.settings,
                &self.profile,
                self.size,
            );
            tokio::pin!(handshake);
            loop {
                tokio::select! {
                    biased;
                    command = self.commands.recv() => match command {
                        Some(Command::Resize(size)) => pending_resizes.push(size),
                        Some(Command::Send(_)) => {}
                        Some(Command::Dispose) | None => break None,
                    },
                    result = &mut handshake => break Some(result),
                }
            }
        };

        let mut channel = match handshake_result {
            Some(Ok(channel)) => channel,
            Some(Err(error)) => {
                log::warn!("Connecting to {} failed: {}", self.profile.target(), error);
                self.transport.disconnect().await;
                self.shared
                    .finish(SessionState::Failed, Some(error.clone()));
                let _ = outcome.send(Err(error));
                return;
            }
            None => {
                log::info!("Disposed while connecting to {}", self.profile.target());
                self.transport.disconnect().await;
                self.shared.finish(SessionState::Closed, None);
                let _ = outcome.send(Err(SessionError::Disposed));
                return;
            }
        };

        self.shared.set_state(SessionState::Connected);
        let session = Session::new(self.profile.clone());
        if let Some(registry) = self.shared.registry.get() {
            registry.add(session.clone());
        }
        log::info!("Shell open on {} (session {})", self.profile.target(), session.id);
        *lock(&self.shared.session) = Some(session);
        self.shared.emit(TerminalEvent::Connected);

        if let Some(command) = &self.profile.tmux_attach {
            let line = format!("{}\n", command);
            if let Err(e) = channel.write(line.as_bytes()).await {
                log::warn!("Auto-attach command failed: {}", e);
            }
        }
        let _ = outcome.send(Ok(()));

        for size in pending_resizes {
            self.apply_resize(channel.as_mut(), size).await;
        }

        let error = self.pump(channel.as_mut()).await;

        self.shared.set_state(SessionState::Closing);
        channel.close().await;
        self.transport.disconnect().await;
        log::info!("Session with {} closed", self.profile.target());
        self.shared.finish(SessionState::Closed, error);
    }

    /// Shuttle bytes and commands until the channel closes, a write fails
    /// or the session is disposed. Returns the failure, if any.
    async fn pump(&mut self, channel: &mut dyn ShellChannel) -> Option<SessionError> {
        loop {
            tokio::select! {
                event = channel.recv() => match event {
                    ChannelEvent::Data(bytes) => {
                        self.shared.screen.feed(&bytes);
                        self.shared.emit(TerminalEvent::Data { payload: bytes });
                    }
                    ChannelEvent::Stderr(bytes) => {
                        log::debug!("ssh stderr: {}", String::from_utf8_lossy(&bytes));
                    }
                    ChannelEvent::Closed => {
                        log::info!("Remote closed the shell channel");
                        return None;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Send(bytes)) => {
                        if let Err(e) = channel.write(&bytes).await {
                            log::warn!("Write to shell channel failed: {}", e);
                            return Some(e);
                        }
                    }
                    Some(Command::Resize(size)) => self.apply_resize(channel, size).await,
                    Some(Command::Dispose) | None => return None,
                },
            }
        }
    }

    async fn apply_resize(&self, channel: &mut dyn ShellChannel, size: TerminalSize) {
        let window = WindowSize::new(size, &self.settings);
        if let Err(e) = channel.window_change(window).await {
            log::warn!("Window change to {}x{} failed: {}", size.cols, size.rows, e);
        }
        *lock(&self.shared.size) = size;
        self.shared.screen.resize(size);
        log::debug!("Resized to {}x{}", size.cols, size.rows);
        self.shared.emit(TerminalEvent::Resized { size });
    }
}

/// Network connect (bounded by the connect timeout), authentication and
/// shell setup.
async fn handshake(
    transport: &mut dyn Transport,
    shared: &Shared,
    settings: &SessionSettings,
    profile: &ConnectionProfile,
    size: TerminalSize,
) -> Result<Box<dyn ShellChannel>, SessionError> {
    let timeout = settings.connect_timeout();
    match tokio::time::timeout(timeout, transport.connect(&profile.host, profile.port)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(SessionError::Connection {
                host: profile.host.clone(),
                port: profile.port,
                reason: format!("timed out after {:?}", timeout),
            })
        }
    }

    shared.set_state(SessionState::Authenticating);
    transport.authenticate(&profile.auth).await?;

    shared.set_state(SessionState::ShellStarting);
    let request = ShellRequest {
        term: settings.term.clone(),
        window: WindowSize::new(size, settings),
    };
    transport.open_shell(&request).await
}
