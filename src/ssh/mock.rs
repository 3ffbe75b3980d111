//! Scripted transport for session tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

use super::transport::{ChannelEvent, ShellChannel, ShellRequest, Transport, WindowSize};
use super::AuthMethod;
use crate::error::SessionError;

/// What the fake remote does during the handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Behavior {
    Accept,
    RefuseConnection,
    RejectAuth,
    FailShell,
    /// `connect` never completes.
    HangOnConnect,
    /// Handshake succeeds, every channel write fails.
    FailWrites,
}

/// Something the session did to the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ChannelOp {
    Write(Vec<u8>),
    WindowChange(WindowSize),
    Close,
}

/// Test-side view of the fake remote.
pub(crate) struct MockRemote {
    incoming: mpsc::UnboundedSender<ChannelEvent>,
    ops: Arc<Mutex<Vec<ChannelOp>>>,
    shell_requests: Arc<Mutex<Vec<ShellRequest>>>,
    disconnects: Arc<AtomicUsize>,
}

impl MockRemote {
    /// Queue an event for the session to receive.
    pub(crate) fn push(&self, event: ChannelEvent) {
        let _ = self.incoming.send(event);
    }

    pub(crate) fn ops(&self) -> Vec<ChannelOp> {
        self.ops.lock().unwrap().clone()
    }

    pub(crate) fn ops_handle(&self) -> Arc<Mutex<Vec<ChannelOp>>> {
        Arc::clone(&self.ops)
    }

    pub(crate) fn shell_requests(&self) -> Vec<ShellRequest> {
        self.shell_requests.lock().unwrap().clone()
    }

    pub(crate) fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub(crate) async fn wait_for_disconnect(&self) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while self.disconnects() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("transport was never disconnected");
    }
}

struct MockTransport {
    behavior: Behavior,
    gate: Option<Arc<Notify>>,
    incoming: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    ops: Arc<Mutex<Vec<ChannelOp>>>,
    shell_requests: Arc<Mutex<Vec<ShellRequest>>>,
    disconnects: Arc<AtomicUsize>,
}

pub(crate) fn transport(behavior: Behavior) -> (Box<dyn Transport>, MockRemote) {
    build(behavior, None)
}

/// An accepting transport whose `connect` waits for the returned gate.
pub(crate) fn gated_transport() -> (Box<dyn Transport>, MockRemote, Arc<Notify>) {
    let gate = Arc::new(Notify::new());
    let (transport, remote) = build(Behavior::Accept, Some(Arc::clone(&gate)));
    (transport, remote, gate)
}

fn build(behavior: Behavior, gate: Option<Arc<Notify>>) -> (Box<dyn Transport>, MockRemote) {
    let (tx, rx) = mpsc::unbounded_channel();
    let ops = Arc::new(Mutex::new(Vec::new()));
    let shell_requests = Arc::new(Mutex::new(Vec::new()));
    let disconnects = Arc::new(AtomicUsize::new(0));
    let transport = MockTransport {
        behavior,
        gate,
        incoming: Some(rx),
        ops: Arc::clone(&ops),
        shell_requests: Arc::clone(&shell_requests),
        disconnects: Arc::clone(&disconnects),
    };
    let remote = MockRemote {
        incoming: tx,
        ops,
        shell_requests,
        disconnects,
    };
    (Box::new(transport), remote)
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, host: &str, port: u16) -> Result<(), SessionError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        match self.behavior {
            Behavior::RefuseConnection => Err(SessionError::Connection {
                host: host.to_string(),
                port,
                reason: "connection refused".to_string(),
            }),
            Behavior::HangOnConnect => std::future::pending().await,
            _ => Ok(()),
        }
    }

    async fn authenticate(&mut self, auth: &AuthMethod) -> Result<(), SessionError> {
        match self.behavior {
            Behavior::RejectAuth => Err(SessionError::Authentication {
                username: auth.username().to_string(),
                reason: "credentials rejected by server".to_string(),
            }),
            _ => Ok(()),
        }
    }

    async fn open_shell(
        &mut self,
        request: &ShellRequest,
    ) -> Result<Box<dyn ShellChannel>, SessionError> {
        self.shell_requests.lock().unwrap().push(request.clone());
        if self.behavior == Behavior::FailShell {
            return Err(SessionError::Channel("administratively prohibited".to_string()));
        }
        let incoming = self
            .incoming
            .take()
            .ok_or_else(|| SessionError::Channel("shell already opened".to_string()))?;
        Ok(Box::new(MockChannel {
            incoming,
            ops: Arc::clone(&self.ops),
            fail_writes: self.behavior == Behavior::FailWrites,
        }))
    }

    async fn disconnect(&mut self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

struct MockChannel {
    incoming: mpsc::UnboundedReceiver<ChannelEvent>,
    ops: Arc<Mutex<Vec<ChannelOp>>>,
    fail_writes: bool,
}

#[async_trait]
impl ShellChannel for MockChannel {
    async fn recv(&mut self) -> ChannelEvent {
        self.incoming.recv().await.unwrap_or(ChannelEvent::Closed)
    }

    async fn write(&mut self, data: &[u8]) -> Result<(), SessionError> {
        if self.fail_writes {
            return Err(SessionError::Channel("broken pipe".to_string()));
        }
        self.ops.lock().unwrap().push(ChannelOp::Write(data.to_vec()));
        Ok(())
    }

    async fn window_change(&mut self, window: WindowSize) -> Result<(), SessionError> {
        self.ops.lock().unwrap().push(ChannelOp::WindowChange(window));
        Ok(())
    }

    async fn close(&mut self) {
        self.ops.lock().unwrap().push(ChannelOp::Close);
    }
}
