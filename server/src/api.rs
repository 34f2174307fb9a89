//! Host-facing surface: starts the network thread and gives the consumer
//! thread a handle for picking up scripts and pushing log lines.

use crate::config::RemoteConfig;
use crate::connection::ConnectionManager;
use crate::context::SharedContext;
use crate::error::RemoteError;
use crate::handoff::{PendingRequest, RequestTicket, ScriptOutcome};
use crate::transport::{TcpTransport, Transport};
use log::{debug, error, info, warn};
use remote_protocol::{ClientSubscriptions, OutboundPacket};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

/// Runs a script payload on the host and reports its outcome.
pub trait ScriptExecutor {
    fn execute_script(&mut self, payload: &[u8]) -> ScriptOutcome;
}

impl<F> ScriptExecutor for F
where
    F: FnMut(&[u8]) -> ScriptOutcome,
{
    fn execute_script(&mut self, payload: &[u8]) -> ScriptOutcome {
        self(payload)
    }
}

/// Owns the network thread. Dropping it shuts the server down.
pub struct RemoteApi {
    context: Arc<SharedContext>,
    network_thread: Option<JoinHandle<()>>,
}

impl RemoteApi {
    /// Starts serving TCP on `config.bind_addr`.
    pub fn start(config: RemoteConfig) -> Result<Self, RemoteError> {
        Self::start_with(TcpTransport, config)
    }

    pub fn start_with<T: Transport>(transport: T, config: RemoteConfig) -> Result<Self, RemoteError> {
        config.validate()?;

        let context = Arc::new(SharedContext::new());
        let manager = ConnectionManager::new(transport, config, Arc::clone(&context));

        let network_thread = std::thread::Builder::new()
            .name("remote-api".into())
            .spawn(move || manager.run())
            .map_err(RemoteError::Spawn)?;

        Ok(Self {
            context,
            network_thread: Some(network_thread),
        })
    }

    pub fn handle(&self) -> RemoteHandle {
        RemoteHandle {
            context: Arc::clone(&self.context),
        }
    }

    /// Address the listener is bound to, once the bind has succeeded
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.context.local_addr()
    }

    /// Stops the network thread and waits for it to close its sockets.
    pub fn shutdown(&mut self) {
        let Some(thread) = self.network_thread.take() else {
            return;
        };
        self.context.request_shutdown();
        if thread.join().is_err() {
            error!("Network thread panicked");
        }
        info!("Remote API shut down");
    }
}

impl Drop for RemoteApi {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Consumer-thread side of the server. Every call returns immediately.
#[derive(Clone)]
pub struct RemoteHandle {
    context: Arc<SharedContext>,
}

impl RemoteHandle {
    pub fn try_take_request(&self) -> Option<PendingRequest> {
        self.context.handoff.try_take_request()
    }

    /// Returns false if the request was abandoned by a reconnect.
    pub fn post_response(&self, ticket: RequestTicket, outcome: ScriptOutcome) -> bool {
        self.context.handoff.post_response(ticket, outcome)
    }

    /// Runs at most one pending script through `executor`.
    ///
    /// Call once per consumer frame. Returns true if a script was executed.
    pub fn process_command(&self, executor: &mut dyn ScriptExecutor) -> bool {
        let Some(request) = self.try_take_request() else {
            return false;
        };

        debug!("Executing remote script of {} bytes", request.payload.len());
        let outcome = executor.execute_script(&request.payload);
        if !self.post_response(request.ticket, outcome) {
            debug!("Client went away before the script finished; result dropped");
        }
        true
    }

    /// Queues a log line for a client that subscribed to logging.
    ///
    /// Returns false when nobody is listening or the packet could not be
    /// built.
    pub fn send_log(&self, message: &[u8]) -> bool {
        if !self.context.is_connected() || !self.context.subscriptions().logging {
            return false;
        }
        match OutboundPacket::log_message(message) {
            Ok(packet) => {
                self.context.outbound.enqueue(packet);
                true
            }
            Err(e) => {
                warn!("Dropping log message: {}", e);
                false
            }
        }
    }

    pub fn subscriptions(&self) -> ClientSubscriptions {
        self.context.subscriptions()
    }

    pub fn is_connected(&self) -> bool {
        self.context.is_connected()
    }
}
