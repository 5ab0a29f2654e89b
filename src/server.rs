//! Server runtime.
//!
//! The [`Server`] wires the audit ledger, player registry, notification hub,
//! round engine and WebSocket transport together and tears them down in
//! order when cancelled.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::GameConfig;
use crate::engine::{self, EngineParts};
use crate::error::SkirmishError;
use crate::ledger::{AuditLedger, LedgerTasks};
use crate::players::PlayerRegistry;
use crate::transport::{self, AppState, BroadcastHub};

/// Options for constructing a [`Server`].
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Frozen configuration, CLI overrides already applied
    pub config: Arc<GameConfig>,
    /// Largest accepted inbound frame
    pub max_frame_size: usize,
    /// Token for cooperative shutdown
    pub cancel: CancellationToken,
}

impl ServerOptions {
    /// Options with the default frame limit.
    #[must_use]
    pub fn new(config: Arc<GameConfig>, cancel: CancellationToken) -> Self {
        Self {
            config,
            max_frame_size: transport::max_frame_size(),
            cancel,
        }
    }
}

/// A bound, not yet running game server.
#[derive(Debug)]
pub struct Server {
    opts: ServerOptions,
    listener: TcpListener,
    local_addr: SocketAddr,
    journal: AuditLedger,
    ledger_tasks: LedgerTasks,
}

impl Server {
    /// Opens the audit ledger and binds the listener.
    ///
    /// # Errors
    ///
    /// Returns a ledger error if the block file cannot be opened, or a
    /// transport error if the address is invalid or cannot be bound.
    pub async fn bind(opts: ServerOptions) -> Result<Self, SkirmishError> {
        let listener = transport::bind(&opts.config.server.bind).await?;
        let local_addr = listener.local_addr().map_err(crate::error::TransportError::from)?;
        let (journal, ledger_tasks) = AuditLedger::start(&opts.config.ledger)?;
        Ok(Self {
            opts,
            listener,
            local_addr,
            journal,
            ledger_tasks,
        })
    }

    /// Address actually bound; differs from the configured one for port 0.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves until the cancellation token fires, then stops the engine,
    /// seals pending journal entries and drains the ledger writer.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the listener fails.
    pub async fn run(self) -> Result<(), SkirmishError> {
        let config = Arc::clone(&self.opts.config);
        let players = Arc::new(PlayerRegistry::new(&config.players));
        let hub = Arc::new(BroadcastHub::new());

        let engine_cancel = CancellationToken::new();
        let (engine, engine_task) = engine::spawn(
            EngineParts {
                config: Arc::clone(&config),
                players: Arc::clone(&players),
                notifier: hub.clone(),
                journal: self.journal.clone(),
            },
            engine_cancel.clone(),
        );

        let state = Arc::new(AppState {
            engine,
            players,
            hub,
            heartbeat: config.server.heartbeat,
            max_frame_size: self.opts.max_frame_size,
            cancel: self.opts.cancel.clone(),
        });

        info!(
            addr = %self.local_addr,
            strategy = ?config.battle.strategy,
            sides = config.sides.len(),
            "skirmish server started"
        );
        let served = transport::serve(self.listener, state).await;

        engine_cancel.cancel();
        if let Err(e) = engine_task.await {
            warn!(error = %e, "engine task failed");
        }
        self.ledger_tasks.shutdown(&self.journal).await;
        info!("skirmish server stopped");

        served.map_err(SkirmishError::from)
    }
}
