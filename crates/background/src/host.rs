//! Background host: accepts worker connections and serves them.

use crate::{events, BackgroundContext, BackgroundResult};
use extension_port::{Envelope, ErrorPayload, MessageName, Pipe, Port, TabId, WorkerRole};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::net::UnixListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

/// Listens on a Unix socket; every connection becomes a worker port.
pub struct BackgroundHost {
    ctx: BackgroundContext,
    socket_path: PathBuf,
    shutdown_tx: broadcast::Sender<()>,
}

impl BackgroundHost {
    pub fn new(ctx: BackgroundContext, socket_path: impl Into<PathBuf>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            ctx,
            socket_path: socket_path.into(),
            shutdown_tx,
        }
    }

    pub fn context(&self) -> &BackgroundContext {
        &self.ctx
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Wrap `pipe` in a port carrying the registration handler and every
    /// background listener.
    pub fn accept_pipe(&self, pipe: Pipe, label: impl Into<String>) -> Port {
        serve(&self.ctx, pipe, label)
    }

    /// Accept connections until shutdown.
    pub async fn run(&self) -> BackgroundResult<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        if let Some(parent) = self.socket_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = %self.socket_path.display(), "Background host listening");

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut connections: u64 = 0;

        loop {
            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, _)) => {
                            connections += 1;
                            let label = format!("conn-{connections}");
                            debug!(label = %label, "Worker connected");
                            serve(&self.ctx, Pipe::from_stream(stream), label);
                        }
                        Err(e) => {
                            error!(error = %e, "Accept error");
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Background host shutting down");
                    break;
                }
            }
        }

        for worker in self.ctx.registry.workers() {
            worker.port.channel().close();
        }
        let _ = std::fs::remove_file(&self.socket_path);

        Ok(())
    }
}

fn serve(ctx: &BackgroundContext, pipe: Pipe, label: impl Into<String>) -> Port {
    let port = Port::open(pipe, label).with_policy(ctx.policy);
    register_handler(&port, ctx);
    events::listen(&port, ctx);
    port
}

/// `worker.register [role, tab_id]`
fn register_handler(port: &Port, ctx: &BackgroundContext) {
    let registry = ctx.registry.clone();
    let policy = ctx.policy;
    let channel = port.channel().downgrade();

    port.handle(MessageName::WorkerRegister, move |envelope: Envelope| {
        let registry = registry.clone();
        let channel = channel.clone();
        async move {
            let role: String = envelope.arg(0)?;
            let tab_id: TabId = envelope.arg(1)?;
            let channel = channel.upgrade().ok_or_else(|| {
                ErrorPayload::new(extension_port::ErrorKind::TransportClosed, "Channel closed")
            })?;

            let handle = registry.register(
                WorkerRole::from(role),
                tab_id,
                Port::new(channel).with_policy(policy),
            );
            info!(role = %handle.role, tab_id, channel = %handle.port.id(), "Worker registered");
            Ok::<Vec<Value>, ErrorPayload>(Vec::new())
        }
    });
}
