use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::config::Config;
use crate::files::StaticFiles;
use crate::http::connection::{Connection, Handler};
use crate::proxy::forwarder::Forwarder;
use crate::proxy::router::{RouteTable, Router};

/// Bound listener plus the shared request handler.
pub struct Listener {
    listener: TcpListener,
    handler: Arc<Handler>,
}

impl Listener {
    /// Bind the configured address and build the immutable handler state.
    pub async fn bind(cfg: &Config) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.server.listen_addr).await?;
        info!("Listening on {}", cfg.server.listen_addr);

        let handler = Arc::new(Handler {
            router: Router::new(RouteTable::new(cfg.routes.clone())),
            forwarder: Forwarder::new(),
            static_files: StaticFiles::new(&cfg.static_files),
        });

        Ok(Self { listener, handler })
    }

    /// The address actually bound, useful when the port was 0.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per connection.
    pub async fn serve(&self) -> anyhow::Result<()> {
        loop {
            let (socket, peer) = self.listener.accept().await?;
            info!("Accepted connection from {}", peer);

            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                let mut conn = Connection::new(socket, handler);
                if let Err(e) = conn.run().await {
                    tracing::error!("Connection error from {}: {}", peer, e);
                }
            });
        }
    }
}
