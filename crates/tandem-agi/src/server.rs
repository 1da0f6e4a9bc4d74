//! AGI server
//!
//! Accepts one TCP connection per call-control event, reads the header
//! block, and dispatches to the routing engine based on the request
//! token. The accept loop watches a shutdown signal so the process can
//! drain promptly.

use crate::session::{extract_peer_from_channel, AgiSession, AGI_FAILURE, AGI_SUCCESS};
use std::sync::Arc;
use tandem_core::AppResult;
use tandem_engine::RoutingEngine;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Gateway between the call-control front-end and the routing engine
pub struct AgiServer {
    engine: Arc<RoutingEngine>,
    addr: String,
}

impl AgiServer {
    /// Create a server for a bind address like `0.0.0.0:8002`
    pub fn new(engine: Arc<RoutingEngine>, addr: impl Into<String>) -> Self {
        Self {
            engine,
            addr: addr.into(),
        }
    }

    /// Accept connections until the shutdown signal fires
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.addr).await?;
        info!("AGI server listening on {}", self.addr);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!("AGI server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, remote)) => {
                            debug!("AGI connection from {}", remote);
                            let engine = self.engine.clone();
                            tokio::spawn(async move {
                                let (read, write) = stream.into_split();
                                let result =
                                    handle_session(&engine, BufReader::new(read), write).await;
                                if let Err(e) = result {
                                    error!("AGI session from {} failed: {}", remote, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept AGI connection: {}", e);
                        }
                    }
                }
            }
        }
    }
}

/// Handle one call-control event over an established connection
pub async fn handle_session<R, W>(
    engine: &RoutingEngine,
    reader: R,
    writer: W,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut session = AgiSession::new(reader, writer);
    session.read_headers().await?;

    let request = session.header("agi_request").to_string();
    debug!(request = %request, "AGI request");

    if request.contains("processIncoming") {
        handle_incoming(engine, &mut session).await
    } else if request.contains("processReturn") {
        handle_return(engine, &mut session).await
    } else if request.contains("processFinal") {
        handle_final(engine, &mut session).await
    } else if request.contains("hangup") {
        handle_hangup(engine, &mut session).await
    } else {
        error!(request = %request, "Unknown AGI request");
        session.send_status(AGI_FAILURE).await
    }
}

async fn handle_incoming<R, W>(
    engine: &RoutingEngine,
    session: &mut AgiSession<R, W>,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let call_id = session.header("agi_uniqueid").to_string();
    let ani = session.header("agi_callerid").to_string();
    let dnis = session.header("agi_extension").to_string();
    let inbound_peer = extract_peer_from_channel(session.header("agi_channel"));

    match engine
        .process_incoming(&call_id, &ani, &dnis, &inbound_peer)
        .await
    {
        Ok(response) => {
            session.set_variable("ROUTER_STATUS", "success").await?;
            session
                .set_variable("DID_ASSIGNED", response.did_assigned.as_deref().unwrap_or(""))
                .await?;
            session.set_variable("NEXT_HOP", &response.next_hop).await?;
            session
                .set_variable("ANI_TO_SEND", &response.ani_to_send)
                .await?;
            session
                .set_variable("DNIS_TO_SEND", &response.dnis_to_send)
                .await?;
        }
        Err(e) => {
            error!(call_id = %call_id, "Incoming call failed: {}", e);
            session.set_variable("ROUTER_STATUS", "failed").await?;
            session
                .set_variable("ROUTER_ERROR", &e.to_string())
                .await?;
        }
    }

    session.send_status(AGI_SUCCESS).await
}

async fn handle_return<R, W>(
    engine: &RoutingEngine,
    session: &mut AgiSession<R, W>,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let ani2 = session.header("agi_callerid").to_string();
    let did = session.header("agi_extension").to_string();
    let intermediate_peer = extract_peer_from_channel(session.header("agi_channel"));
    let source_ip = session.get_variable("SOURCE_IP").await?;

    match engine
        .process_return(&ani2, &did, &intermediate_peer, &source_ip)
        .await
    {
        Ok(response) => {
            session.set_variable("ROUTER_STATUS", "success").await?;
            session.set_variable("NEXT_HOP", &response.next_hop).await?;
            session
                .set_variable("ANI_TO_SEND", &response.ani_to_send)
                .await?;
            session
                .set_variable("DNIS_TO_SEND", &response.dnis_to_send)
                .await?;
        }
        Err(e) => {
            error!(did = %did, "Return call failed: {}", e);
            session.set_variable("ROUTER_STATUS", "failed").await?;
            session
                .set_variable("ROUTER_ERROR", &e.to_string())
                .await?;
        }
    }

    session.send_status(AGI_SUCCESS).await
}

async fn handle_final<R, W>(
    engine: &RoutingEngine,
    session: &mut AgiSession<R, W>,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let call_id = session.header("agi_uniqueid").to_string();
    let ani = session.header("agi_callerid").to_string();
    let dnis = session.header("agi_extension").to_string();
    let final_peer = extract_peer_from_channel(session.header("agi_channel"));
    let source_ip = session.get_variable("SOURCE_IP").await?;

    if let Err(e) = engine
        .process_final(&call_id, &ani, &dnis, &final_peer, &source_ip)
        .await
    {
        error!(call_id = %call_id, "Final call failed: {}", e);
        session.set_variable("ROUTER_STATUS", "failed").await?;
        session
            .set_variable("ROUTER_ERROR", &e.to_string())
            .await?;
    } else {
        session.set_variable("ROUTER_STATUS", "success").await?;
    }

    session.send_status(AGI_SUCCESS).await
}

async fn handle_hangup<R, W>(
    engine: &RoutingEngine,
    session: &mut AgiSession<R, W>,
) -> AppResult<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let call_id = session.header("agi_uniqueid").to_string();
    if let Err(e) = engine.process_hangup(&call_id).await {
        error!(call_id = %call_id, "Hangup handling failed: {}", e);
    }
    session.send_status(AGI_SUCCESS).await
}
