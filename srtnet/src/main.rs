//! Demo: one server and a handful of clients on the in-process transport.
//!
//! The server admits every peer, counts its messages and echoes every n-th one
//! back. Halfway through, the first client hangs up to show the disconnect
//! path. At the end the server prints per-client link statistics.

use anyhow::Context;
use bytes::Bytes;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

use srtnet::config::{self, DemoConfig};
use srtnet::{ConnectionHandle, MsgCtrl, NetworkConnection, Session};

/// Server-side state for one admitted client.
struct Peer {
    id: usize,
    addr: SocketAddr,
    received: AtomicUsize,
}

/// Client-side state for the server connection.
struct Upstream {
    id: usize,
    echoes: AtomicUsize,
}

fn main() -> anyhow::Result<()> {
    let config = config::load_config()?;
    let metrics = srtnet::telemetry::init_telemetry(&config.global)
        .context("failed to initialize telemetry")?;

    info!("Configuration loaded successfully");

    let library = srtnet_x::loopback::shared();
    let server = Arc::new(Session::new(&library).context("failed to create server session")?);
    install_server_callbacks(&server, config.demo.echo_every);

    server
        .start_server(&config.server, Some(NetworkConnection::shared("demo-server")))
        .context("failed to start server")?;

    let mut client_params = config.client.clone();
    if config.server.port == 0 {
        if let Some(port) = server.local_port() {
            client_params.port = port;
        }
    }

    let mut clients = Vec::with_capacity(config.demo.clients);
    for id in 0..config.demo.clients {
        let client = Session::new(&library).context("failed to create client session")?;
        let upstream = Arc::new(NetworkConnection::new(Upstream {
            id,
            echoes: AtomicUsize::new(0),
        }));
        install_client_callbacks(&client);
        client
            .start_client(&client_params, upstream)
            .with_context(|| format!("client {} failed to connect", id))?;
        clients.push(Some(client));
    }

    info!(
        clients = clients.len(),
        port = client_params.port,
        "All clients connected"
    );

    run_traffic(&config, &mut clients);

    // Let the last echoes land before reading counters.
    thread::sleep(Duration::from_millis(100));
    report(&server, &clients);

    for client in clients.into_iter().flatten() {
        if let Err(e) = client.stop() {
            warn!(error = %e, "Client stop reported an error");
        }
    }
    server.stop().context("failed to stop server")?;

    let snapshot = metrics.shutdown();
    info!(
        accepted = snapshot.clients_accepted,
        disconnected = snapshot.clients_disconnected,
        sent = snapshot.messages_sent,
        received = snapshot.messages_received,
        "Demo complete"
    );
    Ok(())
}

fn install_server_callbacks(server: &Arc<Session>, echo_every: usize) {
    let next_id = AtomicUsize::new(0);
    server.set_admission_callback(move |addr, handle, _server_ctx| {
        let id = next_id.fetch_add(1, Ordering::Relaxed);
        info!(%addr, %handle, id, "Admitting client");
        Some(NetworkConnection::shared(Peer {
            id,
            addr,
            received: AtomicUsize::new(0),
        }))
    });

    // Weak, so the session does not keep itself alive through its own callback.
    let weak: Weak<Session> = Arc::downgrade(server);
    server.set_data_callback(
        move |data: Bytes, ctrl: &MsgCtrl, ctx: &Arc<NetworkConnection>, handle: ConnectionHandle| {
            let Some(peer) = ctx.get::<Peer>() else {
                return;
            };
            let count = peer.received.fetch_add(1, Ordering::Relaxed) + 1;
            if echo_every == 0 || count % echo_every != 0 {
                return;
            }
            let Some(server) = weak.upgrade() else {
                return;
            };
            if let Err(e) = server.send_data(&data, ctrl, Some(handle)) {
                warn!(id = peer.id, error = %e, "Echo failed");
            }
        },
    );

    server.set_disconnect_callback(|ctx: &Arc<NetworkConnection>, handle: ConnectionHandle| {
        if let Some(peer) = ctx.get::<Peer>() {
            info!(
                id = peer.id,
                addr = %peer.addr,
                %handle,
                received = peer.received.load(Ordering::Relaxed),
                "Client gone"
            );
        }
    });
}

fn install_client_callbacks(client: &Session) {
    client.set_borrowed_data_callback(
        |_data: &[u8], _ctrl: &MsgCtrl, ctx: &Arc<NetworkConnection>, _handle: ConnectionHandle| {
            if let Some(upstream) = ctx.get::<Upstream>() {
                upstream.echoes.fetch_add(1, Ordering::Relaxed);
            }
        },
    );
    client.set_disconnect_callback(|ctx: &Arc<NetworkConnection>, handle: ConnectionHandle| {
        if let Some(upstream) = ctx.get::<Upstream>() {
            info!(
                id = upstream.id,
                %handle,
                echoes = upstream.echoes.load(Ordering::Relaxed),
                "Disconnected from server"
            );
        }
    });
}

fn run_traffic(config: &DemoConfig, clients: &mut [Option<Session>]) {
    let settings = &config.demo;
    let ctrl = MsgCtrl::default();
    let mut payload = vec![0u8; settings.packet_size];

    for round in 0..settings.packets {
        if round == settings.packets / 2 && clients.len() > 1 {
            if let Some(first) = clients[0].take() {
                info!("Stopping client 0 midway");
                if let Err(e) = first.stop() {
                    warn!(error = %e, "Client stop reported an error");
                }
            }
        }

        for (id, client) in clients.iter().enumerate() {
            let Some(client) = client else {
                continue;
            };
            stamp(&mut payload, id, round);
            if let Err(e) = client.send_data(&payload, &ctrl, None) {
                error!(id, round, error = %e, "Send failed");
            }
        }
        thread::sleep(Duration::from_millis(settings.interval_ms));
    }
}

/// Client id and round number at the front so the payload is not all zeros.
fn stamp(payload: &mut [u8], id: usize, round: usize) {
    let header = [(id as u32).to_be_bytes(), (round as u32).to_be_bytes()].concat();
    let n = header.len().min(payload.len());
    payload[..n].copy_from_slice(&header[..n]);
}

fn report(server: &Session, clients: &[Option<Session>]) {
    let handles: Vec<ConnectionHandle> = server.active_clients(|map| map.keys().copied().collect());
    info!(active = handles.len(), "Server active clients");

    for handle in handles {
        match server.statistics(false, false, Some(handle)) {
            Ok(stats) => info!(
                %handle,
                pkt_recv = stats.pkt_recv_total,
                byte_recv = stats.byte_recv_total,
                pkt_sent = stats.pkt_sent_total,
                mbps_recv = stats.mbps_recv_rate,
                "Link statistics"
            ),
            Err(e) => warn!(%handle, error = %e, "Statistics unavailable"),
        }
    }

    for client in clients.iter().flatten() {
        if let Some((handle, ctx)) = client.connected_server() {
            if let Some(upstream) = ctx.get::<Upstream>() {
                info!(
                    id = upstream.id,
                    %handle,
                    echoes = upstream.echoes.load(Ordering::Relaxed),
                    "Client echo count"
                );
            }
        }
    }
}
