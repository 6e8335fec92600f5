//! Application-layer prober on plain tokio sockets.
//!
//! TCP targets get one connection each, bounded by a semaphore, every socket
//! bound to the requested source port. UDP targets share a single socket so
//! that every datagram leaves from the same port and answers come back to it.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gatescan_common::network::port::Protocol;
use gatescan_common::record::ProbePayload;
use gatescan_protocols::{ProtocolTemplate, transaction_id};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream, UdpSocket};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

use super::{ProbeEngine, ProbeJob, ProbeReply};
use crate::error::EngineError;

const ENGINE: &str = "socket";
const CHANNEL_CAPACITY: usize = 1024;
const READ_BUFFER: usize = 4096;

#[derive(Debug, Default)]
pub struct SocketProbeEngine;

impl SocketProbeEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProbeEngine for SocketProbeEngine {
    fn name(&self) -> &str {
        ENGINE
    }

    async fn probe(&self, job: ProbeJob) -> Result<mpsc::Receiver<ProbeReply>, EngineError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        match job.port.protocol {
            Protocol::Tcp => {
                tokio::spawn(drive_tcp(job, tx));
            }
            Protocol::Udp => {
                let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, job.source_port.unwrap_or(0)));
                let socket = UdpSocket::bind(local).await.map_err(|e| {
                    EngineError::failed(ENGINE, format!("cannot bind udp source port {local}: {e}"))
                })?;
                tokio::spawn(drive_udp(socket, job, tx));
            }
        }

        Ok(rx)
    }
}

async fn drive_tcp(job: ProbeJob, tx: mpsc::Sender<ProbeReply>) {
    let semaphore = Arc::new(Semaphore::new(job.concurrency.max(1)));
    let template = Arc::new(job.template);
    let mut tasks = JoinSet::new();

    for ip in job.targets {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let template = template.clone();
        let tx = tx.clone();
        let target = SocketAddrV4::new(ip, job.port.number);
        let source_port = job.source_port;
        let budget = job.timeout;

        tasks.spawn(async move {
            let _permit = permit;
            match tcp_exchange(target, source_port, &template, budget).await {
                Ok(Some(payload)) => {
                    let _ = tx.send(ProbeReply { ip, payload }).await;
                }
                Ok(None) => {}
                Err(e) => debug!("{target}: {e}"),
            }
        });
    }

    while tasks.join_next().await.is_some() {}
}

async fn tcp_exchange(
    target: SocketAddrV4,
    source_port: Option<u16>,
    template: &ProtocolTemplate,
    budget: Duration,
) -> anyhow::Result<Option<ProbePayload>> {
    let deadline = Instant::now() + budget;

    let mut stream: TcpStream = match timeout(budget, connect_from(target, source_port)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(_)) | Err(_) => return Ok(None),
    };

    if let Some(request) = template.request(*target.ip(), 0)? {
        stream.write_all(&request).await?;
    }

    let mut raw = Vec::with_capacity(READ_BUFFER);
    let mut buf = [0u8; READ_BUFFER];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, stream.read(&mut buf)).await {
            Ok(Ok(0)) | Err(_) => break,
            Ok(Ok(n)) => {
                raw.extend_from_slice(&buf[..n]);
                // a banner is complete after its first line
                if matches!(template, ProtocolTemplate::TcpBanner) && raw.contains(&b'\n') {
                    break;
                }
                if raw.len() >= READ_BUFFER * 4 {
                    break;
                }
            }
            Ok(Err(e)) => {
                if raw.is_empty() {
                    return Err(e.into());
                }
                break;
            }
        }
    }

    Ok(template.parse(&raw, 0))
}

async fn connect_from(target: SocketAddrV4, source_port: Option<u16>) -> std::io::Result<TcpStream> {
    let socket = TcpSocket::new_v4()?;
    if let Some(port) = source_port {
        socket.set_reuseaddr(true)?;
        #[cfg(unix)]
        socket.set_reuseport(true)?;
        socket.bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))?;
    }
    socket.connect(SocketAddr::V4(target)).await
}

async fn drive_udp(socket: UdpSocket, job: ProbeJob, tx: mpsc::Sender<ProbeReply>) {
    let txid = transaction_id();
    let mut pending: HashSet<Ipv4Addr> = HashSet::with_capacity(job.targets.len());

    for ip in job.targets.iter() {
        let request = match job.template.request(*ip, txid) {
            Ok(request) => request.unwrap_or_default(),
            Err(e) => {
                warn!("cannot build {} request: {e}", job.template.name());
                return;
            }
        };
        let target = SocketAddrV4::new(*ip, job.port.number);
        match socket.send_to(&request, target).await {
            Ok(_) => {
                pending.insert(*ip);
            }
            Err(e) => debug!("{target}: {e}"),
        }
    }

    let deadline = Instant::now() + job.timeout;
    let mut buf = vec![0u8; READ_BUFFER * 16];
    while !pending.is_empty() && Instant::now() < deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let (n, from) = match timeout(remaining, socket.recv_from(&mut buf)).await {
            Ok(Ok(received)) => received,
            Ok(Err(e)) => {
                debug!("udp receive failed: {e}");
                continue;
            }
            Err(_) => break,
        };
        let SocketAddr::V4(from) = from else {
            continue;
        };
        if from.port() != job.port.number || !pending.contains(from.ip()) {
            continue;
        }
        if let Some(payload) = job.template.parse(&buf[..n], txid) {
            pending.remove(from.ip());
            if tx.send(ProbeReply { ip: *from.ip(), payload }).await.is_err() {
                break;
            }
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝

#[cfg(test)]
mod tests {
    use super::*;
    use gatescan_common::hosts::HostSet;
    use gatescan_common::network::port::PortSpec;
    use tokio::net::TcpListener;

    fn job(targets: HostSet, port: PortSpec, template: ProtocolTemplate) -> ProbeJob {
        ProbeJob {
            targets,
            port,
            template,
            source_port: None,
            timeout: Duration::from_millis(500),
            concurrency: 8,
        }
    }

    async fn drain(mut rx: mpsc::Receiver<ProbeReply>) -> Vec<ProbeReply> {
        let mut replies = Vec::new();
        while let Some(reply) = rx.recv().await {
            replies.push(reply);
        }
        replies
    }

    #[tokio::test]
    async fn tcp_banner_from_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"SSH-2.0-OpenSSH_9.6\r\n").await.unwrap();
        });

        let targets: HostSet = [Ipv4Addr::LOCALHOST].into_iter().collect();
        let rx = SocketProbeEngine::new()
            .probe(job(targets, PortSpec::tcp(port), ProtocolTemplate::TcpBanner))
            .await
            .unwrap();
        let replies = drain(rx).await;

        assert_eq!(replies.len(), 1);
        assert_eq!(
            replies[0].payload,
            ProbePayload::Banner {
                text: "SSH-2.0-OpenSSH_9.6".to_string()
            }
        );
    }

    #[tokio::test]
    async fn closed_tcp_port_produces_no_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let targets: HostSet = [Ipv4Addr::LOCALHOST].into_iter().collect();
        let rx = SocketProbeEngine::new()
            .probe(job(targets, PortSpec::tcp(port), ProtocolTemplate::TcpBanner))
            .await
            .unwrap();
        assert!(drain(rx).await.is_empty());
    }

    #[tokio::test]
    async fn udp_echo_from_local_socket() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = server.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let (_, from) = server.recv_from(&mut buf).await.unwrap();
            server.send_to(b"pong", from).await.unwrap();
        });

        let targets: HostSet = [Ipv4Addr::LOCALHOST].into_iter().collect();
        let rx = SocketProbeEngine::new()
            .probe(job(targets, PortSpec::udp(port), ProtocolTemplate::UdpEcho))
            .await
            .unwrap();
        let replies = drain(rx).await;

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].payload, ProbePayload::Raw { bytes: b"pong".to_vec() });
    }

    #[tokio::test]
    #[ignore]
    async fn http_get_against_public_host() {
        let targets: HostSet = [Ipv4Addr::new(1, 1, 1, 1)].into_iter().collect();
        let mut probe = job(
            targets,
            PortSpec::tcp(80),
            ProtocolTemplate::HttpGet {
                path: "/".to_string(),
            },
        );
        probe.timeout = Duration::from_secs(3);
        let rx = SocketProbeEngine::new().probe(probe).await.unwrap();
        assert!(matches!(
            drain(rx).await.first().map(|r| &r.payload),
            Some(ProbePayload::Http { .. })
        ));
    }
}
