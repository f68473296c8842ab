use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{Dispatch, QueryDispatcher, TransferSession};
use crate::dns::enums::{DNSResourceType, ResponseCode};
use crate::dns::header::HEADER_LEN;
use crate::dns::{DNSPacket, MAX_TCP_MESSAGE};
use crate::error::{DnsError, Result};

/// Receive buffer for UDP queries
const UDP_BUFFER_SIZE: usize = 4096;

/// Handler consulted for queries outside every zone served here
#[async_trait]
pub trait NextHandler: Send + Sync {
    /// Response for `query`, or None to stay silent
    async fn handle(&self, query: &DNSPacket) -> Option<DNSPacket>;
}

/// Default next handler: answer REFUSED
pub struct Refuse;

#[async_trait]
impl NextHandler for Refuse {
    async fn handle(&self, query: &DNSPacket) -> Option<DNSPacket> {
        let mut response = DNSPacket::error_reply(query, ResponseCode::Refused);
        response.header.aa = false;
        Some(response)
    }
}

enum Reply {
    Message(DNSPacket),
    Transfer(Box<TransferSession>),
    Silent,
}

pub struct DnsServer {
    dispatcher: Arc<QueryDispatcher>,
    next: Arc<dyn NextHandler>,
}

impl DnsServer {
    pub fn new(dispatcher: Arc<QueryDispatcher>, next: Arc<dyn NextHandler>) -> Self {
        Self { dispatcher, next }
    }

    /// Bind UDP and TCP on `bind_addr` and serve until shutdown is signalled
    pub async fn run(self: Arc<Self>, bind_addr: SocketAddr, shutdown: &broadcast::Sender<()>) -> Result<()> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!("UDP DNS server listening on {}", bind_addr);
        let listener = TcpListener::bind(bind_addr).await?;
        info!("TCP DNS server listening on {}", bind_addr);

        let udp = tokio::spawn(self.clone().run_udp(socket, shutdown.subscribe()));
        let tcp = tokio::spawn(self.run_tcp(listener, shutdown.subscribe()));

        let (udp, tcp) = tokio::join!(udp, tcp);
        udp.map_err(|e| DnsError::TaskFailed(format!("UDP: {}", e)))??;
        tcp.map_err(|e| DnsError::TaskFailed(format!("TCP: {}", e)))??;
        Ok(())
    }

    pub async fn run_udp(
        self: Arc<Self>,
        socket: UdpSocket,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let socket = Arc::new(socket);
        let mut buf = vec![0u8; UDP_BUFFER_SIZE];

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("UDP server received shutdown signal");
                    break;
                }

                result = socket.recv_from(&mut buf) => {
                    let (read_bytes, src_addr) = match result {
                        Ok(received) => received,
                        Err(e) => {
                            // ICMP errors from earlier sends surface here; keep serving
                            warn!("UDP receive error: {}", e);
                            continue;
                        }
                    };
                    let query_data = buf[..read_bytes].to_vec();
                    let server = self.clone();
                    let socket = socket.clone();

                    tokio::spawn(async move {
                        if let Some(response) = server.handle_udp(&query_data).await {
                            if let Err(e) = socket.send_to(&response, src_addr).await {
                                error!("Failed to send UDP response to {}: {}", src_addr, e);
                            }
                        }
                    });
                }
            }
        }

        Ok(())
    }

    pub async fn run_tcp(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("TCP server received shutdown signal");
                    break;
                }

                result = listener.accept() => {
                    let (stream, src_addr) = match result {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            error!("TCP accept error: {}", e);
                            continue;
                        }
                    };
                    let server = self.clone();

                    tokio::spawn(async move {
                        if let Err(e) = server.handle_tcp_connection(stream, src_addr).await {
                            warn!("TCP connection error from {}: {}", src_addr, e);
                        }
                    });
                }
            }
        }

        Ok(())
    }

    async fn handle_udp(&self, wire: &[u8]) -> Option<Vec<u8>> {
        let query = match DNSPacket::parse(wire) {
            Ok(query) => query,
            Err(e) => {
                debug!("Malformed UDP packet: {}", e);
                return format_error(wire).and_then(|reply| reply.serialize().ok());
            }
        };

        // AXFR needs TCP; answer before any zone work starts
        if query
            .question()
            .is_some_and(|q| q.qtype == DNSResourceType::AXFR)
            && !query.header.qr
        {
            debug!("AXFR over UDP, asking for TCP");
            return truncated(&query).serialize().ok();
        }

        let response = match self.reply(&query).await {
            Reply::Message(response) => response,
            Reply::Transfer(session) => {
                debug!("Transfer of {} over UDP, asking for TCP", session.zone().name);
                truncated(&query)
            }
            Reply::Silent => return None,
        };

        match response.serialize_within(query.max_udp_payload_size()) {
            Ok(wire) => Some(wire),
            Err(e) => {
                error!("Failed to serialize response: {}", e);
                DNSPacket::error_reply(&query, ResponseCode::ServerFailure)
                    .serialize()
                    .ok()
            }
        }
    }

    async fn handle_tcp_connection(&self, mut stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!("TCP connection from {}", addr);

        loop {
            let mut len_buf = [0u8; 2];
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }

            let msg_len = u16::from_be_bytes(len_buf) as usize;
            if msg_len == 0 {
                warn!("Invalid TCP message length from {}", addr);
                break;
            }

            let mut msg_buf = vec![0u8; msg_len];
            stream.read_exact(&mut msg_buf).await?;

            let query = match DNSPacket::parse(&msg_buf) {
                Ok(query) => query,
                Err(e) => {
                    debug!("Malformed TCP message from {}: {}", addr, e);
                    if let Some(reply) = format_error(&msg_buf) {
                        write_message(&mut stream, &reply).await?;
                    }
                    continue;
                }
            };

            match self.reply(&query).await {
                Reply::Message(response) => {
                    let wire = response.serialize_within(MAX_TCP_MESSAGE)?;
                    write_frame(&mut stream, &wire).await?;
                }
                Reply::Transfer(mut session) => {
                    let zone = session.zone().name.clone();
                    while let Some(message) = session.next_message().await {
                        if let Err(e) = write_transfer_message(&mut stream, &message).await {
                            session.cancel();
                            warn!("Transfer of {} to {} aborted: {}", zone, addr, e);
                            return Err(match e {
                                DnsError::TransferAborted(_) => e,
                                other => DnsError::TransferAborted(other.to_string()),
                            });
                        }
                    }
                    info!("Transfer of {} to {} finished", zone, addr);
                }
                Reply::Silent => {}
            }
        }

        Ok(())
    }

    async fn reply(&self, query: &DNSPacket) -> Reply {
        match self.dispatcher.dispatch(query).await {
            Dispatch::Respond(response) => Reply::Message(response),
            Dispatch::Transfer(session) => Reply::Transfer(Box::new(session)),
            Dispatch::Delegate => match self.next.handle(query).await {
                Some(response) => Reply::Message(response),
                None => Reply::Silent,
            },
        }
    }
}

/// Empty reply with TC set, telling the client to retry over TCP
fn truncated(query: &DNSPacket) -> DNSPacket {
    let mut response = DNSPacket::reply(query);
    response.header.tc = true;
    response
}

/// FORMERR for a message that failed to parse, if it looks like a query at all
fn format_error(wire: &[u8]) -> Option<DNSPacket> {
    if wire.len() < HEADER_LEN || wire[2] & 0x80 != 0 {
        return None;
    }
    let mut query = DNSPacket::default();
    query.header.id = u16::from_be_bytes([wire[0], wire[1]]);
    query.header.opcode = (wire[2] >> 3) & 0x0F;
    Some(DNSPacket::error_reply(&query, ResponseCode::FormatError))
}

async fn write_message(stream: &mut TcpStream, message: &DNSPacket) -> Result<()> {
    let wire = message.serialize_within(MAX_TCP_MESSAGE)?;
    write_frame(stream, &wire).await
}

/// Transfer messages are never truncated; one that does not fit a TCP frame
/// aborts the transfer
async fn write_transfer_message(stream: &mut TcpStream, message: &DNSPacket) -> Result<()> {
    let wire = message.serialize()?;
    if wire.len() > MAX_TCP_MESSAGE {
        return Err(DnsError::TransferAborted(format!(
            "{} byte message exceeds the TCP limit",
            wire.len()
        )));
    }
    write_frame(stream, &wire).await
}

async fn write_frame(stream: &mut TcpStream, wire: &[u8]) -> Result<()> {
    let mut frame = Vec::with_capacity(2 + wire.len());
    frame.extend_from_slice(&(wire.len() as u16).to_be_bytes());
    frame.extend_from_slice(wire);
    stream.write_all(&frame).await?;
    Ok(())
}
