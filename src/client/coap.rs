//! Minimal CoAP-over-UDP implementation of [`ResourceClient`].
//!
//! Covers exactly what the bridge needs: a confirmable GET for polling and
//! the Observe option (RFC 7641) for alarm subscriptions. Confirmable
//! notifications are acknowledged so the server keeps the observation alive;
//! retransmission and congestion control are out of scope.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType, ResponseType};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, warn};

use crate::SensorValue;

use super::error::{FetchError, SubscribeError};
use super::{ResourceClient, Subscription};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_MESSAGE_SIZE: usize = 1152;
const NOTIFICATION_BUFFER: usize = 16;

static MESSAGE_ID: AtomicU16 = AtomicU16::new(1);
static TOKEN: AtomicU64 = AtomicU64::new(1);

fn next_message_id() -> u16 {
    MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

fn next_token() -> Vec<u8> {
    TOKEN.fetch_add(1, Ordering::Relaxed).to_be_bytes().to_vec()
}

#[derive(Debug, Clone, Copy)]
pub struct CoapClient {
    server: SocketAddr,
    timeout: Duration,
}

impl CoapClient {
    pub fn new(server: SocketAddr) -> Self {
        Self {
            server,
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    /// Every request runs over its own ephemeral socket, so one client
    /// handle is safe to share across all tasks.
    async fn bind(&self) -> std::io::Result<UdpSocket> {
        let bind_addr = if self.server.is_ipv6() {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
        } else {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(self.server).await?;
        Ok(socket)
    }
}

#[async_trait]
impl ResourceClient for CoapClient {
    async fn fetch(&self, path: &str) -> Result<SensorValue, FetchError> {
        let socket = self.bind().await?;
        let token = next_token();

        let request = build_get(path, &token, next_message_id(), None);
        let bytes = request
            .to_bytes()
            .map_err(|e| FetchError::Protocol(format!("{e:?}")))?;
        socket.send(&bytes).await?;

        let response = await_matching(&socket, &token, self.timeout)
            .await
            .map_err(|e| match e {
                WaitError::Timeout => FetchError::Timeout,
                WaitError::Io(err) => FetchError::Io(err),
            })?;

        match response.header.code {
            MessageClass::Response(ResponseType::Content) => {
                SensorValue::parse(&response.payload).map_err(FetchError::Payload)
            }
            MessageClass::Response(ResponseType::NotFound) => Err(FetchError::NotFound),
            code => Err(FetchError::ErrorResponse(format!("{code:?}"))),
        }
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, SubscribeError> {
        let socket = self.bind().await?;
        let token = next_token();

        // Observe register
        let request = build_get(path, &token, next_message_id(), Some(0));
        let bytes = request
            .to_bytes()
            .map_err(|e| SubscribeError::Protocol(format!("{e:?}")))?;
        socket.send(&bytes).await?;

        let response = await_matching(&socket, &token, self.timeout)
            .await
            .map_err(|e| match e {
                WaitError::Timeout => SubscribeError::Timeout,
                WaitError::Io(err) => SubscribeError::Io(err),
            })?;

        if !matches!(
            response.header.code,
            MessageClass::Response(ResponseType::Content)
        ) {
            return Err(SubscribeError::Rejected(format!(
                "{:?}",
                response.header.code
            )));
        }

        if response.get_option(CoapOption::Observe).is_none() {
            return Err(SubscribeError::Rejected(
                "server did not accept the observation".to_string(),
            ));
        }

        let initial = SensorValue::parse(&response.payload).map_err(SubscribeError::Payload)?;

        let (notification_tx, notification_rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let (cancel_tx, cancel_rx) = oneshot::channel();

        tokio::spawn(observation_loop(
            socket,
            path.to_string(),
            token,
            notification_tx,
            cancel_rx,
        ));

        Ok(Subscription::new(initial, notification_rx, cancel_tx))
    }
}

/// Receive loop for one active observation. Runs until the observation is
/// cancelled (explicitly or by dropping the subscription handle), then sends
/// the deregistration request and exits.
async fn observation_loop(
    socket: UdpSocket,
    path: String,
    token: Vec<u8>,
    notifications: mpsc::Sender<SensorValue>,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut buf = [0u8; MAX_MESSAGE_SIZE];

    loop {
        tokio::select! {
            received = socket.recv(&mut buf) => {
                let len = match received {
                    Ok(len) => len,
                    Err(e) => {
                        warn!("{path}: observation socket error: {e}");
                        break;
                    }
                };

                let Ok(packet) = Packet::from_bytes(&buf[..len]) else {
                    continue;
                };
                if packet.get_token().to_vec() != token {
                    continue;
                }

                if packet.header.get_type() == MessageType::Confirmable {
                    let ack = ack_packet(packet.header.message_id);
                    if let Ok(bytes) = ack.to_bytes() {
                        let _ = socket.send(&bytes).await;
                    }
                }

                if !matches!(
                    packet.header.code,
                    MessageClass::Response(ResponseType::Content)
                ) {
                    continue;
                }

                match SensorValue::parse(&packet.payload) {
                    Ok(value) => {
                        if notifications.send(value).await.is_err() {
                            // subscription handle gone
                            deregister(&socket, &path, &token).await;
                            return;
                        }
                    }
                    Err(e) => warn!("{path}: ignoring notification: {e}"),
                }
            }

            _ = &mut cancel => {
                deregister(&socket, &path, &token).await;
                return;
            }
        }
    }
}

async fn deregister(socket: &UdpSocket, path: &str, token: &[u8]) {
    let mut request = build_get(path, token, next_message_id(), Some(1));
    // fire and forget, the response is not awaited
    request.header.set_type(MessageType::NonConfirmable);

    match request.to_bytes() {
        Ok(bytes) => {
            let _ = socket.send(&bytes).await;
            trace!("{path}: observation deregistered");
        }
        Err(e) => warn!("{path}: could not encode deregistration: {e:?}"),
    }
}

fn build_get(path: &str, token: &[u8], message_id: u16, observe: Option<u8>) -> Packet {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Confirmable);
    packet.header.code = MessageClass::Request(RequestType::Get);
    packet.header.message_id = message_id;
    packet.set_token(token.to_vec());

    // Observe must come before Uri-Path in option-number order, but
    // coap-lite keeps options sorted, so insertion order does not matter.
    if let Some(value) = observe {
        // register (0) encodes as the empty byte string
        let bytes = if value == 0 { vec![] } else { vec![value] };
        packet.add_option(CoapOption::Observe, bytes);
    }

    for segment in path.split('/').filter(|s| !s.is_empty()) {
        packet.add_option(CoapOption::UriPath, segment.as_bytes().to_vec());
    }

    packet
}

fn ack_packet(message_id: u16) -> Packet {
    let mut packet = Packet::new();
    packet.header.set_type(MessageType::Acknowledgement);
    packet.header.code = MessageClass::Empty;
    packet.header.message_id = message_id;
    packet
}

enum WaitError {
    Timeout,
    Io(std::io::Error),
}

/// Wait for the first token-matching response, acknowledging confirmable
/// ones. Empty messages (the first half of a separate response) and foreign
/// datagrams are skipped.
async fn await_matching(
    socket: &UdpSocket,
    token: &[u8],
    timeout: Duration,
) -> Result<Packet, WaitError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let mut buf = [0u8; MAX_MESSAGE_SIZE];

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Err(WaitError::Timeout);
        }

        let len = match tokio::time::timeout(remaining, socket.recv(&mut buf)).await {
            Err(_) => return Err(WaitError::Timeout),
            Ok(Err(e)) => return Err(WaitError::Io(e)),
            Ok(Ok(len)) => len,
        };

        let Ok(packet) = Packet::from_bytes(&buf[..len]) else {
            continue;
        };
        if packet.get_token().to_vec() != token {
            continue;
        }
        if matches!(packet.header.code, MessageClass::Empty) {
            continue;
        }

        if packet.header.get_type() == MessageType::Confirmable {
            let ack = ack_packet(packet.header.message_id);
            if let Ok(bytes) = ack.to_bytes() {
                let _ = socket.send(&bytes).await;
            }
        }

        return Ok(packet);
    }
}
