//! The bus multiplexer: one serial endpoint (mandatory), a set of TCP
//! client endpoints, and a set of in-process listeners. Frames decoded
//! from any endpoint are relayed to every *other* endpoint plus every
//! listener; `query`/the module registry observe the bus purely through
//! the listener set.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_serial::{SerialPort, SerialPortBuilderExt};
use tracing::{debug, info, warn};

use velbus_proto::frame::VelbusFrame;
use velbus_proto::message::Message;
use velbus_proto::DecodeError;

use crate::error::BusError;

pub type Listener = Box<dyn Fn(&VelbusFrame) + Send + Sync>;

const TCP_WRITE_QUEUE_DEPTH: usize = 256;

struct TcpClientHandle {
    tx: mpsc::Sender<Vec<u8>>,
}

struct MuxInner {
    listeners: HashMap<u64, Listener>,
    tcp_clients: HashMap<u64, TcpClientHandle>,
    serial_tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

/// Cloneable front for the multiplexer's shared state. All methods are
/// safe to call from multiple tasks even though the runtime the
/// gatewayd binary builds on is single-threaded cooperative (§5) — the
/// `Mutex` here only ever sees uncontended locks in that configuration,
/// it exists for structural correctness rather than real contention.
#[derive(Clone)]
pub struct BusHandle {
    inner: Arc<Mutex<MuxInner>>,
    next_listener_id: Arc<AtomicU64>,
    paused: Arc<AtomicBool>,
    resume_notify: Arc<Notify>,
}

/// Deregisters its listener when dropped.
pub struct ListenerGuard {
    handle: BusHandle,
    id: u64,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        let handle = self.handle.clone();
        let id = self.id;
        tokio::spawn(async move {
            handle.inner.lock().await.listeners.remove(&id);
        });
    }
}

impl BusHandle {
    pub fn new() -> Self {
        BusHandle {
            inner: Arc::new(Mutex::new(MuxInner {
                listeners: HashMap::new(),
                tcp_clients: HashMap::new(),
                serial_tx: None,
            })),
            next_listener_id: Arc::new(AtomicU64::new(1)),
            paused: Arc::new(AtomicBool::new(false)),
            resume_notify: Arc::new(Notify::new()),
        }
    }

    /// Broadcasts `message` to bus address 0. Off by default — nothing
    /// in this workspace calls it automatically; it exists so a
    /// `send_rtc`-style utility has a primitive to call (§4.1–4.8
    /// supplement).
    pub async fn broadcast(&self, message: Message) -> Result<(), BusError> {
        self.inject(&VelbusFrame::new(0, message)).await
    }

    pub async fn subscribe(&self, listener: Listener) -> ListenerGuard {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().await.listeners.insert(id, listener);
        ListenerGuard {
            handle: self.clone(),
            id,
        }
    }

    /// Sends `frame` on the serial link and fans it out to TCP clients
    /// and listeners exactly like a frame that arrived from the wire —
    /// this is the "inject into the local process-message path" step
    /// `query` relies on.
    pub async fn inject(&self, frame: &VelbusFrame) -> Result<(), BusError> {
        let bytes = frame.to_bytes();
        let inner = self.inner.lock().await;
        if let Some(tx) = &inner.serial_tx {
            let _ = tx.send(bytes.clone());
        }
        self.relay_to(&inner, None, &bytes, frame);
        Ok(())
    }

    async fn relay_received(&self, origin: Option<u64>, bytes: &[u8], frame: &VelbusFrame) {
        let inner = self.inner.lock().await;
        self.relay_to(&inner, origin, bytes, frame);
        if origin.is_some() {
            if let Some(tx) = &inner.serial_tx {
                let _ = tx.send(bytes.to_vec());
            }
        }
    }

    fn relay_to(&self, inner: &MuxInner, origin: Option<u64>, bytes: &[u8], frame: &VelbusFrame) {
        for (id, client) in &inner.tcp_clients {
            if Some(*id) == origin {
                continue;
            }
            if client.tx.try_send(bytes.to_vec()).is_err() {
                warn!(client_id = id, "tcp client write queue full or closed, dropping frame");
            }
        }
        for listener in inner.listeners.values() {
            listener(frame);
        }
    }

    fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        if !paused {
            self.resume_notify.notify_waiters();
        }
    }

    async fn handle_bus_control(&self, message: &Message) -> Result<(), BusError> {
        match message {
            Message::RxBufFull(_) => {
                info!("bus reported RxBufFull, pausing TCP client reads");
                self.set_paused(true);
            }
            Message::RxBufReady(_) => {
                info!("bus reported RxBufReady, resuming TCP client reads");
                self.set_paused(false);
            }
            Message::BusOff(_) => {
                return Err(BusError::BusOff);
            }
            Message::BusActive(_) => {
                debug!("bus active marker received");
            }
            _ => {}
        }
        Ok(())
    }

    /// Opens the serial endpoint and runs its receive/resync loop until
    /// the port errors or a `BusOff` frame is observed (fatal, per §5).
    pub async fn run_serial(&self, path: &str, baud: u32) -> Result<(), BusError> {
        let mut port = tokio_serial::new(path, baud).open_native_async()?;
        if let Err(e) = port.write_data_terminal_ready(false) {
            warn!(error = %e, "failed to lower DTR on serial port");
        }
        if let Err(e) = port.write_request_to_send(true) {
            warn!(error = %e, "failed to raise RTS on serial port");
        }

        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        self.inner.lock().await.serial_tx = Some(write_tx);

        let (mut reader, mut writer) = tokio::io::split(port);

        let write_task = tokio::spawn(async move {
            while let Some(bytes) = write_rx.recv().await {
                if writer.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let mut buf = BytesMut::with_capacity(4096);
        let mut scratch = [0u8; 1024];
        loop {
            let n = reader.read(&mut scratch).await?;
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&scratch[..n]);

            loop {
                match VelbusFrame::from_bytes(&buf) {
                    Ok((frame, consumed)) => {
                        debug!(addr = frame.address, "decoded frame from serial");
                        self.handle_bus_control(&frame.message).await?;
                        let consumed_bytes = buf.split_to(consumed);
                        self.relay_received(None, &consumed_bytes, &frame).await;
                    }
                    Err(DecodeError::Incomplete) => break,
                    Err(e) => {
                        warn!(error = %e, "frame decode failed, dropping one byte to resync");
                        if !buf.is_empty() {
                            let _ = buf.split_to(1);
                        } else {
                            break;
                        }
                    }
                }
            }
        }

        write_task.abort();
        Ok(())
    }

    /// Accepts TCP clients on `bind_addr` and relays frames to/from
    /// them exactly like the serial endpoint.
    pub async fn run_tcp_server(&self, bind_addr: &str) -> Result<(), BusError> {
        let listener = TcpListener::bind(bind_addr).await?;
        info!(addr = bind_addr, "tcp fan-out listening");
        let mut next_id = 0u64;
        loop {
            let (stream, peer) = listener.accept().await?;
            next_id += 1;
            let client_id = next_id;
            let handle = self.clone();
            tokio::spawn(async move {
                info!(client_id, %peer, "tcp client connected");
                if let Err(e) = handle.handle_tcp_client(client_id, stream).await {
                    warn!(client_id, error = %e, "tcp client disconnected with error");
                }
            });
        }
    }

    async fn handle_tcp_client(&self, client_id: u64, stream: TcpStream) -> Result<(), BusError> {
        let (mut reader, mut writer) = stream.into_split();
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(TCP_WRITE_QUEUE_DEPTH);
        self.inner
            .lock()
            .await
            .tcp_clients
            .insert(client_id, TcpClientHandle { tx });

        let write_task = tokio::spawn(async move {
            while let Some(bytes) = rx.recv().await {
                if writer.write_all(&bytes).await.is_err() {
                    break;
                }
            }
        });

        let mut buf = BytesMut::with_capacity(4096);
        let mut scratch = [0u8; 1024];
        let result = loop {
            if self.paused.load(Ordering::SeqCst) {
                self.resume_notify.notified().await;
            }
            let n = match reader.read(&mut scratch).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(BusError::Io(e)),
            };
            buf.extend_from_slice(&scratch[..n]);

            loop {
                match VelbusFrame::from_bytes(&buf) {
                    Ok((frame, consumed)) => {
                        let consumed_bytes = buf.split_to(consumed);
                        self.relay_received(Some(client_id), &consumed_bytes, &frame).await;
                    }
                    Err(DecodeError::Incomplete) => break,
                    Err(_) => {
                        if !buf.is_empty() {
                            let _ = buf.split_to(1);
                        } else {
                            break;
                        }
                    }
                }
            }
        };

        self.inner.lock().await.tcp_clients.remove(&client_id);
        write_task.abort();
        result
    }
}

impl Default for BusHandle {
    fn default() -> Self {
        Self::new()
    }
}
