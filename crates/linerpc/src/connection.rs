//! The connection: framing, dispatch and call correlation over one stream.
//!
//! [`spawn_connection`] starts two tasks over a [`ByteStream`]:
//!
//! - the **writer** owns the outbound direction. Every line (requests,
//!   responses, forwarded events) goes through one channel, so lines are
//!   never interleaved.
//! - the **reader** cuts incoming bytes into lines and handles them in
//!   arrival order.
//!
//! # Inbound commands
//!
//! A synchronous command runs on the blocking pool and the reader does
//! not move on to the next command until its response is queued. While
//! it runs, the reader keeps reading: responses are delivered at once and
//! commands wait in a backlog. A handler can therefore make a synchronous
//! call back to the peer without deadlocking the connection.
//!
//! An `async` command is started on the blocking pool and not awaited. It
//! never produces a response.
//!
//! # Outbound calls
//!
//! ```text
//!            call()                     response line
//!   Idle ─────────────→ AwaitingResponse ─────────────→ Idle
//!                              │
//!                              └── timeout / close ──→ Idle / Closed
//! ```
//!
//! The protocol has no call id, so at most one synchronous call may be on
//! the wire. Concurrent callers queue on an async gate.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::Arc;

use linerpc_dispatch::{CommandDispatcher, DispatchError};
use linerpc_protocol::{
    CommandFrame, EncodeOptions, ErrorCode, Frame, FrameError, LineBuffer, ResponseFrame, Value,
};
use linerpc_transport::{ByteStream, StreamId};
use parking_lot::Mutex;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};

use crate::{ConnectionConfig, RpcError};

// ---------------------------------------------------------------------------
// Replies and the pending-call slot
// ---------------------------------------------------------------------------

/// A response to a synchronous call: the peer's error code and value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub code: ErrorCode,
    pub value: Value,
}

impl Reply {
    /// `Ok(value)` for [`ErrorCode::NoError`], otherwise
    /// [`RpcError::Remote`] carrying the peer's message.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if self.code.is_ok() {
            return Ok(self.value);
        }
        let message = match self.value {
            Value::Text(text) => text,
            other => {
                let options = EncodeOptions::compact().with_unknown_as_null(true);
                linerpc_protocol::encode(&other, &options).unwrap_or_default()
            }
        };
        Err(RpcError::Remote {
            code: self.code,
            message,
        })
    }
}

impl From<ResponseFrame> for Reply {
    fn from(frame: ResponseFrame) -> Self {
        Self {
            code: frame.code,
            value: frame.value,
        }
    }
}

enum Slot {
    Idle,
    Awaiting(oneshot::Sender<Reply>),
    Closed,
}

/// What became of a response line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Delivery {
    Delivered,
    /// Owed to a call that was given up on.
    Stale,
    Unmatched,
}

struct CallState {
    slot: Slot,
    /// Responses still owed to abandoned calls. They arrive before the
    /// response to the current call and are dropped.
    stale: usize,
}

/// The single outstanding synchronous call of a connection.
pub(crate) struct PendingCall {
    state: Mutex<CallState>,
}

impl PendingCall {
    fn new() -> Self {
        Self {
            state: Mutex::new(CallState {
                slot: Slot::Idle,
                stale: 0,
            }),
        }
    }

    /// Moves to `AwaitingResponse` and returns where the reply will land.
    fn begin(&self) -> Result<oneshot::Receiver<Reply>, RpcError> {
        let mut state = self.state.lock();
        match state.slot {
            Slot::Closed => return Err(RpcError::ConnectionClosed),
            // Left behind by a caller whose future was dropped after
            // its line went out.
            Slot::Awaiting(_) => {
                tracing::debug!("discarding abandoned pending call");
                state.stale += 1;
            }
            Slot::Idle => {}
        }
        let (tx, rx) = oneshot::channel();
        state.slot = Slot::Awaiting(tx);
        Ok(rx)
    }

    /// Hands `reply` to the waiting caller, unless an abandoned call is
    /// still owed a response.
    fn resolve(&self, reply: Reply) -> Delivery {
        let mut state = self.state.lock();
        if matches!(state.slot, Slot::Closed) {
            return Delivery::Unmatched;
        }
        if state.stale > 0 {
            state.stale -= 1;
            return Delivery::Stale;
        }
        match std::mem::replace(&mut state.slot, Slot::Idle) {
            Slot::Awaiting(tx) => match tx.send(reply) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Unmatched,
            },
            _ => Delivery::Unmatched,
        }
    }

    /// Withdraws a call whose line never reached the wire.
    fn cancel(&self) {
        let mut state = self.state.lock();
        if matches!(state.slot, Slot::Awaiting(_)) {
            state.slot = Slot::Idle;
        }
    }

    /// Gives up on a call whose line was sent. Its response, if it ever
    /// comes, will be dropped.
    fn abandon(&self) {
        let mut state = self.state.lock();
        if matches!(state.slot, Slot::Awaiting(_)) {
            state.slot = Slot::Idle;
            state.stale += 1;
        }
    }

    /// Fails the outstanding call and refuses new ones. Dropping the
    /// sender wakes the caller.
    fn close(&self) {
        let mut state = self.state.lock();
        state.slot = Slot::Closed;
        state.stale = 0;
    }
}

// ---------------------------------------------------------------------------
// Handler threads
// ---------------------------------------------------------------------------

thread_local! {
    /// Set while this thread runs an inbound command.
    static IN_HANDLER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as running a command until dropped.
struct HandlerScope;

impl HandlerScope {
    fn enter() -> Self {
        IN_HANDLER.set(true);
        Self
    }
}

impl Drop for HandlerScope {
    fn drop(&mut self) {
        IN_HANDLER.set(false);
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

enum Outbound {
    Line(String),
    Close,
}

struct Shared {
    id: StreamId,
    outbound: mpsc::UnboundedSender<Outbound>,
    pending: PendingCall,
    /// Held for the whole of a synchronous call.
    gate: tokio::sync::Mutex<()>,
    closed: watch::Sender<bool>,
    config: ConnectionConfig,
    runtime: tokio::runtime::Handle,
}

impl Shared {
    fn send(&self, msg: Outbound) -> Result<(), RpcError> {
        if *self.closed.borrow() {
            return Err(RpcError::ConnectionClosed);
        }
        self.outbound
            .send(msg)
            .map_err(|_| RpcError::ConnectionClosed)
    }

    fn mark_closed(&self) {
        self.pending.close();
        if !self.closed.send_replace(true) {
            tracing::info!(stream_id = %self.id, "connection closed");
        }
    }
}

/// Aborts both tasks once the last handle is gone.
struct TaskGuard {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
    }
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// A handle to a running connection. Cheap to clone.
///
/// Dropping the last clone stops the connection.
#[derive(Clone)]
pub struct ConnectionHandle {
    shared: Arc<Shared>,
    _tasks: Arc<TaskGuard>,
}

impl ConnectionHandle {
    pub fn id(&self) -> StreamId {
        self.shared.id
    }

    /// Calls `command` on the peer and waits for the response.
    ///
    /// # Errors
    ///
    /// - [`RpcError::Remote`] if the peer answered with an error code.
    /// - [`RpcError::CallTimeout`] if a timeout is configured and passed.
    /// - [`RpcError::ConnectionClosed`] if the connection ended first.
    /// - [`RpcError::Protocol`] if an argument has no JSON form.
    pub async fn call(&self, command: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        self.call_reply(command, args).await?.into_result()
    }

    /// Like [`call`](Self::call), but returns the raw [`Reply`] whatever
    /// its error code.
    pub async fn call_reply(&self, command: &str, args: Vec<Value>) -> Result<Reply, RpcError> {
        let line = CommandFrame::new(command, args).encode()?;

        let _turn = self.shared.gate.lock().await;
        let rx = self.shared.pending.begin()?;
        if let Err(e) = self.shared.send(Outbound::Line(line)) {
            self.shared.pending.cancel();
            return Err(e);
        }
        tracing::debug!(stream_id = %self.shared.id, %command, "awaiting response");

        let reply = match self.shared.config.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(reply) => reply,
                Err(_) => {
                    self.shared.pending.abandon();
                    tracing::warn!(stream_id = %self.shared.id, %command, ?limit, "call timed out");
                    return Err(RpcError::CallTimeout(limit));
                }
            },
            None => rx.await,
        };
        reply.map_err(|_| RpcError::ConnectionClosed)
    }

    /// Sends `async <command> [...]` and returns at once. Never blocks.
    pub fn call_async(&self, command: &str, args: Vec<Value>) -> Result<(), RpcError> {
        let line = CommandFrame::new_async(command, args).encode()?;
        self.shared.send(Outbound::Line(line))
    }

    /// Synchronous call for code that isn't async: an inbound handler, an
    /// event emitted from a plain thread.
    ///
    /// Blocks the current thread. On a multi-thread runtime a worker
    /// thread hands its other tasks off while it waits.
    ///
    /// # Errors
    ///
    /// Besides those of [`call`](Self::call),
    /// [`RpcError::BlockingInRuntime`] when called on a current-thread
    /// runtime from anywhere but a command handler, where waiting would
    /// deadlock.
    pub fn call_blocking(&self, command: &str, args: Vec<Value>) -> Result<Value, RpcError> {
        let multi_thread = match tokio::runtime::Handle::try_current() {
            Ok(current) if current.runtime_flavor() == RuntimeFlavor::CurrentThread => {
                if !IN_HANDLER.get() {
                    return Err(RpcError::BlockingInRuntime);
                }
                false
            }
            Ok(_) => true,
            Err(_) => false,
        };

        let (tx, rx) = oneshot::channel();
        let handle = self.clone();
        let command = command.to_string();
        self.shared.runtime.spawn(async move {
            let _ = tx.send(handle.call(&command, args).await);
        });

        let wait = move || rx.blocking_recv().map_err(|_| RpcError::ConnectionClosed);
        if multi_thread {
            tokio::task::block_in_place(wait)?
        } else {
            wait()?
        }
    }

    /// Flushes queued lines, closes the write side and stops reading.
    /// A call still waiting fails with [`RpcError::ConnectionClosed`].
    pub fn close(&self) {
        let _ = self.shared.outbound.send(Outbound::Close);
        self.shared.mark_closed();
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    /// Resolves once the connection has closed, from either side.
    pub async fn closed(&self) {
        wait_closed(&mut self.shared.closed.subscribe()).await;
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Starts serving `stream`: incoming commands go to `dispatcher`, and the
/// returned handle makes outgoing calls.
///
/// # Panics
///
/// Panics if called outside a Tokio runtime.
pub fn spawn_connection<S: ByteStream>(
    stream: S,
    dispatcher: Arc<CommandDispatcher>,
    config: ConnectionConfig,
) -> ConnectionHandle {
    let stream = Arc::new(stream);
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let (closed, _) = watch::channel(false);
    let buffer = LineBuffer::with_max_line_len(config.max_line_len);

    let shared = Arc::new(Shared {
        id: stream.id(),
        outbound,
        pending: PendingCall::new(),
        gate: tokio::sync::Mutex::new(()),
        closed,
        config,
        runtime: tokio::runtime::Handle::current(),
    });
    tracing::info!(stream_id = %shared.id, "connection started");

    let writer = tokio::spawn(write_loop(
        Arc::clone(&stream),
        outbound_rx,
        Arc::clone(&shared),
    ));
    let reader = tokio::spawn(
        Reader {
            stream,
            dispatcher,
            shared: Arc::clone(&shared),
            buffer,
            backlog: VecDeque::new(),
            eof: false,
        }
        .run(),
    );

    ConnectionHandle {
        shared,
        _tasks: Arc::new(TaskGuard { reader, writer }),
    }
}

async fn write_loop<S: ByteStream>(
    stream: Arc<S>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
    shared: Arc<Shared>,
) {
    let mut closed = shared.closed.subscribe();
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => match msg {
                Some(Outbound::Line(line)) => {
                    if let Err(e) = stream.send(line.as_bytes()).await {
                        tracing::warn!(stream_id = %shared.id, error = %e, "send failed");
                        shared.mark_closed();
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    if let Err(e) = stream.close().await {
                        tracing::debug!(stream_id = %shared.id, error = %e, "close failed");
                    }
                    break;
                }
            },
            () = wait_closed(&mut closed) => {
                let _ = stream.close().await;
                break;
            }
        }
    }
    tracing::debug!(stream_id = %shared.id, "writer stopped");
}

/// Resolves once `closed` turns true. The borrow of the watched value
/// ends inside, so callers may hold the future across other awaits.
async fn wait_closed(closed: &mut watch::Receiver<bool>) {
    let _ = closed.wait_for(|closed| *closed).await;
}

enum Inbound {
    Command(CommandFrame),
    Malformed(FrameError),
}

struct Reader<S> {
    stream: Arc<S>,
    dispatcher: Arc<CommandDispatcher>,
    shared: Arc<Shared>,
    buffer: LineBuffer,
    /// Commands waiting for the one in progress to finish.
    backlog: VecDeque<Inbound>,
    eof: bool,
}

impl<S: ByteStream> Reader<S> {
    async fn run(mut self) {
        let stream = Arc::clone(&self.stream);
        let mut closed = self.shared.closed.subscribe();
        loop {
            while let Some(inbound) = self.backlog.pop_front() {
                self.process(inbound).await;
            }
            if self.eof {
                break;
            }
            tokio::select! {
                read = stream.recv() => self.ingest(read),
                () = wait_closed(&mut closed) => break,
            }
        }
        self.shared.mark_closed();
        tracing::debug!(stream_id = %self.shared.id, "reader stopped");
    }

    fn ingest(&mut self, read: Result<Option<Vec<u8>>, S::Error>) {
        match read {
            Ok(Some(bytes)) => {
                self.buffer.extend(&bytes);
                self.drain_lines();
            }
            Ok(None) => {
                tracing::debug!(stream_id = %self.shared.id, "peer closed the stream");
                self.eof = true;
            }
            Err(e) => {
                tracing::warn!(stream_id = %self.shared.id, error = %e, "receive failed");
                self.eof = true;
            }
        }
    }

    fn drain_lines(&mut self) {
        loop {
            match self.buffer.next_line() {
                Ok(Some(line)) => self.classify(&line),
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(stream_id = %self.shared.id, error = %e, "line dropped");
                }
            }
        }
    }

    fn classify(&mut self, line: &str) {
        match Frame::parse(line, &self.shared.config.decode) {
            Ok(None) => {}
            Ok(Some(Frame::Command(command))) => {
                tracing::debug!(
                    stream_id = %self.shared.id,
                    command = %command.name,
                    async_call = command.async_call,
                    "command received"
                );
                self.backlog.push_back(Inbound::Command(command));
            }
            Ok(Some(Frame::Response(response))) => {
                let code = response.code;
                match self.shared.pending.resolve(response.into()) {
                    Delivery::Delivered => {}
                    Delivery::Stale => {
                        tracing::debug!(stream_id = %self.shared.id, %code, "late response to abandoned call dropped");
                    }
                    Delivery::Unmatched => {
                        tracing::warn!(stream_id = %self.shared.id, %code, "unmatched response dropped");
                    }
                }
            }
            Err(e @ FrameError::MalformedCommand { .. }) => {
                self.backlog.push_back(Inbound::Malformed(e));
            }
            Err(e) => {
                tracing::debug!(stream_id = %self.shared.id, error = %e, "frame dropped");
            }
        }
    }

    async fn process(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Malformed(e) => {
                tracing::debug!(stream_id = %self.shared.id, error = %e, "replying with parse error");
                self.respond(ResponseFrame::error(ErrorCode::ParseError, e.to_string()));
            }
            Inbound::Command(command) if command.async_call => self.spawn_async(command),
            Inbound::Command(command) => {
                let response = self.run_sync(command).await;
                self.respond(response);
            }
        }
    }

    async fn run_sync(&mut self, command: CommandFrame) -> ResponseFrame {
        let CommandFrame { name, args, .. } = command;
        let dispatcher = Arc::clone(&self.dispatcher);
        let task_name = name.clone();
        let mut task = tokio::task::spawn_blocking(move || {
            let _scope = HandlerScope::enter();
            dispatcher.dispatch(&task_name, args)
        });

        let stream = Arc::clone(&self.stream);
        let joined = loop {
            if self.eof {
                break (&mut task).await;
            }
            tokio::select! {
                joined = &mut task => break joined,
                read = stream.recv() => self.ingest(read),
            }
        };
        response_for(&name, joined)
    }

    fn spawn_async(&self, command: CommandFrame) {
        let CommandFrame { name, args, .. } = command;
        let dispatcher = Arc::clone(&self.dispatcher);
        let stream_id = self.shared.id;
        tokio::task::spawn_blocking(move || {
            let _scope = HandlerScope::enter();
            if let Err(e) = dispatcher.dispatch(&name, args) {
                tracing::debug!(%stream_id, command = %name, error = %e, "async command failed");
            }
        });
    }

    fn respond(&self, response: ResponseFrame) {
        if self.shared.send(Outbound::Line(response.encode())).is_err() {
            tracing::debug!(stream_id = %self.shared.id, "response dropped, connection closed");
        }
    }
}

fn response_for(
    command: &str,
    joined: Result<Result<Value, DispatchError>, JoinError>,
) -> ResponseFrame {
    match joined {
        Ok(Ok(value)) => ResponseFrame::ok(value),
        Ok(Err(e)) => {
            tracing::debug!(%command, error = %e, "command failed");
            ResponseFrame::error(ErrorCode::SystemError, e.to_string())
        }
        Err(e) => {
            tracing::error!(%command, error = %e, "command did not complete");
            let message = if e.is_panic() {
                DispatchError::Panicked(command.to_string()).to_string()
            } else {
                format!("command {command} was cancelled")
            };
            ResponseFrame::error(ErrorCode::SystemError, message)
        }
    }
}
