//! TCP front end of the receive side.
//!
//! ```text
//!  conn task (source 0) ─┐
//!  conn task (source 1) ─┼─► ServerCommand ──► dispatch task ──► StreamEvent ──► consumer
//!  ServerHandle ─────────┘                     (FrameDispatcher)
//! ```
//!
//! Every accepted connection gets its own source index. Only the dispatch
//! task touches the [`FrameDispatcher`]; connections talk to it over an
//! mpsc channel.

use std::collections::HashMap;
use std::net::SocketAddr;

use bytes::Bytes;
use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::codec::PxsCodec;
use crate::error::PxsError;
use crate::event::{self, StreamEvent, StreamEventReceiver, StreamEventSender};
use crate::message::MessageType;
use crate::packet::Message;
use crate::protocol::{Segment, SizeHints, View};
use crate::receive::{DispatcherConfig, FrameDispatcher, SourceIndex};
use crate::send::{FramedTransport, Transport};

// ── Commands ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Source,
    Observer,
}

#[derive(Debug)]
enum ServerCommand {
    Connected {
        source: SourceIndex,
        cancel: CancellationToken,
    },
    Open {
        source: SourceIndex,
        stream_id: String,
        role: Role,
    },
    Segment {
        source: SourceIndex,
        stream_id: String,
        segment: Segment,
    },
    Finish {
        source: SourceIndex,
        stream_id: String,
    },
    Left {
        source: SourceIndex,
    },
    Forward(StreamEvent),
    RequestFrame(String),
}

// ── ServerHandle ─────────────────────────────────────────────────

/// Consumer-side control of a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<ServerCommand>,
    shutdown: CancellationToken,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Ask for the next frame of `stream_id`.
    pub fn request_frame(&self, stream_id: &str) -> Result<(), PxsError> {
        self.commands
            .send(ServerCommand::RequestFrame(stream_id.to_string()))
            .map_err(|_| PxsError::ChannelClosed)
    }

    /// Stop accepting, drop every connection and end the event stream.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

// ── StreamServer ─────────────────────────────────────────────────

pub struct StreamServer {
    listener: TcpListener,
    config: DispatcherConfig,
}

impl StreamServer {
    pub async fn bind(addr: impl ToSocketAddrs, config: DispatcherConfig) -> Result<Self, PxsError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PxsError> {
        Ok(self.listener.local_addr()?)
    }

    /// Start the accept loop and the dispatch task.
    ///
    /// The event receiver yields `None` once the server has shut down.
    pub fn spawn(self) -> Result<(ServerHandle, StreamEventReceiver), PxsError> {
        let local_addr = self.local_addr()?;
        let (events_tx, events_rx) = event::channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let (internal_tx, internal_rx) = event::channel();
        let dispatch = DispatchTask {
            dispatcher: FrameDispatcher::with_config(internal_tx, self.config),
            internal: internal_rx,
            events: events_tx,
            commands: commands_rx,
            connections: HashMap::new(),
            shutdown: shutdown.clone(),
        };
        tokio::spawn(dispatch.run());
        tokio::spawn(accept_loop(self.listener, commands_tx.clone(), shutdown.clone()));
        info!("stream server listening on {local_addr}");

        let handle = ServerHandle {
            commands: commands_tx,
            shutdown,
            local_addr,
        };
        Ok((handle, events_rx))
    }
}

async fn accept_loop(
    listener: TcpListener,
    commands: mpsc::UnboundedSender<ServerCommand>,
    shutdown: CancellationToken,
) {
    let mut next_source: SourceIndex = 0;
    loop {
        let accept = tokio::select! {
            result = listener.accept() => result,
            _ = shutdown.cancelled() => break,
        };

        let (socket, peer) = match accept {
            Ok(pair) => pair,
            Err(e) => {
                warn!("accept error: {e}");
                continue;
            }
        };
        if let Err(e) = socket.set_nodelay(true) {
            debug!("set_nodelay failed for {peer}: {e}");
        }

        let source = next_source;
        next_source += 1;
        let cancel = shutdown.child_token();
        if commands
            .send(ServerCommand::Connected {
                source,
                cancel: cancel.clone(),
            })
            .is_err()
        {
            break;
        }

        debug!(source, "connection from {peer}");
        let connection = Connection::new(socket, source, commands.clone(), cancel);
        tokio::spawn(connection.run());
    }
    debug!("accept loop stopped");
}

// ── Connection task ──────────────────────────────────────────────

struct Connection {
    reader: FramedRead<tokio::net::tcp::OwnedReadHalf, PxsCodec>,
    writer: FramedTransport<tokio::net::tcp::OwnedWriteHalf>,
    source: SourceIndex,
    commands: mpsc::UnboundedSender<ServerCommand>,
    cancel: CancellationToken,
    opened: Option<(String, Role)>,
    view: View,
}

impl Connection {
    fn new(
        socket: TcpStream,
        source: SourceIndex,
        commands: mpsc::UnboundedSender<ServerCommand>,
        cancel: CancellationToken,
    ) -> Self {
        let (read, write) = socket.into_split();
        Self {
            reader: FramedRead::new(read, PxsCodec),
            writer: FramedTransport::new(write),
            source,
            commands,
            cancel,
            opened: None,
            view: View::Mono,
        }
    }

    async fn run(mut self) {
        loop {
            let next = tokio::select! {
                message = self.reader.next() => message,
                _ = self.cancel.cancelled() => {
                    debug!(source = self.source, "connection cancelled");
                    break;
                }
            };

            let result = match next {
                Some(Ok(message)) => self.handle(message).await,
                Some(Err(e)) => Err(e),
                None => {
                    trace!(source = self.source, "connection closed by peer");
                    break;
                }
            };

            match result {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    warn!(source = self.source, "dropping connection: {e}");
                    break;
                }
            }
        }

        let _ = self.commands.send(ServerCommand::Left {
            source: self.source,
        });
    }

    /// Route one message. `Ok(false)` ends the connection.
    async fn handle(&mut self, message: Message) -> Result<bool, PxsError> {
        let stream_id = message.stream_id().to_string();
        match message.message_type() {
            kind @ (MessageType::PixelStreamOpen | MessageType::ObserverOpen) => {
                if let Some((open, _)) = &self.opened {
                    warn!(source = self.source, stream = %open, "second open on one connection ignored");
                    return Ok(true);
                }
                let role = if kind == MessageType::PixelStreamOpen {
                    Role::Source
                } else {
                    Role::Observer
                };
                match message.protocol_version() {
                    Some(version) => debug!(stream = %stream_id, source = self.source, version, "{kind}"),
                    None => debug!(stream = %stream_id, source = self.source, "{kind} without version"),
                }
                self.opened = Some((stream_id.clone(), role));
                self.command(ServerCommand::Open {
                    source: self.source,
                    stream_id,
                    role,
                })?;
            }
            MessageType::PixelStream => {
                if !self.is_source_of(&stream_id) {
                    trace!(stream = %stream_id, source = self.source, "segment outside an open stream");
                    return Ok(true);
                }
                let segment = Segment::from_payload(message.into_payload(), self.view)?;
                self.command(ServerCommand::Segment {
                    source: self.source,
                    stream_id,
                    segment,
                })?;
            }
            MessageType::PixelStreamFinishFrame => {
                if self.is_source_of(&stream_id) {
                    self.command(ServerCommand::Finish {
                        source: self.source,
                        stream_id,
                    })?;
                }
            }
            MessageType::ImageView => {
                self.view = View::from_bytes(message.payload())?;
            }
            MessageType::Quit => {
                debug!(stream = %stream_id, source = self.source, "quit");
                return Ok(false);
            }
            MessageType::SizeHints => {
                let hints = SizeHints::decode(message.payload())?;
                self.command(ServerCommand::Forward(StreamEvent::SizeHintsReceived {
                    stream_id,
                    hints,
                }))?;
            }
            MessageType::Data => {
                let data: Bytes = message.into_payload();
                self.command(ServerCommand::Forward(StreamEvent::DataReceived {
                    stream_id,
                    data,
                }))?;
            }
            kind @ (MessageType::BindEvents | MessageType::BindEventsEx) => {
                let exclusive = kind == MessageType::BindEventsEx;
                self.command(ServerCommand::Forward(StreamEvent::EventsBound {
                    stream_id: stream_id.clone(),
                    exclusive,
                }))?;
                self.writer
                    .send(Message::bind_events_reply(&stream_id, true)?, true)
                    .await?;
            }
            kind @ (MessageType::BindEventsReply | MessageType::Event) => {
                trace!(stream = %stream_id, source = self.source, "unexpected {kind} ignored");
            }
        }
        Ok(true)
    }

    fn is_source_of(&self, stream_id: &str) -> bool {
        matches!(&self.opened, Some((id, Role::Source)) if id == stream_id)
    }

    fn command(&self, command: ServerCommand) -> Result<(), PxsError> {
        self.commands.send(command).map_err(|_| PxsError::ChannelClosed)
    }
}

// ── Dispatch task ────────────────────────────────────────────────

#[derive(Debug)]
struct Registration {
    cancel: CancellationToken,
    opened: Option<(String, Role)>,
}

struct DispatchTask {
    dispatcher: FrameDispatcher,
    /// Events raised by the dispatcher, inspected before forwarding.
    internal: StreamEventReceiver,
    events: StreamEventSender,
    commands: mpsc::UnboundedReceiver<ServerCommand>,
    connections: HashMap<SourceIndex, Registration>,
    shutdown: CancellationToken,
}

impl DispatchTask {
    async fn run(mut self) {
        loop {
            let command = tokio::select! {
                command = self.commands.recv() => command,
                _ = self.shutdown.cancelled() => break,
            };
            let Some(command) = command else {
                break;
            };

            self.apply(command);
            self.forward_events();
        }
        debug!("dispatch task stopped");
    }

    fn apply(&mut self, command: ServerCommand) {
        match command {
            ServerCommand::Connected { source, cancel } => {
                self.connections.insert(
                    source,
                    Registration {
                        cancel,
                        opened: None,
                    },
                );
            }
            ServerCommand::Open {
                source,
                stream_id,
                role,
            } => {
                match role {
                    Role::Source => self.dispatcher.add_source(&stream_id, source),
                    Role::Observer => self.dispatcher.add_observer(&stream_id),
                }
                if let Some(registration) = self.connections.get_mut(&source) {
                    registration.opened = Some((stream_id, role));
                }
            }
            ServerCommand::Segment {
                source,
                stream_id,
                segment,
            } => self.dispatcher.process_segment(&stream_id, source, segment),
            ServerCommand::Finish { source, stream_id } => {
                self.dispatcher.process_frame_finished(&stream_id, source)
            }
            ServerCommand::Left { source } => {
                let Some(registration) = self.connections.remove(&source) else {
                    return;
                };
                match registration.opened {
                    Some((stream_id, Role::Source)) => {
                        self.dispatcher.remove_source(&stream_id, source)
                    }
                    Some((stream_id, Role::Observer)) => {
                        self.dispatcher.remove_observer(&stream_id)
                    }
                    None => {}
                }
            }
            ServerCommand::Forward(event) => {
                let _ = self.events.send(event);
            }
            ServerCommand::RequestFrame(stream_id) => self.dispatcher.request_frame(&stream_id),
        }
    }

    fn forward_events(&mut self) {
        while let Ok(event) = self.internal.try_recv() {
            if let StreamEvent::BufferExceeded(stream_id) = &event {
                self.cancel_sources(stream_id);
            }
            // consumer may be gone; keep dispatching regardless
            let _ = self.events.send(event);
        }
    }

    /// Drop every producer connection of `stream_id`.
    fn cancel_sources(&self, stream_id: &str) {
        for (source, registration) in &self.connections {
            if matches!(&registration.opened, Some((id, Role::Source)) if id == stream_id) {
                info!(stream = %stream_id, source, "closing producer after buffer overflow");
                registration.cancel.cancel();
            }
        }
    }
}
