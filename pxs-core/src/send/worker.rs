//! Per-stream send worker.
//!
//! A single tokio task executes requests in the order they were queued.
//! Each request is a short list of [`Task`]s and resolves its
//! [`SendFuture`] with the first failure, or success once every task ran.
//!
//! Finish requests are held back: once one is dequeued the worker keeps
//! draining the queue without blocking, executing everything that was
//! queued before the finish, and only sends the finish when nothing older
//! is left. Requests queued after it wait until the finish is out.
//!
//! ```text
//! enqueue_* ──► mpsc ──► recv_many ──┬─► execute ──► Transport
//!                                    └─► held finish (until queue is empty)
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::PxsError;
use crate::header::validate_stream_id;
use crate::packet::Message;
use crate::protocol::{ImageWrapper, Segment, SizeHints, View};
use crate::send::future::{Promise, SendFuture};
use crate::send::segmenter::{DEFAULT_SEGMENT_SIZE, DEFAULT_SMALL_IMAGE_SIZE, ImageSegmenter};
use crate::send::transport::Transport;

/// Encoded tiles allowed ahead of the transport.
const SEGMENT_QUEUE_DEPTH: usize = 4;

// ── Configuration ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SendWorkerConfig {
    /// Nominal tile edge, in pixels.
    pub segment_size: u32,
    /// Images within this edge length are sent as one segment.
    pub small_image_size: u32,
    /// Upper bound on requests dequeued per wake-up.
    pub batch_size: usize,
    /// Resolve small-image requests as soon as they are queued.
    pub optimistic_small_images: bool,
}

impl Default for SendWorkerConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            small_image_size: DEFAULT_SMALL_IMAGE_SIZE,
            batch_size: 16,
            optimistic_small_images: true,
        }
    }
}

// ── Requests ─────────────────────────────────────────────────────

/// One unit of work inside a request.
#[derive(Debug)]
enum Task {
    Segment(Segment),
    Image(ImageWrapper),
    Finish,
    Message(Message),
}

#[derive(Debug)]
struct Request {
    sequence: u64,
    tasks: Vec<Task>,
    promise: Option<Promise>,
    is_finish: bool,
}

impl Request {
    fn resolve(self, result: Result<(), PxsError>) {
        if let Some(promise) = self.promise {
            promise.resolve(result);
        }
    }
}

#[derive(Debug)]
enum Command {
    Request(Request),
    Wake,
}

// ── StreamSendWorker ─────────────────────────────────────────────

pub struct StreamSendWorker {
    stream_id: String,
    config: SendWorkerConfig,
    segmenter: Arc<ImageSegmenter>,
    commands: mpsc::UnboundedSender<Command>,
    sequence: AtomicU64,
    pending_finish: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl StreamSendWorker {
    /// Start a worker for `stream_id` on the current tokio runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        stream_id: impl Into<String>,
        config: SendWorkerConfig,
    ) -> Result<Self, PxsError> {
        Self::spawn_with_segmenter(transport, stream_id, config, None)
    }

    /// Like [`spawn`](Self::spawn), with a custom segmenter (e.g. another
    /// compressor). The config's tile sizes override the segmenter's.
    pub fn spawn_with_segmenter(
        transport: Arc<dyn Transport>,
        stream_id: impl Into<String>,
        config: SendWorkerConfig,
        segmenter: Option<ImageSegmenter>,
    ) -> Result<Self, PxsError> {
        let stream_id = stream_id.into();
        validate_stream_id(&stream_id)?;

        let mut segmenter = segmenter
            .unwrap_or_default()
            .with_small_image_size(config.small_image_size);
        segmenter.set_nominal_segment_dimensions(config.segment_size, config.segment_size);
        let segmenter = Arc::new(segmenter);

        let (tx, rx) = mpsc::unbounded_channel();
        let pending_finish = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(true));

        let worker = WorkerLoop {
            stream_id: stream_id.clone(),
            transport,
            segmenter: Arc::clone(&segmenter),
            commands: rx,
            pending_finish: Arc::clone(&pending_finish),
            running: Arc::clone(&running),
            batch_size: config.batch_size.max(1),
            held_finish: None,
            postponed: VecDeque::new(),
            current_view: View::Mono,
        };
        let handle = tokio::spawn(worker.run());
        debug!(stream = %stream_id, "send worker started");

        Ok(Self {
            stream_id,
            config,
            segmenter,
            commands: tx,
            sequence: AtomicU64::new(0),
            pending_finish,
            running,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// A finish was queued and has not been sent yet.
    pub fn has_pending_finish(&self) -> bool {
        self.pending_finish.load(Ordering::SeqCst)
    }

    // ── Enqueue operations ───────────────────────────────────────

    /// Queue an image, optionally followed by a finish marker.
    ///
    /// Fails immediately if a finish is pending or the image is invalid.
    pub fn enqueue_image(&self, image: ImageWrapper, finish: bool) -> SendFuture {
        if self.has_pending_finish() {
            return SendFuture::ready(Err(PxsError::PendingFinish));
        }
        if let Err(e) = image.validate() {
            return SendFuture::ready(Err(e));
        }

        if !self.segmenter.is_small(&image) {
            let mut tasks = vec![Task::Image(image)];
            if finish {
                tasks.push(Task::Finish);
            }
            return self.enqueue_request(tasks, false);
        }

        // small images are segmented right here
        let segment = match self.segmenter.create_single_segment(&image) {
            Ok(segment) => segment,
            Err(e) => return SendFuture::ready(Err(e)),
        };

        if !self.config.optimistic_small_images {
            let mut tasks = vec![Task::Segment(segment)];
            if finish {
                tasks.push(Task::Finish);
            }
            return self.enqueue_request(tasks, false);
        }

        if let Err(e) = self.push(vec![Task::Segment(segment)], None, false) {
            return SendFuture::ready(Err(e));
        }
        if finish {
            // the finish still runs through the deferral protocol
            return self.enqueue_finish();
        }
        SendFuture::ready(Ok(()))
    }

    /// Queue a frame-finished marker.
    pub fn enqueue_finish(&self) -> SendFuture {
        if self.pending_finish.swap(true, Ordering::SeqCst) {
            return SendFuture::ready(Err(PxsError::AlreadyPendingFinish));
        }
        self.enqueue_request(vec![Task::Finish], true)
    }

    pub fn enqueue_open(&self) -> SendFuture {
        self.enqueue_message(Message::open(&self.stream_id))
    }

    pub fn enqueue_observer_open(&self) -> SendFuture {
        self.enqueue_message(Message::observer_open(&self.stream_id))
    }

    pub fn enqueue_close(&self) -> SendFuture {
        self.enqueue_message(Message::quit(&self.stream_id))
    }

    pub fn enqueue_bind_request(&self, exclusive: bool) -> SendFuture {
        self.enqueue_message(Message::bind_events(&self.stream_id, exclusive))
    }

    pub fn enqueue_size_hints(&self, hints: &SizeHints) -> SendFuture {
        self.enqueue_message(Message::size_hints(&self.stream_id, hints))
    }

    pub fn enqueue_data(&self, data: Bytes) -> SendFuture {
        self.enqueue_message(Message::data(&self.stream_id, data))
    }

    fn enqueue_message(&self, message: Result<Message, PxsError>) -> SendFuture {
        match message {
            Ok(message) => self.enqueue_request(vec![Task::Message(message)], false),
            Err(e) => SendFuture::ready(Err(e)),
        }
    }

    fn enqueue_request(&self, tasks: Vec<Task>, is_finish: bool) -> SendFuture {
        let (promise, future) = SendFuture::pending();
        match self.push(tasks, Some(promise), is_finish) {
            Ok(()) => future,
            Err(e) => SendFuture::ready(Err(e)),
        }
    }

    fn push(
        &self,
        tasks: Vec<Task>,
        promise: Option<Promise>,
        is_finish: bool,
    ) -> Result<(), PxsError> {
        if !self.is_running() {
            return Err(PxsError::WorkerStopped);
        }
        let request = Request {
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst),
            tasks,
            promise,
            is_finish,
        };
        self.commands
            .send(Command::Request(request))
            .map_err(|_| PxsError::WorkerStopped)
    }

    // ── Shutdown ─────────────────────────────────────────────────

    /// Stop the worker and wait for it to exit.
    ///
    /// A request already being executed runs to completion; everything
    /// still queued resolves with [`PxsError::WorkerStopped`].
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Wake);

        // Held across the join so concurrent callers also wait for exit.
        // The handle is only cleared once joined, so a cancelled stop()
        // leaves it for the next caller.
        let mut handle = self.handle.lock().await;
        if let Some(task) = handle.as_mut() {
            if let Err(e) = task.await {
                warn!(stream = %self.stream_id, "send worker panicked: {e}");
            }
            *handle = None;
            debug!(stream = %self.stream_id, "send worker stopped");
        }
    }
}

impl Drop for StreamSendWorker {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.commands.send(Command::Wake);
    }
}

impl std::fmt::Debug for StreamSendWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSendWorker")
            .field("stream_id", &self.stream_id)
            .field("running", &self.is_running())
            .field("pending_finish", &self.has_pending_finish())
            .finish()
    }
}

// ── Worker loop ──────────────────────────────────────────────────

struct WorkerLoop {
    stream_id: String,
    transport: Arc<dyn Transport>,
    segmenter: Arc<ImageSegmenter>,
    commands: mpsc::UnboundedReceiver<Command>,
    pending_finish: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    batch_size: usize,
    held_finish: Option<Request>,
    /// Requests queued after the held finish.
    postponed: VecDeque<Request>,
    current_view: View,
}

impl WorkerLoop {
    async fn run(mut self) {
        let mut batch = Vec::with_capacity(self.batch_size);

        while self.running.load(Ordering::SeqCst) {
            if self.held_finish.is_none() {
                if self.commands.recv_many(&mut batch, self.batch_size).await == 0 {
                    break;
                }
            } else {
                while batch.len() < self.batch_size {
                    match self.commands.try_recv() {
                        Ok(command) => batch.push(command),
                        Err(_) => break,
                    }
                }
                if batch.is_empty() {
                    self.release_finish().await;
                    continue;
                }
            }

            for command in batch.drain(..) {
                if let Command::Request(request) = command {
                    self.dispatch(request).await;
                }
            }
        }

        self.shutdown();
    }

    async fn dispatch(&mut self, request: Request) {
        if !self.running.load(Ordering::SeqCst) {
            request.resolve(Err(PxsError::WorkerStopped));
            return;
        }

        let held = self.held_finish.as_ref().map(|r| r.sequence);
        match held {
            Some(sequence) if request.sequence > sequence => {
                self.postponed.push_back(request);
            }
            Some(_) if request.is_finish => {
                request.resolve(Err(PxsError::AlreadyPendingFinish));
            }
            None if request.is_finish => {
                trace!(stream = %self.stream_id, "holding finish until queue drains");
                self.held_finish = Some(request);
            }
            _ => self.execute(request).await,
        }
    }

    /// Send the held finish, then whatever was queued behind it.
    async fn release_finish(&mut self) {
        if let Some(finish) = self.held_finish.take() {
            self.execute(finish).await;
            self.pending_finish.store(false, Ordering::SeqCst);
        }

        while self.held_finish.is_none() {
            let Some(request) = self.postponed.pop_front() else {
                break;
            };
            self.dispatch(request).await;
        }
    }

    async fn execute(&mut self, request: Request) {
        let Request { tasks, promise, .. } = request;

        let mut result = Ok(());
        for task in tasks {
            if let Err(e) = self.run_task(task).await {
                result = Err(e);
                break;
            }
        }

        match (promise, result) {
            (Some(promise), result) => promise.resolve(result),
            (None, Err(e)) => {
                warn!(stream = %self.stream_id, "optimistic send failed: {e}");
            }
            (None, Ok(())) => {}
        }
    }

    async fn run_task(&mut self, task: Task) -> Result<(), PxsError> {
        match task {
            Task::Segment(segment) => self.send_segment(segment).await,
            Task::Image(image) => self.send_image(image).await,
            Task::Finish => self.send(Message::finish_frame(&self.stream_id)?).await,
            Task::Message(message) => self.send(message).await,
        }
    }

    /// Segment on a blocking thread and send each tile as soon as it is
    /// encoded. A failed send closes the channel, which stops the
    /// segmenter at its next tile.
    async fn send_image(&mut self, image: ImageWrapper) -> Result<(), PxsError> {
        let segmenter = Arc::clone(&self.segmenter);
        let (tx, mut rx) = mpsc::channel(SEGMENT_QUEUE_DEPTH);
        let generator = tokio::task::spawn_blocking(move || {
            segmenter.generate(&image, |segment| {
                tx.blocking_send(segment)
                    .map_err(|_| PxsError::ChannelClosed)
            })
        });

        let mut sent = Ok(());
        while let Some(segment) = rx.recv().await {
            let result = match segment {
                Ok(segment) => self.send_segment(segment).await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                sent = Err(e);
                break;
            }
        }
        drop(rx);

        let generated = generator
            .await
            .map_err(|e| PxsError::Other(format!("segmentation task failed: {e}")))?;
        sent?;
        generated
    }

    async fn send_segment(&mut self, segment: Segment) -> Result<(), PxsError> {
        if segment.view != self.current_view {
            self.send(Message::image_view(&self.stream_id, segment.view)?)
                .await?;
            self.current_view = segment.view;
        }
        self.send(Message::pixel_stream(&self.stream_id, &segment)?)
            .await
    }

    async fn send(&self, message: Message) -> Result<(), PxsError> {
        let wait = message.message_type().waits_for_bytes_written();
        self.transport.send(message, wait).await
    }

    fn shutdown(&mut self) {
        self.commands.close();

        let mut failed = 0usize;
        while let Ok(command) = self.commands.try_recv() {
            if let Command::Request(request) = command {
                request.resolve(Err(PxsError::WorkerStopped));
                failed += 1;
            }
        }
        for request in self.postponed.drain(..).chain(self.held_finish.take()) {
            request.resolve(Err(PxsError::WorkerStopped));
            failed += 1;
        }
        self.pending_finish.store(false, Ordering::SeqCst);

        if failed > 0 {
            debug!(stream = %self.stream_id, failed, "outstanding requests failed on stop");
        }
    }
}
