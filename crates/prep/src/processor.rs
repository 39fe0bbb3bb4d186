//! Single-threaded admission loop.
//!
//! Producers submit requests from any task without blocking; one worker
//! prepares them strictly in submission order and forwards each, prepared or
//! failed, to the next pipeline stage. A shutdown marker makes the worker
//! stop after every request queued before it.
//!
//! ## Failure handling
//!
//! A request never takes the loop down. Recognized and unrecognized
//! failures are recorded on the request by the synthesizer; a panic inside
//! preparation is caught, logged with the raw payload, and recorded as an
//! internal failure before the request is forwarded.

use std::{
    any::Any,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use snafu::Snafu;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info};

use crate::{request::Request, synthesizer::TxnSynthesizer};

/// Error returned when the admission loop no longer accepts requests.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SubmitError {
    /// The worker has stopped.
    #[snafu(display("Admission loop is shut down"))]
    Closed,
}

/// Next pipeline stage, receiving every request after preparation.
pub trait NextProcessor: Send + Sync {
    /// Takes ownership of a prepared request.
    fn process_request(&self, request: Request);

    /// Called once after the worker has drained its queue.
    fn shutdown(&self) {}
}

/// [`NextProcessor`] that forwards prepared requests into a channel.
#[derive(Debug, Clone)]
pub struct ChannelNextProcessor {
    tx: mpsc::UnboundedSender<Request>,
}

impl ChannelNextProcessor {
    /// Creates the processor and the receiving end of its channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Request>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NextProcessor for ChannelNextProcessor {
    fn process_request(&self, request: Request) {
        if self.tx.send(request).is_err() {
            debug!("Next stage receiver dropped; discarding prepared request");
        }
    }
}

enum Envelope {
    Request(Box<Request>),
    Shutdown,
}

/// Cloneable submission handle for a running admission loop.
#[derive(Clone)]
pub struct PrepHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl std::fmt::Debug for PrepHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrepHandle").field("closed", &self.tx.is_closed()).finish()
    }
}

impl PrepHandle {
    /// Queues `request` for preparation. Never blocks.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Closed`] if the worker has stopped.
    pub fn submit(&self, request: Request) -> Result<(), SubmitError> {
        self.tx.send(Envelope::Request(Box::new(request))).map_err(|_| SubmitError::Closed)
    }

    /// Asks the worker to stop once every request queued so far has been
    /// forwarded.
    ///
    /// # Errors
    ///
    /// Returns [`SubmitError::Closed`] if the worker has already stopped.
    pub fn shutdown(&self) -> Result<(), SubmitError> {
        self.tx.send(Envelope::Shutdown).map_err(|_| SubmitError::Closed)
    }
}

/// Admission loop serializing every request through one synthesizer.
#[derive(bon::Builder)]
pub struct PrepProcessor {
    synthesizer: Arc<TxnSynthesizer>,
    next: Arc<dyn NextProcessor>,
}

impl PrepProcessor {
    /// Spawns the worker on the current tokio runtime.
    pub fn start(self) -> (PrepHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (PrepHandle { tx }, task)
    }

    async fn run(self, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        info!("Prepare stage started");
        let mut processed: u64 = 0;
        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Request(request) => {
                    self.process(*request);
                    processed += 1;
                },
                Envelope::Shutdown => break,
            }
        }
        rx.close();
        self.next.shutdown();
        info!(processed, "Prepare stage stopped");
    }

    fn process(&self, mut request: Request) {
        let outcome = catch_unwind(AssertUnwindSafe(|| self.synthesizer.prepare(&mut request)));
        if let Err(panic) = outcome {
            let message = panic_message(panic.as_ref());
            error!(
                session = %request.session_id,
                cxid = request.cxid,
                op = %request.op,
                payload = %hex::encode(&request.payload),
                panic = %message,
                "Request preparation panicked"
            );
            self.synthesizer.fail(&mut request, format!("preparation panicked: {message}"));
        }
        self.next.process_request(request);
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use arbor_state::{CommittedTree, InMemoryTree, NodeSnapshot};
    use arbor_test_utils::recv_forwarded;
    use arbor_types::{
        Acl, ErrorCode, OpCode, SessionId, Txn, Zxid,
        requests::{CreateRequest, MultiRequest, Op, SetDataRequest},
    };
    use parking_lot::Mutex;

    use super::*;
    use crate::{
        session::{InMemorySessionTracker, SessionOwner, SessionTracker},
        token::AtomicTokenSource,
    };

    const SESSION: SessionId = SessionId::new(7);

    #[derive(Default)]
    struct Collector {
        requests: Mutex<Vec<Request>>,
        stopped: AtomicBool,
    }

    impl NextProcessor for Collector {
        fn process_request(&self, request: Request) {
            self.requests.lock().push(request);
        }

        fn shutdown(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    /// Tree whose lookups panic for one path.
    struct ExplodingTree {
        inner: InMemoryTree,
    }

    impl CommittedTree for ExplodingTree {
        fn node(&self, path: &str) -> Option<NodeSnapshot> {
            assert_ne!(path, "/boom", "storage fault");
            self.inner.node(path)
        }

        fn ephemerals(&self, session: SessionId) -> std::collections::BTreeSet<String> {
            self.inner.ephemerals(session)
        }

        fn is_reserved_path(&self, path: &str) -> bool {
            self.inner.is_reserved_path(path)
        }

        fn tree_digest(&self) -> u64 {
            self.inner.tree_digest()
        }
    }

    fn synthesizer(tree: Arc<dyn CommittedTree>) -> Arc<TxnSynthesizer> {
        let sessions = Arc::new(InMemorySessionTracker::new());
        sessions.track_session(SESSION, 10_000);
        Arc::new(
            TxnSynthesizer::builder()
                .tree(tree)
                .sessions(sessions)
                .tokens(Arc::new(AtomicTokenSource::new(Zxid::new(0))))
                .build()
                .expect("valid config"),
        )
    }

    fn create(cxid: i32, path: &str) -> Request {
        let body = CreateRequest {
            path: path.into(),
            data: vec![],
            acl: Some(Acl::open_unsafe()),
            flags: 0,
        };
        Request::encoded(SESSION, cxid, OpCode::Create, &body)
            .expect("encode")
            .with_owner(SessionOwner::new(1))
    }

    #[tokio::test]
    async fn test_requests_are_prepared_in_order() {
        let next = Arc::new(Collector::default());
        let processor = PrepProcessor::builder()
            .synthesizer(synthesizer(Arc::new(InMemoryTree::new())))
            .next(next.clone())
            .build();
        let (handle, task) = processor.start();

        let producers: Vec<_> = (0..4)
            .map(|i| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle.submit(create(i, &format!("/n{i}"))).expect("submit");
                })
            })
            .collect();
        for producer in producers {
            producer.await.expect("producer");
        }
        handle.shutdown().expect("shutdown");
        task.await.expect("worker");

        let requests = next.requests.lock();
        assert_eq!(requests.len(), 4);
        let zxids: Vec<u64> =
            requests.iter().map(|r| r.hdr.expect("header").zxid.value()).collect();
        assert_eq!(zxids, vec![1, 2, 3, 4]);
        assert!(requests.iter().all(|r| r.error.is_none()));
        assert!(next.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_loop() {
        let (next, mut rx) = ChannelNextProcessor::new();
        let processor = PrepProcessor::builder()
            .synthesizer(synthesizer(Arc::new(InMemoryTree::new())))
            .next(Arc::new(next))
            .build();
        let (handle, _task) = processor.start();

        let missing = Request::encoded(
            SESSION,
            1,
            OpCode::SetData,
            &SetDataRequest { path: "/missing".into(), data: vec![], version: -1 },
        )
        .expect("encode")
        .with_owner(SessionOwner::new(1));
        handle.submit(missing).expect("submit");
        handle.submit(create(2, "/ok")).expect("submit");

        let failed = rx.recv().await.expect("forwarded");
        assert_eq!(failed.error.expect("failed").code(), ErrorCode::NoNode);
        let ok = rx.recv().await.expect("forwarded");
        assert!(ok.error.is_none());
    }

    fn set_boom(cxid: i32) -> Request {
        Request::encoded(
            SESSION,
            cxid,
            OpCode::SetData,
            &SetDataRequest { path: "/boom".into(), data: vec![], version: -1 },
        )
        .expect("encode")
        .with_owner(SessionOwner::new(1))
    }

    #[tokio::test]
    async fn test_panic_is_recorded_and_loop_continues() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("arbor_prep=debug"))
            .with_test_writer()
            .try_init();
        let tree = Arc::new(ExplodingTree { inner: InMemoryTree::new() });
        let (next, mut rx) = ChannelNextProcessor::new();
        let processor = PrepProcessor::builder()
            .synthesizer(synthesizer(tree))
            .next(Arc::new(next))
            .build();
        let (handle, _task) = processor.start();

        handle.submit(set_boom(1)).expect("submit");
        handle.submit(create(2, "/fine")).expect("submit");

        let requests =
            recv_forwarded(&mut rx, 2, Duration::from_secs(2)).await.expect("both forwarded");
        let hdr = requests[0].hdr.expect("header issued before the panic");
        assert_eq!(hdr.op, OpCode::Error);
        assert_eq!(requests[0].txn, Some(Txn::error(ErrorCode::MarshallingError)));
        assert_eq!(requests[0].zxid, Zxid::new(1));
        assert!(requests[1].error.is_none());
        assert_eq!(requests[1].zxid, Zxid::new(2));
    }

    #[tokio::test]
    async fn test_panicking_batch_leaves_no_pending_changes() {
        let synth = synthesizer(Arc::new(ExplodingTree { inner: InMemoryTree::new() }));
        let (next, mut rx) = ChannelNextProcessor::new();
        let processor =
            PrepProcessor::builder().synthesizer(synth.clone()).next(Arc::new(next)).build();
        let (handle, _task) = processor.start();

        let batch = MultiRequest {
            ops: vec![
                Op::Create(CreateRequest {
                    path: "/a".into(),
                    data: vec![],
                    acl: Some(Acl::open_unsafe()),
                    flags: 0,
                }),
                Op::SetData(SetDataRequest { path: "/boom".into(), data: vec![], version: -1 }),
            ],
        };
        let request = Request::encoded(SESSION, 1, OpCode::Multi, &batch)
            .expect("encode")
            .with_owner(SessionOwner::new(1));
        handle.submit(request).expect("submit");
        handle.submit(create(2, "/b")).expect("submit");

        let requests =
            recv_forwarded(&mut rx, 2, Duration::from_secs(2)).await.expect("both forwarded");
        assert_eq!(requests[0].error.as_ref().expect("failed").code(), ErrorCode::MarshallingError);
        assert_eq!(requests[0].txn, Some(Txn::error(ErrorCode::MarshallingError)));
        assert!(synth.resolver().lookup("/a").is_none());
        assert!(synth.ledger().records().iter().all(|r| r.zxid == Zxid::new(2)));
        assert!(requests[1].error.is_none());
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let (next, _rx) = ChannelNextProcessor::new();
        let processor = PrepProcessor::builder()
            .synthesizer(synthesizer(Arc::new(InMemoryTree::new())))
            .next(Arc::new(next))
            .build();
        let (handle, task) = processor.start();
        handle.shutdown().expect("shutdown");
        task.await.expect("worker");
        assert!(matches!(handle.submit(create(1, "/late")), Err(SubmitError::Closed)));
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(3_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}
