// tests/session_live.rs
// Live mode against a scripted stream source: retries, validation, shutdown, drain.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use topic_pulse::sink::{MemoryWriter, SinkAdapter};
use topic_pulse::stream::{StreamHandle, StreamMessage, StreamSource};
use topic_pulse::{
    Pipeline, PipelineContext, RetryPolicy, SessionError, SessionState, TaskQueue,
    TrustedSourceSet, Vocabulary,
};

enum Step {
    Refuse,
    Open {
        payloads: Vec<String>,
        fail_after: bool,
    },
}

#[derive(Default)]
struct FakeStream {
    steps: Mutex<VecDeque<Step>>,
    tracks: Mutex<Vec<String>>,
    open: Mutex<Vec<mpsc::Sender<StreamMessage>>>,
}

impl FakeStream {
    fn with_steps(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        })
    }
}

#[async_trait]
impl StreamSource for FakeStream {
    async fn connect(&self, track: &str) -> Result<StreamHandle> {
        self.tracks.lock().unwrap().push(track.to_string());
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Refuse);
        match step {
            Step::Refuse => Err(anyhow!("401 from stream endpoint")),
            Step::Open {
                payloads,
                fail_after,
            } => {
                let (tx, handle) = StreamHandle::channel(payloads.len() + 1);
                for p in payloads {
                    tx.send(StreamMessage::Data(p)).await.unwrap();
                }
                if fail_after {
                    tx.send(StreamMessage::Error(anyhow!("connection reset")))
                        .await
                        .unwrap();
                } else {
                    self.open.lock().unwrap().push(tx);
                }
                Ok(handle)
            }
        }
    }
    fn name(&self) -> &'static str {
        "fake"
    }
}

fn payload(id: u32, author: &str, text: &str) -> String {
    serde_json::json!({ "id_str": id.to_string(), "text": text, "user": { "screen_name": author } })
        .to_string()
}

fn pipeline(writer: Arc<MemoryWriter>) -> Pipeline {
    let ctx = PipelineContext::new(
        Vocabulary::from_terms(["api", "api design"]),
        TrustedSourceSet::from_handles(["@friendly_dev"]),
        SinkAdapter::new(writer, "events"),
    )
    .unwrap();
    let (queue, _worker) = TaskQueue::start();
    Pipeline::new(ctx, queue)
}

async fn wait_for_points(writer: &MemoryWriter, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while writer.points().len() < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("points never arrived");
}

#[tokio::test]
async fn reconnects_then_streams_until_shutdown() {
    let writer = Arc::new(MemoryWriter::default());
    let p = pipeline(writer.clone());
    let source = FakeStream::with_steps(vec![
        Step::Refuse,
        Step::Refuse,
        Step::Open {
            payloads: vec![
                payload(1, "friendly_dev", "API design review today"),
                "{not json".to_string(),
                payload(2, "someone", "coffee"),
                payload(3, "someone", "new api docs"),
            ],
            fail_after: false,
        },
    ]);

    let mut session = p.live_session(source.clone(), RetryPolicy::immediate(5));
    let stop = session.shutdown_handle();
    let run = tokio::spawn(async move {
        let outcome = session.run().await;
        (outcome, session)
    });

    wait_for_points(&writer, 2).await;
    stop.notify_one();
    let (outcome, session) = run.await.unwrap();

    assert!(outcome.is_ok());
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.attempt_count(), 0);
    assert_eq!(
        source.tracks.lock().unwrap().as_slice(),
        &["api,api design", "api,api design", "api,api design"]
    );

    p.queue().wait_idle().await;
    let points = writer.points();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0].tags.get("keywords").map(String::as_str), Some("api,api design"));
    assert_eq!(points[1].tags.get("keywords").map(String::as_str), Some("api"));
}

#[tokio::test]
async fn exhausted_retries_fail_but_queued_work_drains() {
    let writer = Arc::new(MemoryWriter::default());
    let p = pipeline(writer.clone());
    let source = FakeStream::with_steps(vec![Step::Open {
        payloads: vec![
            payload(10, "someone", "api outage"),
            payload(11, "someone", "api fixed"),
        ],
        fail_after: true,
    }]);

    let mut session = p.live_session(source.clone(), RetryPolicy::immediate(5));
    let outcome = session.run().await;

    match outcome {
        Err(SessionError::RetriesExhausted { attempts, .. }) => assert_eq!(attempts, 6),
        other => panic!("expected retries exhausted, got {other:?}"),
    }
    assert_eq!(session.state(), SessionState::Failed);
    // one open plus five refused reconnects
    assert_eq!(source.tracks.lock().unwrap().len(), 6);

    p.queue().wait_idle().await;
    assert_eq!(writer.points().len(), 2);
}
