//! Dispatcher integration tests: queue, providers, and the dispatch
//! loop wired together with a stubbed render engine.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use fableworks_comfyui::{ComfyUiApi, EngineApi, EngineError, OutputRef};
use fableworks_core::clock::ManualClock;
use fableworks_core::config::{FamilyDefaults, ModelFamily, WorkerSettings};
use fableworks_core::job::{ImageInput, JobKind, JobPayload, JobState, VoiceInput};
use fableworks_pipeline::providers::ImageProvider;
use fableworks_pipeline::{MediaProvider, ProgressSink, ProviderError, ProviderOutput};
use fableworks_queue::{JobQueue, JobStatus, MemoryStore, RetentionPolicy, RetryPolicy};
use fableworks_worker::JobDispatcher;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Scripted provider behavior for routing-level tests.
enum Behavior {
    Succeed,
    Unavailable,
    Fail(&'static str),
    Panic,
}

struct StubProvider {
    kind: JobKind,
    behavior: Behavior,
    calls: AtomicU32,
}

impl StubProvider {
    fn new(kind: JobKind, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behavior,
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl MediaProvider for StubProvider {
    fn kind(&self) -> JobKind {
        self.kind
    }

    async fn is_available(&self) -> bool {
        !matches!(self.behavior, Behavior::Unavailable)
    }

    async fn generate(
        &self,
        _payload: &JobPayload,
        progress: &dyn ProgressSink,
    ) -> Result<ProviderOutput, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed => {
                progress.report(100).await;
                Ok(ProviderOutput {
                    output_url: Some("http://engine/view?filename=out.png".into()),
                    metadata: json!({ "prompt_id": "p1" }),
                })
            }
            Behavior::Fail(message) => Err(ProviderError::InvalidInput(message.to_string())),
            Behavior::Panic => panic!("stub provider exploded"),
            Behavior::Unavailable => unreachable!("dispatcher must gate on availability"),
        }
    }

    async fn check_status(
        &self,
        _prompt_id: &str,
    ) -> Result<fableworks_comfyui::ExecutionPoll, ProviderError> {
        unreachable!("dispatcher never polls externally")
    }
}

/// Engine stub for the full image path: one submission, output ready
/// under node 9 after two history polls.
struct MockEngine {
    polls: AtomicU32,
    submitted: Mutex<Vec<Value>>,
}

impl MockEngine {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            polls: AtomicU32::new(0),
            submitted: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl EngineApi for MockEngine {
    async fn is_reachable(&self) -> bool {
        true
    }

    async fn submit(&self, graph: &Value) -> Result<String, EngineError> {
        self.submitted.lock().unwrap().push(graph.clone());
        Ok("prompt-77".into())
    }

    async fn history(&self, prompt_id: &str) -> Result<Value, EngineError> {
        if self.polls.fetch_add(1, Ordering::SeqCst) < 2 {
            return Ok(json!({}));
        }
        Ok(json!({
            prompt_id: {
                "outputs": {
                    "9": { "images": [{
                        "filename": "r.png",
                        "subfolder": "",
                        "type": "output",
                    }]}
                }
            }
        }))
    }

    async fn upload_image(&self, filename: &str, _bytes: Vec<u8>) -> Result<String, EngineError> {
        Ok(filename.to_string())
    }

    fn view_url(&self, output: &OutputRef) -> String {
        ComfyUiApi::new("http://engine".into()).view_url(output)
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

fn fast_settings() -> WorkerSettings {
    WorkerSettings {
        poll_interval: Duration::from_millis(5),
        drain_timeout: Duration::from_secs(2),
        ..WorkerSettings::default()
    }
}

fn fast_queue() -> Arc<JobQueue> {
    // millisecond backoff so retry tests finish quickly
    Arc::new(JobQueue::with_policies(
        Arc::new(MemoryStore::new()),
        RetryPolicy {
            base_delay: chrono::Duration::milliseconds(10),
            ..RetryPolicy::default()
        },
        RetentionPolicy::default(),
    ))
}

fn image_payload() -> JobPayload {
    JobPayload::Image(ImageInput {
        prompt: "a pond at dawn".into(),
        negative_prompt: None,
        width: None,
        height: None,
        steps: None,
        guidance: None,
        seed: Some(1),
        reference_image: None,
        denoise: None,
    })
}

fn new_job(payload: JobPayload) -> fableworks_queue::NewJob {
    fableworks_queue::NewJob {
        project_id: "p1".into(),
        user_id: "u1".into(),
        payload,
        priority: None,
        idempotency_key: None,
    }
}

/// Poll until the job settles or the deadline passes.
async fn wait_for_terminal(queue: &JobQueue, id: fableworks_core::types::JobId) -> JobStatus {
    for _ in 0..400 {
        let status = queue.get_status(id).await.unwrap();
        if status.state.is_terminal() {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {id} never settled");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn image_job_runs_end_to_end_through_the_real_provider() {
    let queue = fast_queue();
    let engine = MockEngine::new();
    let provider = Arc::new(ImageProvider::new(
        engine.clone(),
        Arc::new(ManualClock::new()),
        ModelFamily::Sd15,
        FamilyDefaults::for_family(ModelFamily::Sd15),
    ));
    let dispatcher = Arc::new(JobDispatcher::new(
        queue.clone(),
        vec![provider as Arc<dyn MediaProvider>],
        fast_settings(),
        Arc::new(ManualClock::new()),
    ));
    assert!(Arc::clone(&dispatcher).start());

    let id = queue.enqueue(new_job(image_payload())).await.unwrap();
    let status = wait_for_terminal(&queue, id).await;

    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.progress, 100);
    let result = status.result.unwrap();
    assert!(result.success);
    assert!(result
        .output_url
        .as_deref()
        .unwrap()
        .contains("filename=r.png"));
    assert_eq!(result.metadata.unwrap()["prompt_id"], "prompt-77");

    // the submitted graph was a text-to-image sd15 chain
    let submitted = engine.submitted.lock().unwrap().clone();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0]["4"]["class_type"], "CheckpointLoaderSimple");
    assert_eq!(submitted[0]["3"]["inputs"]["denoise"], 1.0);

    dispatcher.stop().await;
}

#[tokio::test]
async fn unknown_kind_fails_permanently_without_retries() {
    let queue = fast_queue();
    // dispatcher routes images only; voice has nowhere to go
    let dispatcher = Arc::new(JobDispatcher::new(
        queue.clone(),
        vec![StubProvider::new(JobKind::Image, Behavior::Succeed) as Arc<dyn MediaProvider>],
        fast_settings(),
        Arc::new(ManualClock::new()),
    ));
    assert!(Arc::clone(&dispatcher).start());

    let id = queue
        .enqueue(new_job(JobPayload::Voice(VoiceInput {
            text: "hello".into(),
            voice_id: "narrator_f1".into(),
            speed: None,
        })))
        .await
        .unwrap();
    let status = wait_for_terminal(&queue, id).await;

    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.attempts, 1);
    assert!(status
        .failed_reason
        .unwrap()
        .contains("Unsupported job type"));

    dispatcher.stop().await;
}

#[tokio::test]
async fn unreachable_engine_exhausts_exactly_three_attempts() {
    let queue = fast_queue();
    let provider = StubProvider::new(JobKind::Image, Behavior::Unavailable);
    let dispatcher = Arc::new(JobDispatcher::new(
        queue.clone(),
        vec![provider.clone() as Arc<dyn MediaProvider>],
        fast_settings(),
        Arc::new(ManualClock::new()),
    ));
    assert!(Arc::clone(&dispatcher).start());

    let id = queue.enqueue(new_job(image_payload())).await.unwrap();
    let status = wait_for_terminal(&queue, id).await;

    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.attempts, 3);
    assert_eq!(
        status.failed_reason.as_deref(),
        Some("Render engine unreachable")
    );
    // generate() was never invoked; the availability gate failed first
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);

    dispatcher.stop().await;
}

#[tokio::test]
async fn provider_panic_becomes_a_failed_result_and_the_loop_survives() {
    let queue = fast_queue();
    let dispatcher = Arc::new(JobDispatcher::new(
        queue.clone(),
        vec![StubProvider::new(JobKind::Image, Behavior::Panic) as Arc<dyn MediaProvider>],
        fast_settings(),
        Arc::new(ManualClock::new()),
    ));
    assert!(Arc::clone(&dispatcher).start());

    let id = queue.enqueue(new_job(image_payload())).await.unwrap();
    let status = wait_for_terminal(&queue, id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status.failed_reason.unwrap().contains("Internal error"));

    // the loop is still alive: a job after the panic is still claimed
    let followup = queue.enqueue(new_job(image_payload())).await.unwrap();
    let followup_status = wait_for_terminal(&queue, followup).await;
    assert_eq!(followup_status.state, JobState::Failed);

    dispatcher.stop().await;
}

#[tokio::test]
async fn provider_error_message_is_preserved_verbatim() {
    let queue = fast_queue();
    let dispatcher = Arc::new(JobDispatcher::new(
        queue.clone(),
        vec![
            StubProvider::new(JobKind::Image, Behavior::Fail("checkpoint file missing"))
                as Arc<dyn MediaProvider>,
        ],
        fast_settings(),
        Arc::new(ManualClock::new()),
    ));
    assert!(Arc::clone(&dispatcher).start());

    let id = queue.enqueue(new_job(image_payload())).await.unwrap();
    let status = wait_for_terminal(&queue, id).await;
    assert_eq!(status.state, JobState::Failed);
    assert!(status
        .failed_reason
        .unwrap()
        .contains("checkpoint file missing"));

    dispatcher.stop().await;
}

#[tokio::test]
async fn start_is_idempotent_and_stop_waits_for_drain() {
    let queue = fast_queue();
    let dispatcher = Arc::new(JobDispatcher::new(
        queue.clone(),
        vec![StubProvider::new(JobKind::Image, Behavior::Succeed) as Arc<dyn MediaProvider>],
        fast_settings(),
        Arc::new(ManualClock::new()),
    ));

    assert!(Arc::clone(&dispatcher).start());
    assert!(!Arc::clone(&dispatcher).start());

    let id = queue.enqueue(new_job(image_payload())).await.unwrap();
    let status = wait_for_terminal(&queue, id).await;
    assert_eq!(status.state, JobState::Completed);

    dispatcher.stop().await;
    // after stop, no further claims: a new job stays waiting
    let parked = queue.enqueue(new_job(image_payload())).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        queue.get_status(parked).await.unwrap().state,
        JobState::Waiting
    );
}

#[tokio::test]
async fn stopped_dispatcher_starts_back_up() {
    let queue = fast_queue();
    let dispatcher = Arc::new(JobDispatcher::new(
        queue.clone(),
        vec![StubProvider::new(JobKind::Image, Behavior::Succeed) as Arc<dyn MediaProvider>],
        fast_settings(),
        Arc::new(ManualClock::new()),
    ));
    assert!(Arc::clone(&dispatcher).start());
    dispatcher.stop().await;

    // a fresh run, not a loop that exits on its first tick
    assert!(Arc::clone(&dispatcher).start());
    let id = queue.enqueue(new_job(image_payload())).await.unwrap();
    let status = wait_for_terminal(&queue, id).await;
    assert_eq!(status.state, JobState::Completed);

    dispatcher.stop().await;
}
