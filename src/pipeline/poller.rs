//! Analysis Run Poller
//!
//! Starts a pipeline run and polls its status with exponential backoff until it
//! finishes, the attempt or time budget runs out, or the caller cancels.
//! Progress is published on a `watch` channel.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::client::{AnalysisRequest, PipelineApi, PipelineInput, RunHandle, RunState};
use super::{PipelineError, Result};

// == Poll Policy ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay before the first status check
    pub initial_interval: Duration,
    /// Backoff ceiling
    pub max_interval: Duration,
    pub max_attempts: u32,
    /// Overall budget measured from the start request
    pub max_duration: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(16),
            max_attempts: 60,
            max_duration: Duration::from_secs(300),
        }
    }
}

impl PollPolicy {
    /// Delay before status check number `attempt` (0-based): doubles each time, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(31)).unwrap_or(u32::MAX);
        self.initial_interval
            .checked_mul(factor)
            .unwrap_or(self.max_interval)
            .min(self.max_interval)
    }
}

// == Analysis State ==
/// Lifecycle of one analysis: `Idle → Running → Done | Failed | Cancelled`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AnalysisState {
    Idle,
    Running {
        #[serde(rename = "runId", skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
        attempts: u32,
    },
    Done {
        #[serde(rename = "runId")]
        run_id: String,
        output: String,
    },
    Failed {
        error: String,
    },
    Cancelled,
}

impl AnalysisState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisState::Done { .. } | AnalysisState::Failed { .. } | AnalysisState::Cancelled
        )
    }
}

// == Analysis Task ==
/// Handle to a running analysis. Dropping the handle cancels the run.
pub struct AnalysisTask {
    state: watch::Receiver<AnalysisState>,
    cancel: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AnalysisTask {
    /// Starts the run in the background.
    pub fn spawn(api: Arc<dyn PipelineApi>, request: &AnalysisRequest, policy: PollPolicy) -> Self {
        let (state_tx, state_rx) = watch::channel(AnalysisState::Idle);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let inputs = request.pipeline_inputs();

        let handle = tokio::spawn(drive(api, inputs, policy, state_tx, cancel_rx));

        Self {
            state: state_rx,
            cancel: cancel_tx,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn state(&self) -> AnalysisState {
        self.state.borrow().clone()
    }

    /// A receiver that sees every published state change.
    pub fn subscribe(&self) -> watch::Receiver<AnalysisState> {
        self.state.clone()
    }

    /// Requests cancellation. No-op once the run has finished.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Waits for a terminal state.
    pub async fn wait(&self) -> AnalysisState {
        let mut rx = self.state.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if current.is_terminal() {
                return current;
            }
            if rx.changed().await.is_err() {
                return rx.borrow().clone();
            }
        }
    }
}

impl Drop for AnalysisTask {
    fn drop(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

async fn drive(
    api: Arc<dyn PipelineApi>,
    inputs: Vec<PipelineInput>,
    policy: PollPolicy,
    state: watch::Sender<AnalysisState>,
    mut cancel: watch::Receiver<bool>,
) {
    let outcome = tokio::select! {
        biased;
        _ = cancelled(&mut cancel) => AnalysisState::Cancelled,
        result = poll_run(api.as_ref(), inputs, policy, &state) => match result {
            Ok((run_id, output)) => AnalysisState::Done { run_id, output },
            Err(e) => {
                warn!("Analysis failed: {}", e);
                AnalysisState::Failed { error: e.to_string() }
            }
        },
    };
    info!("Analysis finished: {}", outcome_label(&outcome));
    state.send_replace(outcome);
}

async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        // Sender gone means the handle was dropped
        if cancel.changed().await.is_err() {
            return;
        }
    }
}

async fn poll_run(
    api: &dyn PipelineApi,
    inputs: Vec<PipelineInput>,
    policy: PollPolicy,
    state: &watch::Sender<AnalysisState>,
) -> Result<(String, String)> {
    let started = Instant::now();
    state.send_replace(AnalysisState::Running {
        run_id: None,
        attempts: 0,
    });

    let RunHandle { run_id } = api.start_pipeline(inputs).await?;
    info!("Pipeline run {} started", run_id);

    for attempt in 0..policy.max_attempts {
        let delay = policy.delay_for(attempt);
        if started.elapsed() + delay > policy.max_duration {
            return Err(PipelineError::DeadlineExceeded(policy.max_duration));
        }
        sleep(delay).await;

        let run = api.get_pipeline_run(&run_id).await?;
        state.send_replace(AnalysisState::Running {
            run_id: Some(run_id.clone()),
            attempts: attempt + 1,
        });

        match run.state {
            RunState::Done => {
                let output = run.output().unwrap_or_default().to_string();
                return Ok((run_id, output));
            }
            RunState::Failed => return Err(PipelineError::RunFailed(run_id)),
            RunState::Running | RunState::Unknown => {
                debug!("Run {} pending after check {}", run_id, attempt + 1);
            }
        }
    }

    Err(PipelineError::AttemptsExhausted(policy.max_attempts))
}

fn outcome_label(state: &AnalysisState) -> &'static str {
    match state {
        AnalysisState::Idle => "idle",
        AnalysisState::Running { .. } => "running",
        AnalysisState::Done { .. } => "done",
        AnalysisState::Failed { .. } => "failed",
        AnalysisState::Cancelled => "cancelled",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::client::{PipelineRun, RunOutputs};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays a fixed sequence of run states.
    struct ScriptedApi {
        states: Mutex<VecDeque<RunState>>,
        polls: AtomicU32,
        start_error: Option<PipelineError>,
    }

    impl ScriptedApi {
        fn new(states: &[RunState]) -> Arc<Self> {
            Arc::new(Self {
                states: Mutex::new(states.iter().copied().collect()),
                polls: AtomicU32::new(0),
                start_error: None,
            })
        }
    }

    #[async_trait]
    impl PipelineApi for ScriptedApi {
        async fn start_pipeline(&self, _inputs: Vec<PipelineInput>) -> Result<RunHandle> {
            match &self.start_error {
                Some(err) => Err(err.clone()),
                None => Ok(RunHandle {
                    run_id: "run-1".to_string(),
                }),
            }
        }

        async fn get_pipeline_run(&self, run_id: &str) -> Result<PipelineRun> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            let state = self.states.lock().pop_front().unwrap_or(RunState::Running);
            Ok(PipelineRun {
                run_id: run_id.to_string(),
                state,
                outputs: (state == RunState::Done).then(|| RunOutputs {
                    output: "```json\n[]\n```".to_string(),
                }),
            })
        }
    }

    fn fast_policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(4),
            max_attempts,
            max_duration: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = PollPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
        assert_eq!(policy.delay_for(4), Duration::from_secs(16));
        assert_eq!(policy.delay_for(10), Duration::from_secs(16));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(16));
    }

    #[tokio::test]
    async fn test_reaches_done_with_output() {
        let api = ScriptedApi::new(&[RunState::Running, RunState::Running, RunState::Done]);
        let task = AnalysisTask::spawn(api.clone(), &AnalysisRequest::new("req"), fast_policy(10));

        match task.wait().await {
            AnalysisState::Done { run_id, output } => {
                assert_eq!(run_id, "run-1");
                assert!(output.contains("```json"));
            }
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(api.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_run() {
        let api = ScriptedApi::new(&[RunState::Failed]);
        let task = AnalysisTask::spawn(api, &AnalysisRequest::new("req"), fast_policy(10));
        assert!(matches!(task.wait().await, AnalysisState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let api = ScriptedApi::new(&[]);
        let task = AnalysisTask::spawn(api.clone(), &AnalysisRequest::new("req"), fast_policy(3));

        match task.wait().await {
            AnalysisState::Failed { error } => assert!(error.contains("3 status checks")),
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(api.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_deadline() {
        let api = ScriptedApi::new(&[]);
        let policy = PollPolicy {
            initial_interval: Duration::from_millis(20),
            max_interval: Duration::from_millis(20),
            max_attempts: 1000,
            max_duration: Duration::from_millis(70),
        };
        let task = AnalysisTask::spawn(api.clone(), &AnalysisRequest::new("req"), policy);

        assert!(matches!(task.wait().await, AnalysisState::Failed { .. }));
        assert!(api.polls.load(Ordering::SeqCst) < 5);
    }

    #[tokio::test]
    async fn test_cancel_stops_polling() {
        let api = ScriptedApi::new(&[]);
        let policy = PollPolicy {
            initial_interval: Duration::from_millis(10),
            max_interval: Duration::from_millis(10),
            max_attempts: 1000,
            max_duration: Duration::from_secs(30),
        };
        let task = AnalysisTask::spawn(api.clone(), &AnalysisRequest::new("req"), policy);

        sleep(Duration::from_millis(35)).await;
        task.cancel();
        assert_eq!(task.wait().await, AnalysisState::Cancelled);

        let polls = api.polls.load(Ordering::SeqCst);
        sleep(Duration::from_millis(40)).await;
        assert_eq!(api.polls.load(Ordering::SeqCst), polls);
    }

    #[tokio::test]
    async fn test_start_failure() {
        let api = Arc::new(ScriptedApi {
            states: Mutex::new(VecDeque::new()),
            polls: AtomicU32::new(0),
            start_error: Some(PipelineError::Api {
                status: 401,
                body: "bad key".to_string(),
            }),
        });
        let task = AnalysisTask::spawn(api.clone(), &AnalysisRequest::new("req"), fast_policy(5));

        match task.wait().await {
            AnalysisState::Failed { error } => assert!(error.contains("401")),
            other => panic!("unexpected state: {other:?}"),
        }
        assert_eq!(api.polls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(AnalysisState::Running {
            run_id: Some("r".to_string()),
            attempts: 2,
        })
        .unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["runId"], "r");
        assert!(AnalysisState::Cancelled.is_terminal());
        assert!(!AnalysisState::Idle.is_terminal());
    }
}
