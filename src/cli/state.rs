/// Program state & command orchestration (C8 data model)
///
/// PID, start time, the exit flag, whether the process was started with CLI
/// parameters, and the single-flight mutex that serializes command
/// execution so concurrent submissions never interleave their output.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;

const HISTORY_CAPACITY: usize = 1000;

pub struct ProgramState {
    pub pid: u32,
    pub start_time: Instant,
    pub exit_flag: Arc<AtomicBool>,
    pub started_with_cli_params: bool,
    /// Held across a command's full duration; see §5 "the CLI single-flight
    /// mutex is held across blocking operations; this is by design."
    command_lock: Mutex<()>,
    history: Mutex<Vec<String>>,
}

impl ProgramState {
    pub fn new(started_with_cli_params: bool) -> Self {
        Self {
            pid: std::process::id(),
            start_time: Instant::now(),
            exit_flag: Arc::new(AtomicBool::new(false)),
            started_with_cli_params,
            command_lock: Mutex::new(()),
            history: Mutex::new(Vec::new()),
        }
    }

    pub fn should_exit(&self) -> bool {
        self.exit_flag.load(Ordering::Relaxed)
    }

    /// False -> true exactly once per run (§3 invariant 6 data model).
    pub fn request_exit(&self) {
        self.exit_flag.store(true, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub async fn record(&self, line: &str) {
        let mut history = self.history.lock().await;
        history.push(line.to_string());
        if history.len() > HISTORY_CAPACITY {
            history.remove(0);
        }
    }

    pub async fn history(&self) -> Vec<String> {
        self.history.lock().await.clone()
    }

    /// Acquire the single-flight command lock for the caller's duration.
    pub async fn lock_command(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.command_lock.lock().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_flag_transitions_false_to_true_once() {
        let state = ProgramState::new(false);
        assert!(!state.should_exit());
        state.request_exit();
        assert!(state.should_exit());
    }

    #[tokio::test]
    async fn history_records_in_submission_order() {
        let state = ProgramState::new(false);
        state.record("list").await;
        state.record("info").await;
        assert_eq!(state.history().await, vec!["list", "info"]);
    }
}
