use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Error returned by [`ScriptedRemote`]
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct RemoteError(pub String);

/// In-memory stand-in for a flaky remote API.
///
/// Each item id can be scripted to fail a number of times (with a given
/// message) before succeeding. Unscripted ids succeed immediately.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    failures: Mutex<HashMap<u32, (usize, String)>>,
    latency: Duration,
    calls: AtomicUsize,
}

impl ScriptedRemote {
    pub fn new(latency: Duration) -> Self {
        Self { latency, ..Self::default() }
    }

    /// Fail `times` calls for `id` with `message`
    pub fn fail(self, id: u32, times: usize, message: &str) -> Self {
        self.failures
            .lock()
            .expect("script lock")
            .insert(id, (times, message.to_string()));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn send(&self, id: u32) -> Result<u32, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.latency).await;

        let mut failures = self.failures.lock().expect("script lock");
        match failures.get_mut(&id) {
            Some((remaining, message)) if *remaining > 0 => {
                *remaining -= 1;
                Err(RemoteError(message.clone()))
            }
            _ => Ok(id),
        }
    }
}
