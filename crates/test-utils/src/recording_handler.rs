use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::SystemTime;

use flowtrigger::errors::Result;
use flowtrigger::fs::Clock;
use flowtrigger::watch::SettledHandler;

/// Records every settled path together with the clock reading at the call.
pub struct RecordingHandler<C: Clock> {
    clock: C,
    calls: Mutex<Vec<(PathBuf, SystemTime)>>,
}

impl<C: Clock> RecordingHandler<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, SystemTime)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.calls().into_iter().map(|(p, _)| p).collect()
    }
}

impl<C: Clock> SettledHandler for RecordingHandler<C> {
    fn on_settled(&self, path: PathBuf) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            let now = self.clock.now();
            self.calls.lock().unwrap().push((path, now));
            Ok(())
        })
    }
}
