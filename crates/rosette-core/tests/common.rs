use parking_lot::Mutex;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly subscriber. Set `RUST_LOG=debug` to see the
/// publish/receive lines.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .try_init();
}

/// Collects every message handed to its callback.
pub struct Recorder<M> {
    received: Arc<Mutex<Vec<M>>>,
}

impl<M> Clone for Recorder<M> {
    fn clone(&self) -> Self {
        Self {
            received: self.received.clone(),
        }
    }
}

#[allow(dead_code)]
impl<M> Recorder<M>
where
    M: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn callback(&self) -> impl FnMut(M) -> eyre::Result<()> + Send + 'static {
        let received = self.received.clone();
        move |msg| {
            received.lock().push(msg);
            Ok(())
        }
    }

    pub fn received(&self) -> Vec<M> {
        self.received.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.received.lock().len()
    }
}
