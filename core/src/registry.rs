//! Owner of the process-wide current console.
//!
//! Rather than a global singleton, this is an explicit registry object: a
//! mutex-guarded `current` slot whose transitions
//! (`NoConsole → Restricted ⇄ Privileged`) all run as critical sections.
//! Callers must not swap consoles while an executable is mid-flight on the
//! console being replaced; wait for its terminal outcome first.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;
use tracing::warn;

use fileshell_protocol::ConsoleMode;

use crate::config::ConsoleConfig;
use crate::console::Console;
use crate::console::EmbeddedConsole;
use crate::console::ShellConsole;
use crate::error::ConsoleError;

/// Creates consoles for a requested privilege mode. The returned console is
/// already allocated.
#[async_trait]
pub trait ConsoleFactory: Send + Sync {
    async fn create(&self, mode: ConsoleMode) -> Result<Arc<dyn Console>, ConsoleError>;
}

/// Default factory: privileged mode spawns a shell console through the
/// configured launcher; restricted mode uses the in-process console.
pub struct DefaultConsoleFactory {
    config: ConsoleConfig,
}

impl DefaultConsoleFactory {
    pub fn new(config: ConsoleConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ConsoleFactory for DefaultConsoleFactory {
    async fn create(&self, mode: ConsoleMode) -> Result<Arc<dyn Console>, ConsoleError> {
        let console: Arc<dyn Console> = match mode {
            ConsoleMode::Privileged => Arc::new(ShellConsole::from_config(&self.config)),
            ConsoleMode::Restricted => Arc::new(EmbeddedConsole::new(self.config.trace)),
        };
        console.alloc().await?;
        // A launcher that spawns fine but does not actually elevate (su
        // prompting and failing, for example) must not count as escalation.
        if mode.is_privileged() && !console.is_privileged() {
            console.dealloc().await;
            return Err(ConsoleError::alloc(
                "console allocated but its identity is not privileged",
            ));
        }
        Ok(console)
    }
}

/// Process-wide owner of the current console and sole mediator of privilege
/// transitions.
pub struct ConsoleRegistry {
    factory: Arc<dyn ConsoleFactory>,
    default_mode: ConsoleMode,
    current: Mutex<Option<Arc<dyn Console>>>,
}

impl ConsoleRegistry {
    pub fn new(factory: Arc<dyn ConsoleFactory>, default_mode: ConsoleMode) -> Self {
        Self {
            factory,
            default_mode,
            current: Mutex::new(None),
        }
    }

    pub fn with_config(config: ConsoleConfig) -> Self {
        let default_mode = config.default_mode;
        Self::new(Arc::new(DefaultConsoleFactory::new(config)), default_mode)
    }

    /// The current console, allocating one per the stored preference on
    /// first use.
    pub async fn console(&self) -> Result<Arc<dyn Console>, ConsoleError> {
        let mut current = self.current.lock().await;
        if let Some(console) = current.as_ref() {
            return Ok(Arc::clone(console));
        }
        let console = self.factory.create(self.default_mode).await?;
        debug!("allocated {} console as {}", self.default_mode, console.identity());
        *current = Some(Arc::clone(&console));
        Ok(console)
    }

    /// Whether a console currently exists.
    pub async fn is_alloc(&self) -> bool {
        self.current.lock().await.is_some()
    }

    /// Delegates to the current console; false when none exists.
    pub async fn is_privileged(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .is_some_and(|console| console.is_privileged())
    }

    /// Attempt to swap in a privileged console.
    ///
    /// On success the previous console has been deallocated exactly once and
    /// `is_privileged()` is true. On failure (no way to elevate) the
    /// previous console is left untouched and active, and false is returned:
    /// escalation being unavailable is an answer, not an error.
    pub async fn change_to_privileged(&self) -> bool {
        let mut current = self.current.lock().await;
        if current.as_ref().is_some_and(|console| console.is_privileged()) {
            return true;
        }
        match self.factory.create(ConsoleMode::Privileged).await {
            Ok(console) => {
                if let Some(previous) = current.take() {
                    previous.dealloc().await;
                }
                *current = Some(console);
                true
            }
            Err(err) => {
                warn!("privilege escalation unavailable: {err}");
                false
            }
        }
    }

    /// Symmetric downgrade. With the default factory this always succeeds,
    /// since the restricted console has no external dependency.
    pub async fn change_to_non_privileged(&self) -> Result<(), ConsoleError> {
        let mut current = self.current.lock().await;
        if current
            .as_ref()
            .is_some_and(|console| !console.is_privileged())
        {
            return Ok(());
        }
        let console = self.factory.create(ConsoleMode::Restricted).await?;
        if let Some(previous) = current.take() {
            previous.dealloc().await;
        }
        *current = Some(console);
        Ok(())
    }

    /// Deallocate and clear the current console.
    pub async fn destroy(&self) {
        let mut current = self.current.lock().await;
        if let Some(console) = current.take() {
            console.dealloc().await;
        }
    }
}
