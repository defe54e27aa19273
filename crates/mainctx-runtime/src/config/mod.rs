//! Runtime configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Config passed to `install()` before first use
//! 2. Environment variables
//! 3. Library defaults (`defaults` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use mainctx_runtime::config::{self, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_env()
//!     .worker_thread_name("svc-worker")
//!     .park_timeout(Duration::from_millis(250));
//! config::install(config)?;
//! ```

pub mod defaults;

use std::sync::OnceLock;
use std::time::Duration;

use mainctx_core::env::{env_get, env_get_duration_ms, env_get_str};
use mainctx_core::{CoreError, CoreResult};

/// Event loop and worker configuration with builder pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Name of the worker context thread
    pub worker_thread_name: String,
    /// Worker thread stack size (None = system default)
    pub worker_stack_size: Option<usize>,
    /// Longest single park inside a blocking iteration
    pub park_timeout: Duration,
    /// Sources dispatched per iteration at most
    pub max_dispatch: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `MAINCTX_WORKER_THREAD_NAME` - Worker thread name
    /// - `MAINCTX_WORKER_STACK_SIZE` - Worker stack size in bytes (0 = default)
    /// - `MAINCTX_PARK_TIMEOUT_MS` - Park bound in milliseconds
    /// - `MAINCTX_MAX_DISPATCH` - Sources per iteration
    pub fn from_env() -> Self {
        let stack: usize = env_get("MAINCTX_WORKER_STACK_SIZE", defaults::WORKER_STACK_SIZE);
        Self {
            worker_thread_name: env_get_str(
                "MAINCTX_WORKER_THREAD_NAME",
                defaults::WORKER_THREAD_NAME,
            ),
            worker_stack_size: (stack != 0).then_some(stack),
            park_timeout: env_get_duration_ms("MAINCTX_PARK_TIMEOUT_MS", defaults::PARK_TIMEOUT_MS),
            max_dispatch: env_get("MAINCTX_MAX_DISPATCH", defaults::MAX_DISPATCH),
        }
    }

    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            worker_thread_name: defaults::WORKER_THREAD_NAME.to_string(),
            worker_stack_size: None,
            park_timeout: Duration::from_millis(defaults::PARK_TIMEOUT_MS),
            max_dispatch: defaults::MAX_DISPATCH,
        }
    }

    // Builder methods

    pub fn worker_thread_name(mut self, name: impl Into<String>) -> Self {
        self.worker_thread_name = name.into();
        self
    }

    pub fn worker_stack_size(mut self, size: Option<usize>) -> Self {
        self.worker_stack_size = size;
        self
    }

    pub fn park_timeout(mut self, d: Duration) -> Self {
        self.park_timeout = d;
        self
    }

    pub fn max_dispatch(mut self, n: usize) -> Self {
        self.max_dispatch = n;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> CoreResult<()> {
        if self.worker_thread_name.is_empty() {
            return Err(CoreError::InvalidConfig("worker_thread_name must not be empty"));
        }
        if self.worker_thread_name.contains('\0') {
            return Err(CoreError::InvalidConfig("worker_thread_name must not contain NUL"));
        }
        if matches!(self.worker_stack_size, Some(s) if s < defaults::MIN_WORKER_STACK_SIZE) {
            return Err(CoreError::InvalidConfig("worker_stack_size must be >= 64KB"));
        }
        if self.park_timeout.is_zero() {
            return Err(CoreError::InvalidConfig("park_timeout must be > 0"));
        }
        if self.max_dispatch == 0 {
            return Err(CoreError::InvalidConfig("max_dispatch must be > 0"));
        }
        Ok(())
    }
}

static GLOBAL: OnceLock<RuntimeConfig> = OnceLock::new();

/// Install the process-wide configuration.
///
/// Must happen before the first context iteration or worker use;
/// afterwards the configuration is frozen.
pub fn install(config: RuntimeConfig) -> CoreResult<()> {
    config.validate()?;
    GLOBAL.set(config).map_err(|_| CoreError::AlreadyInitialized)
}

/// The process-wide configuration, read from the environment on first
/// use when nothing was installed.
///
/// An invalid environment falls back to the library defaults.
pub fn global() -> &'static RuntimeConfig {
    GLOBAL.get_or_init(|| {
        let config = RuntimeConfig::from_env();
        match config.validate() {
            Ok(()) => config,
            Err(e) => {
                mainctx_core::kwarn!("ignoring environment config: {}", e);
                RuntimeConfig::new()
            }
        }
    })
}
