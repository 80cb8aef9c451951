//! Bridge configuration.

use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`BridgeConfig::from_env`].
pub const ENV_PREFIX: &str = "BUS_ADMISSION_";

/// Deepest serializer bound accepted by [`BridgeConfig::validate`].
pub const MAX_SERIALIZER_DEPTH: usize = 16;

/// Bus addresses, timeouts and pool sizing for the admission bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Address serving `register` / `unregister`.
    pub control_address: String,
    /// Address serving `scheduleBuild`, `getAllItems`, `getQueue`.
    pub dispatch_address: String,
    /// Broadcast address for item lifecycle events.
    pub item_address: String,
    /// Broadcast address for run lifecycle events.
    pub run_address: String,
    /// Broadcast address for runtime start/stop.
    pub lifecycle_address: String,
    /// Ceiling on one admission check, measured from its start.
    pub reply_timeout_ms: u64,
    /// Dispatch worker threads.
    pub dispatch_workers: usize,
    /// Dispatch queue slots.
    pub max_pending_checks: usize,
    /// Serializer depth bound.
    pub serializer_depth: usize,
    /// Stack size of each dispatch worker, in bytes.
    pub thread_stack_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            control_address: "scheduler.admission".into(),
            dispatch_address: "scheduler".into(),
            item_address: "scheduler.item".into(),
            run_address: "scheduler.run".into(),
            lifecycle_address: "scheduler.lifecycle".into(),
            reply_timeout_ms: 10_000,
            dispatch_workers: num_cpus::get().clamp(2, 8),
            max_pending_checks: 256,
            serializer_depth: 1,
            thread_stack_size: 256 * 1024,
        }
    }
}

impl BridgeConfig {
    /// Default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the control address.
    #[must_use]
    pub fn with_control_address(mut self, address: impl Into<String>) -> Self {
        self.control_address = address.into();
        self
    }

    /// Set the RPC dispatch address.
    #[must_use]
    pub fn with_dispatch_address(mut self, address: impl Into<String>) -> Self {
        self.dispatch_address = address.into();
        self
    }

    /// Set the item broadcast address.
    #[must_use]
    pub fn with_item_address(mut self, address: impl Into<String>) -> Self {
        self.item_address = address.into();
        self
    }

    /// Set the run broadcast address.
    #[must_use]
    pub fn with_run_address(mut self, address: impl Into<String>) -> Self {
        self.run_address = address.into();
        self
    }

    /// Set the runtime broadcast address.
    #[must_use]
    pub fn with_lifecycle_address(mut self, address: impl Into<String>) -> Self {
        self.lifecycle_address = address.into();
        self
    }

    /// Set the admission reply timeout.
    #[must_use]
    pub const fn with_reply_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.reply_timeout_ms = timeout_ms;
        self
    }

    /// Set the dispatch worker count.
    #[must_use]
    pub const fn with_dispatch_workers(mut self, workers: usize) -> Self {
        self.dispatch_workers = workers;
        self
    }

    /// Set the dispatch queue depth.
    #[must_use]
    pub const fn with_max_pending_checks(mut self, pending: usize) -> Self {
        self.max_pending_checks = pending;
        self
    }

    /// Set the serializer depth bound.
    #[must_use]
    pub const fn with_serializer_depth(mut self, depth: usize) -> Self {
        self.serializer_depth = depth;
        self
    }

    /// Set the dispatch worker stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    fn addresses(&self) -> [(&'static str, &str); 5] {
        [
            ("control_address", &self.control_address),
            ("dispatch_address", &self.dispatch_address),
            ("item_address", &self.item_address),
            ("run_address", &self.run_address),
            ("lifecycle_address", &self.lifecycle_address),
        ]
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns a description of the first invalid value.
    pub fn validate(&self) -> Result<(), String> {
        let addresses = self.addresses();
        for (idx, (name, address)) in addresses.iter().enumerate() {
            if address.trim().is_empty() {
                return Err(format!("{name} must not be empty"));
            }
            if let Some((other, _)) = addresses[..idx].iter().find(|(_, a)| a == address) {
                return Err(format!("{name} duplicates {other} (`{address}`)"));
            }
        }
        if self.reply_timeout_ms == 0 {
            return Err("reply_timeout_ms must be greater than 0".into());
        }
        if self.dispatch_workers == 0 {
            return Err("dispatch_workers must be greater than 0".into());
        }
        if self.max_pending_checks == 0 {
            return Err("max_pending_checks must be greater than 0".into());
        }
        if self.serializer_depth > MAX_SERIALIZER_DEPTH {
            return Err(format!(
                "serializer_depth must be at most {MAX_SERIALIZER_DEPTH}"
            ));
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns the parse or validation failure.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build from defaults overridden by `BUS_ADMISSION_*` environment
    /// variables, after loading a `.env` file if one is present.
    ///
    /// # Errors
    ///
    /// Returns the first unparsable variable or validation failure.
    pub fn from_env() -> Result<Self, String> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(format!("failed to load .env: {err}"));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from defaults overridden through `lookup`, which receives full
    /// variable names such as `BUS_ADMISSION_REPLY_TIMEOUT_MS`.
    ///
    /// # Errors
    ///
    /// Returns the first unparsable value or validation failure.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{ENV_PREFIX}{suffix}"));
        let mut cfg = Self::default();

        if let Some(v) = var("CONTROL_ADDRESS") {
            cfg.control_address = v;
        }
        if let Some(v) = var("DISPATCH_ADDRESS") {
            cfg.dispatch_address = v;
        }
        if let Some(v) = var("ITEM_ADDRESS") {
            cfg.item_address = v;
        }
        if let Some(v) = var("RUN_ADDRESS") {
            cfg.run_address = v;
        }
        if let Some(v) = var("LIFECYCLE_ADDRESS") {
            cfg.lifecycle_address = v;
        }
        if let Some(v) = var("REPLY_TIMEOUT_MS") {
            cfg.reply_timeout_ms = parse_number("REPLY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("DISPATCH_WORKERS") {
            cfg.dispatch_workers = parse_number("DISPATCH_WORKERS", &v)?;
        }
        if let Some(v) = var("MAX_PENDING_CHECKS") {
            cfg.max_pending_checks = parse_number("MAX_PENDING_CHECKS", &v)?;
        }
        if let Some(v) = var("SERIALIZER_DEPTH") {
            cfg.serializer_depth = parse_number("SERIALIZER_DEPTH", &v)?;
        }
        if let Some(v) = var("THREAD_STACK_SIZE") {
            cfg.thread_stack_size = parse_number("THREAD_STACK_SIZE", &v)?;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}

fn parse_number<T>(suffix: &str, raw: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| format!("{ENV_PREFIX}{suffix}: {e}"))
}
