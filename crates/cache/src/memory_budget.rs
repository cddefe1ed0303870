//! Memory budget tracking for decoded images
//!
//! Tracks aggregate decoded-image memory against a ceiling, independently of
//! the cache's own slot/cost limits. The budget is the admission gate tied to
//! system memory pressure: a pressure signal makes every subsequent admission
//! check fail until the tracker is reset, either explicitly or by the
//! configured timed recovery.

use serde::Serialize;
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Configuration for the memory budget.
#[derive(Debug, Clone, Copy)]
pub struct MemoryBudgetConfig {
    /// Ceiling for aggregate decoded-image memory in bytes.
    pub max_usage: u64,

    /// How long a pressure event keeps admissions failing before the tracker
    /// recovers on its own. `None` disables automatic recovery;
    /// [`MemoryBudgetManager::reset_memory_tracking`] always works.
    pub pressure_recovery: Option<Duration>,
}

impl Default for MemoryBudgetConfig {
    fn default() -> Self {
        Self {
            max_usage: 512 * 1024 * 1024,
            pressure_recovery: Some(Duration::from_secs(60)),
        }
    }
}

impl MemoryBudgetConfig {
    /// Create a configuration with a ceiling in bytes.
    pub fn new(max_usage: u64) -> Self {
        Self {
            max_usage,
            ..Default::default()
        }
    }

    /// Set the ceiling in megabytes.
    pub fn with_limit_mb(mut self, mb: u64) -> Self {
        self.max_usage = mb * 1024 * 1024;
        self
    }

    /// Set or disable the automatic pressure recovery delay.
    pub fn with_pressure_recovery(mut self, recovery: Option<Duration>) -> Self {
        self.pressure_recovery = recovery;
        self
    }
}

/// Point-in-time view of budget usage.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryUsage {
    /// Bytes currently tracked as resident.
    pub current: u64,

    /// Configured ceiling in bytes.
    pub maximum: u64,

    /// `current / maximum` as a percentage, 0.0 when the ceiling is 0.
    pub percentage: f64,
}

/// Detailed budget statistics for diagnostics surfaces.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryStatistics {
    /// Bytes currently tracked as resident.
    pub current_usage: u64,

    /// Configured ceiling in bytes.
    pub max_usage: u64,

    /// `current_usage / max_usage` as a percentage, 0.0 for a zero ceiling.
    pub usage_percentage: f64,

    /// Whether a pressure event is still in effect.
    pub is_under_pressure: bool,

    /// Headroom below the ceiling, floored at 0.
    pub available_memory: u64,
}

impl fmt::Display for MemoryStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "memory: {} / {} ({:.1}%), {} available{}",
            format_bytes(self.current_usage),
            format_bytes(self.max_usage),
            self.usage_percentage,
            format_bytes(self.available_memory),
            if self.is_under_pressure {
                ", under pressure"
            } else {
                ""
            }
        )
    }
}

/// Render a byte count as a human-readable quantity.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let bytes_f = bytes as f64;
    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.1} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.1} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

struct BudgetState {
    current_usage: u64,

    /// Set while a pressure event is in effect; holds the event time so the
    /// timed recovery can expire it.
    pressure_since: Option<Instant>,
}

/// Admission gate tracking decoded-image memory against a ceiling.
///
/// Layered alongside the cache's own limits: the cache answers "do I have a
/// slot", the budget answers "is the process allowed more resident decoded
/// pixels". Every operation is total; nothing here can fail.
///
/// Usage and the pressure flag live under one lock so an admission check
/// never observes a half-applied pressure event.
///
/// # Example
///
/// ```
/// use lightbox_cache::{MemoryBudgetConfig, MemoryBudgetManager};
///
/// let budget = MemoryBudgetManager::new(MemoryBudgetConfig::new(1_000_000));
///
/// assert!(budget.should_load_image(100_000));
/// budget.did_load_image(100_000);
///
/// budget.handle_memory_pressure();
/// assert!(!budget.should_load_image(1));
///
/// budget.reset_memory_tracking();
/// assert!(budget.should_load_image(1));
/// ```
pub struct MemoryBudgetManager {
    config: MemoryBudgetConfig,
    state: Mutex<BudgetState>,
}

impl MemoryBudgetManager {
    /// Create a budget manager with the given configuration.
    pub fn new(config: MemoryBudgetConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BudgetState {
                current_usage: 0,
                pressure_since: None,
            }),
        }
    }

    /// Create a budget manager with a ceiling in megabytes.
    pub fn with_limit_mb(mb: u64) -> Self {
        Self::new(MemoryBudgetConfig::default().with_limit_mb(mb))
    }

    /// Create a budget manager from a [`CacheConfig`](crate::CacheConfig).
    pub fn from_config(config: &crate::CacheConfig) -> Self {
        Self::new(
            MemoryBudgetConfig::new(config.max_memory_bytes)
                .with_pressure_recovery(config.pressure_recovery),
        )
    }

    /// Whether an image of `size` bytes may become resident.
    ///
    /// True iff no pressure event is in effect and admitting the image keeps
    /// usage at or below the ceiling. Negative and zero sizes count as zero
    /// and are admitted whenever not under pressure.
    pub fn should_load_image(&self, size: i64) -> bool {
        let mut state = self.state.lock().unwrap();
        if self.pressure_active(&mut state) {
            return false;
        }
        state.current_usage.saturating_add(clamp_size(size)) <= self.config.max_usage
    }

    /// Record an image becoming resident.
    pub fn did_load_image(&self, size: i64) {
        let mut state = self.state.lock().unwrap();
        state.current_usage = state.current_usage.saturating_add(clamp_size(size));
    }

    /// Record an image leaving residency. Usage never goes below 0.
    pub fn did_unload_image(&self, size: i64) {
        let mut state = self.state.lock().unwrap();
        state.current_usage = state.current_usage.saturating_sub(clamp_size(size));
    }

    /// React to a system memory-pressure signal.
    ///
    /// Marks pressure active and resets tracked usage to 0 immediately;
    /// subsequent admission checks for positive sizes fail until recovery.
    pub fn handle_memory_pressure(&self) {
        let mut state = self.state.lock().unwrap();
        state.current_usage = 0;
        state.pressure_since = Some(Instant::now());
    }

    /// Clear tracked usage and any active pressure event.
    pub fn reset_memory_tracking(&self) {
        let mut state = self.state.lock().unwrap();
        state.current_usage = 0;
        state.pressure_since = None;
    }

    /// Whether a pressure event is still in effect.
    pub fn is_under_pressure(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        self.pressure_active(&mut state)
    }

    /// Current usage against the ceiling.
    pub fn memory_usage(&self) -> MemoryUsage {
        let state = self.state.lock().unwrap();
        MemoryUsage {
            current: state.current_usage,
            maximum: self.config.max_usage,
            percentage: percentage(state.current_usage, self.config.max_usage),
        }
    }

    /// Detailed statistics for diagnostics surfaces.
    ///
    /// The `Display` impl of the returned value renders the same numbers as a
    /// human-readable one-liner.
    pub fn detailed_statistics(&self) -> MemoryStatistics {
        let mut state = self.state.lock().unwrap();
        let under_pressure = self.pressure_active(&mut state);
        MemoryStatistics {
            current_usage: state.current_usage,
            max_usage: self.config.max_usage,
            usage_percentage: percentage(state.current_usage, self.config.max_usage),
            is_under_pressure: under_pressure,
            available_memory: self.config.max_usage.saturating_sub(state.current_usage),
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &MemoryBudgetConfig {
        &self.config
    }

    /// Check the pressure flag, expiring it when the recovery delay has
    /// elapsed.
    fn pressure_active(&self, state: &mut BudgetState) -> bool {
        match state.pressure_since {
            None => false,
            Some(since) => match self.config.pressure_recovery {
                Some(recovery) if since.elapsed() >= recovery => {
                    state.pressure_since = None;
                    state.current_usage = 0;
                    false
                }
                _ => true,
            },
        }
    }
}

impl Default for MemoryBudgetManager {
    fn default() -> Self {
        Self::new(MemoryBudgetConfig::default())
    }
}

fn clamp_size(size: i64) -> u64 {
    u64::try_from(size).unwrap_or(0)
}

fn percentage(current: u64, maximum: u64) -> f64 {
    if maximum == 0 {
        0.0
    } else {
        current as f64 / maximum as f64 * 100.0
    }
}
