//! Event-name patterns accepted by FSM transitions.
//!
//! A transition accepts events by name. Most patterns are literal names
//! (`sched_switch`); some are wildcards (`syscall_entry_.*`) evaluated as an
//! anchored regular expression. Wildcards are expanded against a fixed
//! catalog of concrete event names when the FSM indexes are built.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ValidationError;

#[derive(Debug, Clone)]
enum Matcher {
    Literal,
    Wildcard(Regex),
}

/// A compiled event-name pattern.
///
/// # Examples
///
/// ```
/// use tracecoherence::EventPattern;
///
/// let exact = EventPattern::new("sched_switch").unwrap();
/// let entries = EventPattern::new("syscall_entry_.*").unwrap();
///
/// assert!(exact.matches("sched_switch"));
/// assert!(entries.is_wildcard());
/// assert!(entries.matches("syscall_entry_open"));
/// assert!(!entries.matches("syscall_exit_open"));
/// ```
#[derive(Debug, Clone)]
pub struct EventPattern {
    source: String,
    matcher: Matcher,
}

impl EventPattern {
    /// Compiles a pattern. Any `*` makes it a wildcard.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidEventPattern` for an empty pattern or
    /// a wildcard that is not a valid regular expression.
    pub fn new(source: impl Into<String>) -> Result<Self, ValidationError> {
        let source = source.into();
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::InvalidEventPattern {
                pattern: source,
                reason: "pattern cannot be empty".to_string(),
            });
        }
        let trimmed = trimmed.to_string();

        let matcher = if trimmed.contains('*') {
            let anchored = format!("^(?:{trimmed})$");
            let re = Regex::new(&anchored).map_err(|e| ValidationError::InvalidEventPattern {
                pattern: trimmed.clone(),
                reason: e.to_string(),
            })?;
            Matcher::Wildcard(re)
        } else {
            Matcher::Literal
        };

        Ok(Self {
            source: trimmed,
            matcher,
        })
    }

    /// The pattern as written in the FSM definition.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern is a regex.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self.matcher, Matcher::Wildcard(_))
    }

    /// Returns true if `name` is accepted by this pattern.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        match &self.matcher {
            Matcher::Literal => self.source == name,
            Matcher::Wildcard(re) => re.is_match(name),
        }
    }
}

impl PartialEq for EventPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for EventPattern {}

impl Hash for EventPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Display for EventPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl Serialize for EventPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for EventPattern {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        EventPattern::new(raw).map_err(serde::de::Error::custom)
    }
}

/// The fixed catalog of concrete event names wildcards expand to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventCatalog {
    names: BTreeSet<String>,
}

const SYSCALLS: &[&str] = &[
    "accept", "access", "brk", "clone", "close", "connect", "epoll_wait", "execve",
    "exit_group", "fcntl", "futex", "getdents", "getegid", "geteuid", "getgid", "getpid",
    "getrusage", "gettid", "getuid", "ioctl", "lseek", "mmap", "mprotect", "munmap",
    "nanosleep", "newfstat", "open", "pipe", "poll", "prlimit64", "pselect6", "read",
    "readlink", "recvmsg", "rt_sigaction", "rt_sigprocmask", "sendmsg", "set_robust_list",
    "set_tid_address", "setitimer", "setsockopt", "socket", "unknown", "wait", "wait4",
    "write", "writev",
];

const IRQ_VECTORS: &[&str] = &[
    "local_timer", "reschedule", "spurious_apic", "error_apic", "ipi", "irq_work",
    "call_function", "call_function_single", "threshold_apic", "thermal_apic",
    "deferred_error_apic",
];

impl EventCatalog {
    /// Creates an empty catalog. Wildcards then only match at runtime.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog of the Linux kernel events the kernel FSMs use wildcards for.
    #[must_use]
    pub fn linux_kernel() -> Self {
        let mut catalog = Self::new();
        for call in SYSCALLS {
            catalog.insert(format!("syscall_entry_{call}"));
            catalog.insert(format!("syscall_exit_{call}"));
        }
        for vector in IRQ_VECTORS {
            catalog.insert(format!("x86_irq_vectors_{vector}_entry"));
            catalog.insert(format!("x86_irq_vectors_{vector}_exit"));
        }
        catalog.insert("sched_wakeup");
        catalog.insert("sched_wakeup_new");
        catalog
    }

    /// Adds a concrete event name.
    pub fn insert(&mut self, name: impl Into<String>) {
        self.names.insert(name.into());
    }

    /// Adds a concrete event name (builder form).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>) -> Self {
        self.insert(name);
        self
    }

    /// Whether `name` is in the catalog.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Catalog names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Number of names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the catalog is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Concrete names a pattern stands for: itself when literal, the
    /// matching catalog entries when a wildcard.
    #[must_use]
    pub fn expand(&self, pattern: &EventPattern) -> Vec<String> {
        if pattern.is_wildcard() {
            self.names()
                .filter(|name| pattern.matches(name))
                .map(str::to_string)
                .collect()
        } else {
            vec![pattern.as_str().to_string()]
        }
    }
}
