use std::fmt;
use std::time::Duration;

/// A single atomic UI operation the model asks us to perform.
///
/// Model output is mapped onto this by `schema::validate_action`, not by serde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Fill { selector: String, value: String },
    Click { selector: String },
}

impl Action {
    pub fn fill(selector: impl Into<String>, value: impl Into<String>) -> Self {
        Action::Fill {
            selector: selector.into(),
            value: value.into(),
        }
    }

    pub fn click(selector: impl Into<String>) -> Self {
        Action::Click {
            selector: selector.into(),
        }
    }

    pub fn selector(&self) -> &str {
        match self {
            Action::Fill { selector, .. } | Action::Click { selector } => selector,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Fill { selector, value } => write!(f, "fill {selector} with '{value}'"),
            Action::Click { selector } => write!(f, "click {selector}"),
        }
    }
}

/// Ordered actions for one record. Order is execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPlan(Vec<Action>);

impl ActionPlan {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<Action>> for ActionPlan {
    fn from(actions: Vec<Action>) -> Self {
        Self(actions)
    }
}

impl<'a> IntoIterator for &'a ActionPlan {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Pauses and bounds used while driving the page.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// Pause after every action so client-side scripts can react.
    pub settle: Duration,
    /// Pause after a whole plan so a submission can resolve server-side.
    pub cooldown: Duration,
    /// Bound on the tag-name probe used to spot `<select>` controls.
    pub probe_timeout: Duration,
}

impl Timings {
    pub const ZERO: Timings = Timings {
        settle: Duration::ZERO,
        cooldown: Duration::ZERO,
        probe_timeout: Duration::ZERO,
    };
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(SETTLE_MS),
            cooldown: Duration::from_millis(COOLDOWN_MS),
            probe_timeout: Duration::from_millis(PROBE_TIMEOUT_MS),
        }
    }
}

pub const MAX_MARKUP_CHARS: usize = 100_000;
pub const SETTLE_MS: u64 = 500;
pub const COOLDOWN_MS: u64 = 3_000;
pub const PROBE_TIMEOUT_MS: u64 = 1_000;
pub const ELEMENT_WAIT_MS: u64 = 5_000;
pub const NAVIGATION_TIMEOUT_MS: u64 = 30_000;
