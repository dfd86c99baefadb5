//! Page events and the predicates that qualify them.

use std::fmt::{Debug, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Page-level event delivered to registered triggers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageEvent {
    Click { target: String },
    Visible { target: String },
    Scroll { offset: u32 },
    /// Time since page start.
    Elapsed(Duration),
}

/// Predicate deciding which events activate a trigger.
#[derive(Clone)]
pub enum TriggerCondition {
    Click { target: String },
    Visible { target: String },
    Scroll { min_offset: u32 },
    Elapsed { after: Duration },
    Custom(Arc<dyn Fn(&PageEvent) -> bool + Send + Sync>),
}

impl TriggerCondition {
    pub fn click(target: impl Into<String>) -> Self {
        Self::Click {
            target: target.into(),
        }
    }

    pub fn visible(target: impl Into<String>) -> Self {
        Self::Visible {
            target: target.into(),
        }
    }

    pub fn custom(predicate: impl Fn(&PageEvent) -> bool + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, event: &PageEvent) -> bool {
        match (self, event) {
            (Self::Click { target }, PageEvent::Click { target: clicked }) => target == clicked,
            (Self::Visible { target }, PageEvent::Visible { target: shown }) => target == shown,
            (Self::Scroll { min_offset }, PageEvent::Scroll { offset }) => offset >= min_offset,
            (Self::Elapsed { after }, PageEvent::Elapsed(elapsed)) => elapsed >= after,
            (Self::Custom(predicate), event) => predicate(event),
            _ => false,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Visible { .. } => "visible",
            Self::Scroll { .. } => "scroll",
            Self::Elapsed { .. } => "elapsed",
            Self::Custom(_) => "custom",
        }
    }
}

impl Debug for TriggerCondition {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Click { target } => f.debug_struct("Click").field("target", target).finish(),
            Self::Visible { target } => f.debug_struct("Visible").field("target", target).finish(),
            Self::Scroll { min_offset } => f
                .debug_struct("Scroll")
                .field("min_offset", min_offset)
                .finish(),
            Self::Elapsed { after } => f.debug_struct("Elapsed").field("after", after).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PageEvent, TriggerCondition};
    use std::time::Duration;

    #[test]
    fn matches_only_its_own_event_kind_and_target() {
        let click = TriggerCondition::click("cart-button");
        assert!(click.matches(&PageEvent::Click {
            target: "cart-button".to_string()
        }));
        assert!(!click.matches(&PageEvent::Click {
            target: "logo".to_string()
        }));
        assert!(!click.matches(&PageEvent::Visible {
            target: "cart-button".to_string()
        }));
    }

    #[test]
    fn thresholds_are_inclusive() {
        let scroll = TriggerCondition::Scroll { min_offset: 400 };
        assert!(!scroll.matches(&PageEvent::Scroll { offset: 399 }));
        assert!(scroll.matches(&PageEvent::Scroll { offset: 400 }));

        let timer = TriggerCondition::Elapsed {
            after: Duration::from_secs(2),
        };
        assert!(timer.matches(&PageEvent::Elapsed(Duration::from_secs(2))));
        assert!(!timer.matches(&PageEvent::Elapsed(Duration::from_millis(1999))));
    }

    #[test]
    fn custom_predicate_sees_every_event() {
        let any_click = TriggerCondition::custom(|event| matches!(event, PageEvent::Click { .. }));
        assert!(any_click.matches(&PageEvent::Click {
            target: "anything".to_string()
        }));
        assert!(!any_click.matches(&PageEvent::Scroll { offset: 10 }));
    }
}
