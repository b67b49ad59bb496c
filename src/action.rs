//! Action algebra for scheduling decisions.
//!
//! An [`Action`] is a small bitset describing which lifecycle behaviors a
//! decision permits. Controllers carry an allowed-action mask and only
//! dispatch decisions that share at least one bit with it.

use std::fmt;

/// A bitset of permitted scheduling decisions.
///
/// The two low bits carry the power decisions (`OFF` = 1, `ON` = 2); values
/// above 1 decoded from a schedule token become custom actions occupying the
/// higher bits. `ALL` has every bit set and is compatible with anything
/// except [`Action::NULL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Action(u8);

impl Action {
    /// No decision. Never dispatched.
    pub const NULL: Action = Action(0);
    /// Power the resource down.
    pub const OFF: Action = Action(1);
    /// Power the resource up.
    pub const ON: Action = Action(2);
    /// Every action permitted.
    pub const ALL: Action = Action(0xFF);

    /// Builds a custom action from a decoded schedule value greater than 1.
    ///
    /// Values are clamped to 127 so they stay within the signed range the
    /// tag vocabulary was defined over.
    #[must_use]
    pub fn custom(value: i64) -> Action {
        Action(value.clamp(0, 127) as u8)
    }

    /// Raw bit pattern.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Two actions are compatible when they share at least one bit.
    ///
    /// Commutative; `NULL` is compatible with nothing, including itself.
    #[must_use]
    pub fn compatible(self, other: Action) -> bool {
        self.0 & other.0 != 0
    }

    /// Resolves an action filter word from configuration.
    ///
    /// Recognizes `all`, `on` and `off` (case-insensitive); anything else
    /// falls back to `ALL` so a misspelled filter never silently disables
    /// the run.
    #[must_use]
    pub fn from_word(word: &str) -> Action {
        match word.trim().to_ascii_lowercase().as_str() {
            "on" => Action::ON,
            "off" => Action::OFF,
            _ => Action::ALL,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Action::NULL => write!(f, "NONE"),
            Action::OFF => write!(f, "OFF"),
            Action::ON => write!(f, "ON"),
            Action::ALL => write!(f, "ALL"),
            Action(bits) => write!(f, "CUSTOM({bits})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compatibility_is_commutative() {
        let actions = [Action::NULL, Action::OFF, Action::ON, Action::ALL, Action::custom(5)];
        for a in actions {
            for b in actions {
                assert_eq!(a.compatible(b), b.compatible(a), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn null_is_compatible_with_nothing() {
        for a in [Action::NULL, Action::OFF, Action::ON, Action::ALL] {
            assert!(!a.compatible(Action::NULL));
            assert!(!Action::NULL.compatible(a));
        }
    }

    #[test]
    fn all_matches_every_real_action() {
        assert!(Action::ALL.compatible(Action::ON));
        assert!(Action::ALL.compatible(Action::OFF));
        assert!(Action::ALL.compatible(Action::custom(64)));
    }

    #[test]
    fn on_and_off_are_disjoint() {
        assert!(!Action::ON.compatible(Action::OFF));
    }

    #[test]
    fn word_resolution_defaults_to_all() {
        assert_eq!(Action::from_word("on"), Action::ON);
        assert_eq!(Action::from_word("OFF"), Action::OFF);
        assert_eq!(Action::from_word("all"), Action::ALL);
        assert_eq!(Action::from_word("scale-up"), Action::ALL);
        assert_eq!(Action::from_word(""), Action::ALL);
    }

    #[test]
    fn custom_clamps_to_127() {
        assert_eq!(Action::custom(300).bits(), 127);
        assert_eq!(Action::custom(127).bits(), 127);
        assert_eq!(Action::custom(3).bits(), 3);
    }
}
