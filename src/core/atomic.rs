//! Tri-state abort policy for stages.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A stage's own `atomic` setting, as authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Atomicity {
    #[default]
    Unset,
    Atomic,
    NonAtomic,
}

impl Atomicity {
    pub fn from_flag(flag: bool) -> Self {
        if flag {
            Atomicity::Atomic
        } else {
            Atomicity::NonAtomic
        }
    }

    pub fn as_option(self) -> Option<bool> {
        match self {
            Atomicity::Unset => None,
            Atomicity::Atomic => Some(true),
            Atomicity::NonAtomic => Some(false),
        }
    }

    pub fn is_unset(&self) -> bool {
        matches!(self, Atomicity::Unset)
    }
}

impl From<Option<bool>> for Atomicity {
    fn from(value: Option<bool>) -> Self {
        value.map(Atomicity::from_flag).unwrap_or_default()
    }
}

impl Serialize for Atomicity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.as_option().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Atomicity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Option::<bool>::deserialize(deserializer).map(Atomicity::from)
    }
}

/// Merge a stage's own policy with the one inherited from its parent.
///
/// An explicit `NonAtomic` vetoes the subtree. When both levels say something,
/// both must be atomic. The result becomes the parent policy of child stages.
pub fn resolve(own: Atomicity, parent: Atomicity) -> bool {
    match (own, parent) {
        (Atomicity::NonAtomic, _) => false,
        (Atomicity::Unset, Atomicity::Unset) => false,
        (Atomicity::Atomic, Atomicity::Unset) => true,
        (Atomicity::Unset, inherited) => inherited == Atomicity::Atomic,
        (Atomicity::Atomic, inherited) => inherited == Atomicity::Atomic,
    }
}
