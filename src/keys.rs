//! The four movement keys and their counter keys

use rdev::Key;
use std::fmt;

/// A movement key the engine tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TrackedKey {
    Forward,
    Back,
    Left,
    Right,
}

impl TrackedKey {
    pub const ALL: [TrackedKey; 4] = [Self::Forward, Self::Back, Self::Left, Self::Right];

    /// Map a raw key name (`w`, `a`, `s`, `d`, any case) to a tracked key
    pub fn from_raw_name(name: &str) -> Option<Self> {
        match name.trim() {
            "w" | "W" => Some(Self::Forward),
            "s" | "S" => Some(Self::Back),
            "a" | "A" => Some(Self::Left),
            "d" | "D" => Some(Self::Right),
            _ => None,
        }
    }

    /// Map an rdev key to a tracked key
    pub fn from_rdev(key: Key) -> Option<Self> {
        match key {
            Key::KeyW => Some(Self::Forward),
            Key::KeyS => Some(Self::Back),
            Key::KeyA => Some(Self::Left),
            Key::KeyD => Some(Self::Right),
            _ => None,
        }
    }

    /// The physical key this movement is bound to
    pub fn rdev_key(self) -> Key {
        match self {
            Self::Forward => Key::KeyW,
            Self::Back => Key::KeyS,
            Self::Left => Key::KeyA,
            Self::Right => Key::KeyD,
        }
    }

    /// Hook name of the key, lowercase
    pub fn raw_name(self) -> &'static str {
        match self {
            Self::Forward => "w",
            Self::Back => "s",
            Self::Left => "a",
            Self::Right => "d",
        }
    }

    /// Single-key reverse entry
    pub fn reverse(self) -> Self {
        match self {
            Self::Forward => Self::Back,
            Self::Back => Self::Forward,
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Self::Forward => 0b0001,
            Self::Back => 0b0010,
            Self::Left => 0b0100,
            Self::Right => 0b1000,
        }
    }
}

impl fmt::Display for TrackedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw_name())
    }
}

/// Small copyable set of tracked keys
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct KeySet(u8);

impl KeySet {
    pub const EMPTY: KeySet = KeySet(0);

    /// Add a key; returns true if it was not already present
    pub fn insert(&mut self, key: TrackedKey) -> bool {
        let fresh = !self.contains(key);
        self.0 |= key.bit();
        fresh
    }

    /// Remove a key; returns true if it was present
    pub fn remove(&mut self, key: TrackedKey) -> bool {
        let present = self.contains(key);
        self.0 &= !key.bit();
        present
    }

    /// True if the key is in the set
    pub fn contains(self, key: TrackedKey) -> bool {
        self.0 & key.bit() != 0
    }

    /// Copy of the set minus one key
    pub fn without(mut self, key: TrackedKey) -> Self {
        self.remove(key);
        self
    }

    /// Number of keys in the set
    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// True when no key is in the set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Keys in `TrackedKey::ALL` order
    pub fn iter(self) -> impl Iterator<Item = TrackedKey> {
        TrackedKey::ALL.into_iter().filter(move |k| self.contains(*k))
    }
}

impl FromIterator<TrackedKey> for KeySet {
    fn from_iter<I: IntoIterator<Item = TrackedKey>>(iter: I) -> Self {
        let mut set = KeySet::EMPTY;
        for key in iter {
            set.insert(key);
        }
        set
    }
}

impl fmt::Display for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(TrackedKey::raw_name).collect();
        write!(f, "{}", names.join("+"))
    }
}

/// Counter keys for a diagonal two-key combo
///
/// Opposing pairs (w+s, a+d) cancel out on their own and have no entry.
pub fn combo_reverse(chord: KeySet) -> Option<KeySet> {
    use TrackedKey::*;

    let pairs = [
        ([Forward, Left], [Back, Right]),
        ([Forward, Right], [Back, Left]),
        ([Back, Left], [Forward, Right]),
        ([Back, Right], [Forward, Left]),
    ];
    pairs
        .into_iter()
        .find(|(combo, _)| chord == combo.iter().copied().collect::<KeySet>())
        .map(|(_, counter)| counter.into_iter().collect())
}
