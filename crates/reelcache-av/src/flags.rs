//! Order-preserving ffmpeg flag set.
//!
//! Flags are keyed by name (`-crf`, `-c:a`, ...). Setting a flag that is
//! already present replaces its value where it stands; new flags are appended.
//! A flag is therefore never emitted twice, whatever order the layers are
//! merged in.

/// Ordered `flag -> value` pairs, unique by flag.
///
/// A value of `None` is a bare switch such as `-an`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlagSet {
    entries: Vec<(String, Option<String>)>,
}

impl FlagSet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from `(flag, value)` pairs, later duplicates replacing
    /// earlier ones.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut set = Self::new();
        for (flag, value) in pairs {
            set.set(flag, value);
        }
        set
    }

    /// Set `flag` to `value`, in place if present, appended otherwise.
    pub fn set(&mut self, flag: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.put(flag.into(), Some(value.into()));
        self
    }

    /// Set a bare switch (a flag without a value).
    pub fn switch(&mut self, flag: impl Into<String>) -> &mut Self {
        self.put(flag.into(), None);
        self
    }

    fn put(&mut self, flag: String, value: Option<String>) {
        match self.entries.iter_mut().find(|(f, _)| *f == flag) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((flag, value)),
        }
    }

    /// Apply every entry of `other` on top of this set.
    pub fn overlay(&mut self, other: &FlagSet) -> &mut Self {
        for (flag, value) in &other.entries {
            self.put(flag.clone(), value.clone());
        }
        self
    }

    /// Remove a flag, returning its value if it was present.
    pub fn remove(&mut self, flag: &str) -> Option<Option<String>> {
        let pos = self.entries.iter().position(|(f, _)| f == flag)?;
        Some(self.entries.remove(pos).1)
    }

    /// Whether `flag` is present.
    pub fn contains(&self, flag: &str) -> bool {
        self.entries.iter().any(|(f, _)| f == flag)
    }

    /// Value of `flag`, if present and not a bare switch.
    pub fn get(&self, flag: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(f, _)| f == flag)
            .and_then(|(_, v)| v.as_deref())
    }

    /// Number of flags.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flag names in emission order.
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(f, _)| f.as_str())
    }

    /// Flatten into an argument vector.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 2);
        for (flag, value) in &self.entries {
            args.push(flag.clone());
            if let Some(value) = value {
                args.push(value.clone());
            }
        }
        args
    }
}
