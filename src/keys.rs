/// API keys handed out in turn. Each service client owns its own ring.
#[derive(Debug, Clone, Default)]
pub struct KeyRing {
    keys: Vec<String>,
    next: usize,
}

impl KeyRing {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys = keys
            .into_iter()
            .map(Into::into)
            .map(|k: String| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        Self { keys, next: 0 }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the key after the one handed out last, wrapping at the end.
    pub fn next_key(&mut self) -> Option<&str> {
        if self.keys.is_empty() {
            return None;
        }
        let idx = self.next % self.keys.len();
        self.next = (idx + 1) % self.keys.len();
        Some(self.keys[idx].as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotates_through_keys() {
        let mut ring = KeyRing::new(["a", " ", "b", "c"]);
        assert_eq!(ring.len(), 3);
        let drawn: Vec<String> = (0..5)
            .filter_map(|_| ring.next_key().map(str::to_string))
            .collect();
        assert_eq!(drawn, vec!["a", "b", "c", "a", "b"]);
    }

    #[test]
    fn empty_ring_yields_nothing() {
        let mut ring = KeyRing::new(Vec::<String>::new());
        assert!(ring.is_empty());
        assert_eq!(ring.next_key(), None);
    }
}
