//! Configuration values and ordered maps.

// ── ConfValue ────────────────────────────────────────────────────────

/// A configuration value: scalar or nested array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfValue {
    Str(String),
    Int(i64),
    Bool(bool),
    Map(ConfMap),
}

impl ConfValue {
    /// Shorthand for a string value.
    pub fn str(s: impl Into<String>) -> Self {
        ConfValue::Str(s.into())
    }

    /// Render this value as PHP at the given nesting depth.
    pub(crate) fn write_php(&self, out: &mut String, depth: usize) {
        match self {
            ConfValue::Str(s) => {
                out.push('\'');
                for ch in s.chars() {
                    match ch {
                        '\'' => out.push_str("\\'"),
                        '\\' => out.push_str("\\\\"),
                        _ => out.push(ch),
                    }
                }
                out.push('\'');
            }
            ConfValue::Int(n) => out.push_str(&n.to_string()),
            ConfValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
            ConfValue::Map(map) => map.write_php(out, depth),
        }
    }
}

// ── ConfMap ──────────────────────────────────────────────────────────

/// An ordered string-keyed map. Insertion order is preserved so that
/// serialization is deterministic and matches what was parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfMap {
    entries: Vec<(String, ConfValue)>,
}

impl ConfMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Replace the value at `key`, or append a new entry.
    pub fn set(&mut self, key: &str, value: ConfValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    /// Mutable access to the map at `key`, inserting an empty map when
    /// the key is absent. Returns `None` when the key holds a scalar.
    pub(crate) fn entry_map(&mut self, key: &str) -> Option<&mut ConfMap> {
        if self.get(key).is_none() {
            self.entries
                .push((key.to_string(), ConfValue::Map(ConfMap::new())));
        }
        let (_, value) = self.entries.iter_mut().find(|(k, _)| k == key)?;
        match value {
            ConfValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn write_php(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        let inner = "  ".repeat(depth + 1);
        out.push_str("array (\n");
        for (key, value) in &self.entries {
            out.push_str(&inner);
            out.push('\'');
            for ch in key.chars() {
                match ch {
                    '\'' => out.push_str("\\'"),
                    '\\' => out.push_str("\\\\"),
                    _ => out.push(ch),
                }
            }
            out.push_str("' => ");
            if let ConfValue::Map(_) = value {
                out.push('\n');
                out.push_str(&inner);
            }
            value.write_php(out, depth + 1);
            out.push_str(",\n");
        }
        out.push_str(&pad);
        out.push(')');
    }
}

impl FromIterator<(String, ConfValue)> for ConfMap {
    fn from_iter<I: IntoIterator<Item = (String, ConfValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_preserves_insertion_order() {
        let mut map = ConfMap::new();
        map.set("b", ConfValue::Int(1));
        map.set("a", ConfValue::Int(2));
        map.set("b", ConfValue::Int(3));

        let keys: Vec<_> = map.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(map.get("b"), Some(&ConfValue::Int(3)));
    }

    #[test]
    fn string_escaping() {
        let mut out = String::new();
        ConfValue::str("it's a \\ test").write_php(&mut out, 0);
        assert_eq!(out, r"'it\'s a \\ test'");
    }
}
