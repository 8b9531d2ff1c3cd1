//! Ordered header representations.
//!
//! Header order and duplicate names are semantically significant for HTTP, so
//! neither form here is allowed to collapse into a unique-key map. The keyed
//! form groups values under the first occurrence of each name; the pair form
//! is the fully flattened sequence the breakpoint editor works with.

use serde::{Deserialize, Serialize};

/// One flattened header line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderPair {
    pub name: String,
    pub value: String,
}

impl HeaderPair {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One keyed header entry: a name plus its ordered values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeaderField {
    pub name: String,
    pub values: Vec<String>,
}

/// Canonical keyed header form. Invariant: at most one entry per name
/// (ASCII case-insensitive), entries ordered by first occurrence. `push` and
/// `from_pairs` maintain the invariant; duplicate sends of the same name
/// append to the existing entry's values.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct HeaderFields(pub Vec<HeaderField>);

impl HeaderFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        if let Some(field) = self
            .0
            .iter_mut()
            .find(|field| field.name.eq_ignore_ascii_case(&name))
        {
            field.values.push(value);
        } else {
            self.0.push(HeaderField {
                name,
                values: vec![value],
            });
        }
    }

    pub fn get(&self, name: &str) -> Option<&HeaderField> {
        self.0
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Flattens to the editor's ordered pair form. Multi-valued entries emit
    /// one pair per value, in stored order.
    pub fn to_pairs(&self) -> Vec<HeaderPair> {
        self.0
            .iter()
            .flat_map(|field| {
                field
                    .values
                    .iter()
                    .map(|value| HeaderPair::new(field.name.clone(), value.clone()))
            })
            .collect()
    }

    /// Rebuilds the keyed form from an ordered pair sequence, grouping values
    /// under the first occurrence of each name.
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = &'a HeaderPair>,
    {
        let mut fields = Self::new();
        for pair in pairs {
            fields.push(pair.name.clone(), pair.value.clone());
        }
        fields
    }

    /// Number of keyed entries (not flattened lines).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<HeaderPair> for HeaderFields {
    fn from_iter<I: IntoIterator<Item = HeaderPair>>(iter: I) -> Self {
        let mut fields = Self::new();
        for pair in iter {
            fields.push(pair.name, pair.value);
        }
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> HeaderFields {
        let mut fields = HeaderFields::new();
        fields.push("Host", "example.test");
        fields.push("Set-Cookie", "a=1");
        fields.push("Accept", "*/*");
        fields.push("Set-Cookie", "b=2");
        fields
    }

    #[test]
    fn duplicates_group_under_first_occurrence() {
        let fields = sample();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.0[1].name, "Set-Cookie");
        assert_eq!(fields.0[1].values, ["a=1", "b=2"]);
    }

    #[test]
    fn keyed_to_pairs_to_keyed_round_trip_is_exact() {
        let fields = sample();
        let pairs = fields.to_pairs();
        assert_eq!(pairs.len(), 4);
        let rebuilt = HeaderFields::from_pairs(&pairs);
        assert_eq!(rebuilt, fields);
    }

    #[test]
    fn pair_order_follows_field_order() {
        let pairs = sample().to_pairs();
        let names: Vec<&str> = pairs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Host", "Set-Cookie", "Set-Cookie", "Accept"]);
    }

    #[test]
    fn grouping_is_case_insensitive_but_keeps_first_spelling() {
        let pairs = vec![
            HeaderPair::new("X-Trace", "one"),
            HeaderPair::new("x-trace", "two"),
        ];
        let fields = HeaderFields::from_pairs(&pairs);
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.0[0].name, "X-Trace");
        assert_eq!(fields.0[0].values, ["one", "two"]);
    }

    #[test]
    fn lookup_ignores_case() {
        let fields = sample();
        assert!(fields.get("set-cookie").is_some());
        assert!(fields.get("x-missing").is_none());
    }
}
