use serde::de::{self, Deserializer, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Directed address pair as sent by the service. Either endpoint may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressPair {
    pub from: Option<u64>,
    pub to: Option<u64>,
}

impl AddressPair {
    pub fn new(from: u64, to: u64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    /// Both endpoints, or `None` when either is null, absent or zero.
    pub fn endpoints(&self) -> Option<(u64, u64)> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from != 0 && to != 0 => Some((from, to)),
            _ => None,
        }
    }
}

impl From<&Value> for AddressPair {
    fn from(value: &Value) -> Self {
        let endpoint = |index: usize| value.get(index).and_then(Value::as_u64);
        Self {
            from: endpoint(0),
            to: endpoint(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceGroup {
    pub key: String,
    pub pairs: Vec<AddressPair>,
}

/// Provenance field of a decompile reply, groups kept in the order the service wrote them.
/// Anything other than a map reads as no groups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceGroups {
    groups: Vec<ProvenanceGroup>,
}

impl ProvenanceGroups {
    pub fn new(groups: Vec<ProvenanceGroup>) -> Self {
        Self { groups }
    }

    pub fn groups(&self) -> &[ProvenanceGroup] {
        &self.groups
    }

    pub fn pairs(&self) -> impl Iterator<Item = &AddressPair> {
        self.groups.iter().flat_map(|group| group.pairs.iter())
    }
}

impl<'de> Deserialize<'de> for ProvenanceGroups {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct GroupsVisitor;

        impl<'de> Visitor<'de> for GroupsVisitor {
            type Value = ProvenanceGroups;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of provenance groups")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut groups = Vec::new();
                while let Some((key, value)) = map.next_entry::<String, Value>()? {
                    let pairs = match value {
                        Value::Array(items) => items.iter().map(AddressPair::from).collect(),
                        _ => Vec::new(),
                    };
                    groups.push(ProvenanceGroup { key, pairs });
                }
                Ok(ProvenanceGroups { groups })
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProvenanceGroups::default())
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProvenanceGroups::default())
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                while seq.next_element::<IgnoredAny>()?.is_some() {}
                Ok(ProvenanceGroups::default())
            }

            fn visit_str<E>(self, _: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProvenanceGroups::default())
            }

            fn visit_bool<E>(self, _: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProvenanceGroups::default())
            }

            fn visit_i64<E>(self, _: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProvenanceGroups::default())
            }

            fn visit_u64<E>(self, _: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProvenanceGroups::default())
            }

            fn visit_f64<E>(self, _: f64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(ProvenanceGroups::default())
            }
        }

        deserializer.deserialize_any(GroupsVisitor)
    }
}

pub fn address_token(address: u64) -> String {
    format!("{address:x}")
}

/// Symmetric adjacency between address tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceIndex {
    adjacency: BTreeMap<String, Vec<String>>,
}

impl ProvenanceIndex {
    /// Records every usable pair in both directions. Duplicates are kept and
    /// each address lists its neighbours in encounter order.
    pub fn symmetrize(groups: &ProvenanceGroups) -> Self {
        let mut adjacency: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (from, to) in groups.pairs().filter_map(AddressPair::endpoints) {
            let from_hex = address_token(from);
            let to_hex = address_token(to);
            adjacency
                .entry(from_hex.clone())
                .or_default()
                .push(to_hex.clone());
            adjacency.entry(to_hex).or_default().push(from_hex);
        }
        Self { adjacency }
    }

    pub fn related(&self, token: &str) -> &[String] {
        self.adjacency
            .get(token)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.adjacency.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.adjacency
            .iter()
            .map(|(token, related)| (token.as_str(), related.as_slice()))
    }
}
