//! Decoded request parameters.
//!
//! Shortcode attributes and search-form query strings both arrive as
//! `key=value` pairs. Form arrays use PHP-style brackets (`in_tag[]=3`,
//! `price[0]=10`, `custom_field[color][]=red`), which these accessors
//! understand without exposing the bracket syntax to callers.

use std::collections::BTreeMap;

/// Ordered list of decoded `key=value` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParams {
    pairs: Vec<(String, String)>,
}

impl RequestParams {
    /// Decode an `application/x-www-form-urlencoded` string.
    pub fn from_query_string(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            pairs: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Whether the key was sent at all, even with an empty value.
    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Last value sent for a scalar key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Trimmed, non-empty scalar value.
    pub fn get_non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Every value sent for `key`, `key[]` or `key[n]`, in request order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key || bracket_suffix(k, key).is_some())
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Values of a positional array (`key[0]`, `key[1]`, ...), by index.
    pub fn get_indexed(&self, key: &str) -> BTreeMap<usize, &str> {
        let mut indexed = BTreeMap::new();
        for (k, v) in &self.pairs {
            if let Some(index) = bracket_suffix(k, key).and_then(|i| i.parse().ok()) {
                indexed.insert(index, v.as_str());
            }
        }
        indexed
    }

    /// Entries of a nested map such as `custom_field[color]=red` or
    /// `custom_field[color][]=red`.
    pub fn get_nested(&self, key: &str) -> BTreeMap<String, NestedValue> {
        let mut nested: BTreeMap<String, NestedValue> = BTreeMap::new();
        for (k, v) in &self.pairs {
            let Some(rest) = k.strip_prefix(key).and_then(|r| r.strip_prefix('[')) else {
                continue;
            };
            let Some((name, tail)) = rest.split_once(']') else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            if tail.is_empty() {
                nested.insert(name.to_string(), NestedValue::Scalar(v.clone()));
            } else if tail.starts_with('[') {
                match nested
                    .entry(name.to_string())
                    .or_insert_with(|| NestedValue::List(Vec::new()))
                {
                    NestedValue::List(values) => values.push(v.clone()),
                    scalar @ NestedValue::Scalar(_) => {
                        *scalar = NestedValue::List(vec![v.clone()]);
                    }
                }
            }
        }
        nested
    }
}

/// Value of one nested map entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NestedValue {
    Scalar(String),
    List(Vec<String>),
}

/// Contents of the brackets when `candidate` is `key[...]`.
fn bracket_suffix<'a>(candidate: &'a str, key: &str) -> Option<&'a str> {
    candidate
        .strip_prefix(key)?
        .strip_prefix('[')?
        .strip_suffix(']')
}
