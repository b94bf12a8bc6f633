//! Criteria matching over entity metadata, and the facet summary built from it.

use serde::Deserialize;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Metadata attached to a mesh, keyed by property name.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A metadata value.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<PropertyValue>),
    Map(Properties),
}

impl PropertyValue {
    /// Numbers, and text that parses entirely as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(n) => Some(*n),
            PropertyValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Null => Ok(()),
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Number(n) => write!(f, "{n}"),
            PropertyValue::Text(s) => f.write_str(s),
            PropertyValue::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            PropertyValue::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{key}:{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(values: Vec<T>) -> Self {
        PropertyValue::List(values.into_iter().map(Into::into).collect())
    }
}

/// Ordering used by every comparison: numeric when both sides are numbers
/// (or numeric text), otherwise case-insensitive text.
pub fn compare(a: &PropertyValue, b: &PropertyValue) -> Ordering {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return x.partial_cmp(&y).unwrap_or(Ordering::Equal);
    }
    a.to_string().to_lowercase().cmp(&b.to_string().to_lowercase())
}

/// Resolve a property path such as `a.b`, `list[2].name` or `roads.*.kind`.
///
/// `*` fans out over every element of a list or map and yields the list of
/// what each branch resolved to. A missing segment resolves to `None`.
pub fn resolve<'a>(root: &'a PropertyValue, path: &str) -> Option<Cow<'a, PropertyValue>> {
    let normalized = normalize(path);
    let segments: Vec<&str> = split(&normalized);
    resolve_segments(root, &segments)
}

/// [`resolve`] starting from a property map.
pub fn resolve_in<'a>(properties: &'a Properties, path: &str) -> Option<Cow<'a, PropertyValue>> {
    let normalized = normalize(path);
    let segments: Vec<&str> = split(&normalized);
    let (first, rest) = segments.split_first()?;
    if *first == "*" {
        let resolved = properties
            .values()
            .filter_map(|value| resolve_segments(value, rest))
            .map(Cow::into_owned)
            .collect();
        return Some(Cow::Owned(PropertyValue::List(resolved)));
    }
    resolve_segments(properties.get(*first)?, rest)
}

fn normalize(path: &str) -> String {
    path.replace('[', ".").replace(']', "")
}

fn split(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn resolve_segments<'a>(root: &'a PropertyValue, segments: &[&str]) -> Option<Cow<'a, PropertyValue>> {
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        if *segment == "*" {
            let rest = &segments[i + 1..];
            let branches: Vec<&PropertyValue> = match current {
                PropertyValue::List(items) => items.iter().collect(),
                PropertyValue::Map(map) => map.values().collect(),
                _ => return None,
            };
            let resolved = branches
                .into_iter()
                .filter_map(|branch| resolve_segments(branch, rest))
                .map(Cow::into_owned)
                .collect();
            return Some(Cow::Owned(PropertyValue::List(resolved)));
        }
        current = match current {
            PropertyValue::Map(map) => map.get(*segment)?,
            PropertyValue::List(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(Cow::Borrowed(current))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Comparator::Eq => ordering == Ordering::Equal,
            Comparator::Ne => ordering != Ordering::Equal,
            Comparator::Lt => ordering == Ordering::Less,
            Comparator::Le => ordering != Ordering::Greater,
            Comparator::Gt => ordering == Ordering::Greater,
            Comparator::Ge => ordering != Ordering::Less,
        }
    }
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "=" | "==" => Ok(Comparator::Eq),
            "!=" => Ok(Comparator::Ne),
            "<" => Ok(Comparator::Lt),
            "<=" => Ok(Comparator::Le),
            ">" => Ok(Comparator::Gt),
            ">=" => Ok(Comparator::Ge),
            other => Err(format!("unknown comparator {other:?}")),
        }
    }
}

/// What one path must satisfy.
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    Equals(PropertyValue),
    AnyOf(Vec<PropertyValue>),
    Compare(Comparator, PropertyValue),
}

impl Criterion {
    /// A list-valued property matches when any of its elements does.
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        if let PropertyValue::List(items) = value {
            return items.iter().any(|item| self.accepts(item));
        }
        match self {
            Criterion::Equals(expected) => compare(value, expected) == Ordering::Equal,
            Criterion::AnyOf(accepted) => accepted
                .iter()
                .any(|expected| compare(value, expected) == Ordering::Equal),
            Criterion::Compare(comparator, expected) => comparator.accepts(compare(value, expected)),
        }
    }
}

/// Path → criterion. An entity matches when every non-excluded path
/// resolves and is accepted.
///
/// Boards compare criteria by identity (`Rc::ptr_eq`), so hold on to the
/// `Rc` to skip redundant highlight rebuilds.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Criteria {
    entries: BTreeMap<String, Criterion>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// A list value accepts any of its elements.
    pub fn with(mut self, path: &str, value: impl Into<PropertyValue>) -> Self {
        let criterion = match value.into() {
            PropertyValue::List(items) => Criterion::AnyOf(items),
            other => Criterion::Equals(other),
        };
        self.entries.insert(path.to_string(), criterion);
        self
    }

    pub fn with_any<V: Into<PropertyValue>>(mut self, path: &str, values: Vec<V>) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.entries.insert(path.to_string(), Criterion::AnyOf(values));
        self
    }

    pub fn with_comparison(
        mut self,
        path: &str,
        comparator: Comparator,
        value: impl Into<PropertyValue>,
    ) -> Self {
        self.entries
            .insert(path.to_string(), Criterion::Compare(comparator, value.into()));
        self
    }

    /// Criteria selecting entities whose metadata equals `properties`.
    /// Nested maps become dotted paths, lists become any-of sets.
    pub fn from_properties(properties: &Properties) -> Self {
        let mut criteria = Self::new();
        flatten_into(&mut criteria.entries, "", properties);
        criteria
    }

    pub fn get(&self, path: &str) -> Option<&Criterion> {
        self.entries.get(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Criterion)> {
        self.entries.iter().map(|(path, criterion)| (path.as_str(), criterion))
    }

    /// Check `properties` under `root` (a path prefix, empty for the top level).
    /// Paths equal to or under an entry of `excluded` are skipped.
    pub fn matches(&self, properties: &Properties, excluded: &[&str], root: &str) -> bool {
        self.entries.iter().all(|(path, criterion)| {
            if is_excluded(path, excluded) {
                return true;
            }
            let full = if root.is_empty() {
                Cow::Borrowed(path.as_str())
            } else {
                Cow::Owned(format!("{root}.{path}"))
            };
            resolve_in(properties, &full).is_some_and(|value| criterion.accepts(&value))
        })
    }
}

fn is_excluded(path: &str, excluded: &[&str]) -> bool {
    excluded.iter().any(|prefix| {
        path == *prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('['))
    })
}

fn flatten_into(entries: &mut BTreeMap<String, Criterion>, prefix: &str, properties: &Properties) {
    for (key, value) in properties {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            PropertyValue::Map(nested) => flatten_into(entries, &path, nested),
            PropertyValue::List(items) => {
                entries.insert(path, Criterion::AnyOf(items.clone()));
            }
            other => {
                entries.insert(path, Criterion::Equals(other.clone()));
            }
        }
    }
}

/// Distinct values seen for one key across a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum SummaryEntry {
    Text(BTreeSet<String>),
    Number { min: f64, max: f64 },
    Bool { seen_true: bool, seen_false: bool },
    Nested(Summary),
    /// The key was seen with values of different kinds.
    Mixed,
}

/// Facet summary: property name → distinct values seen.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Summary {
    entries: BTreeMap<String, SummaryEntry>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&SummaryEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SummaryEntry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    /// Fold `properties` in. Never forgets a value; rebuild from scratch to
    /// drop stale ones.
    pub fn update(&mut self, properties: &Properties) {
        for (key, value) in properties {
            self.fold(key, value);
        }
    }

    fn fold(&mut self, key: &str, value: &PropertyValue) {
        match value {
            PropertyValue::Null => {}
            PropertyValue::List(items) => {
                for item in items {
                    self.fold(key, item);
                }
            }
            _ => match self.entries.get_mut(key) {
                Some(entry) => entry.absorb(value),
                None => {
                    self.entries.insert(key.to_string(), SummaryEntry::first(value));
                }
            },
        }
    }
}

impl SummaryEntry {
    fn first(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Text(s) => SummaryEntry::Text(BTreeSet::from([s.clone()])),
            PropertyValue::Number(n) => SummaryEntry::Number { min: *n, max: *n },
            PropertyValue::Bool(b) => SummaryEntry::Bool {
                seen_true: *b,
                seen_false: !*b,
            },
            PropertyValue::Map(map) => {
                let mut nested = Summary::new();
                nested.update(map);
                SummaryEntry::Nested(nested)
            }
            PropertyValue::Null | PropertyValue::List(_) => SummaryEntry::Mixed,
        }
    }

    fn absorb(&mut self, value: &PropertyValue) {
        let conflict = match (&mut *self, value) {
            (SummaryEntry::Mixed, _) => false,
            (SummaryEntry::Text(seen), PropertyValue::Text(s)) => {
                seen.insert(s.clone());
                false
            }
            (SummaryEntry::Number { min, max }, PropertyValue::Number(n)) => {
                *min = min.min(*n);
                *max = max.max(*n);
                false
            }
            (
                SummaryEntry::Bool {
                    seen_true,
                    seen_false,
                },
                PropertyValue::Bool(b),
            ) => {
                if *b {
                    *seen_true = true;
                } else {
                    *seen_false = true;
                }
                false
            }
            (SummaryEntry::Nested(nested), PropertyValue::Map(map)) => {
                nested.update(map);
                false
            }
            _ => true,
        };
        if conflict {
            *self = SummaryEntry::Mixed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, PropertyValue)]) -> Properties {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn sample() -> Properties {
        props(&[
            ("name", "France".into()),
            ("region", "EU".into()),
            ("population", 67.8.into()),
            ("code", "250".into()),
            ("tags", vec!["wine", "cheese"].into()),
            (
                "roads",
                PropertyValue::List(vec![
                    PropertyValue::Map(props(&[("kind", "highway".into())])),
                    PropertyValue::Map(props(&[("kind", "rail".into())])),
                ]),
            ),
        ])
    }

    #[test]
    fn test_resolve_paths() {
        let root = PropertyValue::Map(sample());
        assert_eq!(resolve(&root, "region").unwrap().as_text(), Some("EU"));
        assert_eq!(resolve(&root, "tags[1]").unwrap().as_text(), Some("cheese"));
        assert_eq!(resolve(&root, "roads.0.kind").unwrap().as_text(), Some("highway"));
        assert!(resolve(&root, "missing").is_none());
        assert!(resolve(&root, "tags[9]").is_none());

        let kinds = resolve(&root, "roads.*.kind").unwrap().into_owned();
        assert_eq!(kinds, PropertyValue::from(vec!["highway", "rail"]));
    }

    #[test]
    fn test_equality_is_case_insensitive() {
        let criteria = Criteria::new().with("region", "eu");
        assert!(criteria.matches(&sample(), &[], ""));
    }

    #[test]
    fn test_missing_path_never_matches() {
        let criteria = Criteria::new().with("continent", "Europe");
        assert!(!criteria.matches(&sample(), &[], ""));
    }

    #[test]
    fn test_any_of_and_list_properties() {
        let criteria = Criteria::new().with_any("region", vec!["NA", "EU"]);
        assert!(criteria.matches(&sample(), &[], ""));
        let criteria = Criteria::new().with("tags", "cheese");
        assert!(criteria.matches(&sample(), &[], ""));
        let criteria = Criteria::new().with("roads.*.kind", "rail");
        assert!(criteria.matches(&sample(), &[], ""));
    }

    #[test]
    fn test_comparators() {
        let sample = sample();
        let gt = Criteria::new().with_comparison("population", Comparator::Gt, 50.0);
        assert!(gt.matches(&sample, &[], ""));
        let lt = Criteria::new().with_comparison("population", Comparator::Lt, 50.0);
        assert!(!lt.matches(&sample, &[], ""));
        // "250" sorts after "1000" as text but before it as a number.
        let code = Criteria::new().with_comparison("code", Comparator::Lt, "1000");
        assert!(code.matches(&sample, &[], ""));
        let ne = Criteria::new().with_comparison("name", Comparator::Ne, "germany");
        assert!(ne.matches(&sample, &[], ""));
        assert_eq!(">=".parse::<Comparator>(), Ok(Comparator::Ge));
        assert!("~".parse::<Comparator>().is_err());
    }

    #[test]
    fn test_excluded_paths_are_skipped() {
        let criteria = Criteria::new()
            .with("region", "EU")
            .with("position", "anywhere")
            .with("position.longitude", 3.0);
        assert!(!criteria.matches(&sample(), &[], ""));
        assert!(criteria.matches(&sample(), &["position"], ""));
    }

    #[test]
    fn test_root_prefix() {
        let outer = props(&[("meta", PropertyValue::Map(sample()))]);
        let criteria = Criteria::new().with("region", "EU");
        assert!(criteria.matches(&outer, &[], "meta"));
        assert!(!criteria.matches(&outer, &[], "other"));
    }

    #[test]
    fn test_from_properties_matches_itself() {
        let sample = sample();
        let criteria = Criteria::from_properties(&sample);
        assert!(criteria.matches(&sample, &[], ""));
        let mut other = sample.clone();
        other.insert("region".into(), "NA".into());
        assert!(!criteria.matches(&other, &[], ""));
    }

    #[test]
    fn test_summary_scenario() {
        let mut summary = Summary::new();
        summary.update(&props(&[("region", "EU".into())]));
        summary.update(&props(&[("region", "NA".into())]));
        assert_eq!(
            summary.get("region"),
            Some(&SummaryEntry::Text(BTreeSet::from(["EU".to_string(), "NA".to_string()])))
        );
    }

    #[test]
    fn test_summary_kinds() {
        let mut summary = Summary::new();
        summary.update(&sample());
        summary.update(&props(&[
            ("population", 3.5.into()),
            ("name", true.into()),
            ("flag", false.into()),
        ]));
        assert_eq!(
            summary.get("population"),
            Some(&SummaryEntry::Number { min: 3.5, max: 67.8 })
        );
        assert_eq!(summary.get("name"), Some(&SummaryEntry::Mixed));
        assert_eq!(
            summary.get("tags"),
            Some(&SummaryEntry::Text(BTreeSet::from([
                "cheese".to_string(),
                "wine".to_string()
            ])))
        );
        assert_eq!(
            summary.get("flag"),
            Some(&SummaryEntry::Bool {
                seen_true: false,
                seen_false: true
            })
        );
        match summary.get("roads") {
            Some(SummaryEntry::Nested(nested)) => assert_eq!(
                nested.get("kind"),
                Some(&SummaryEntry::Text(BTreeSet::from([
                    "highway".to_string(),
                    "rail".to_string()
                ])))
            ),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_property_values() {
        let mut json = br#"{"a": 1, "b": "x", "c": [true, null], "d": {"e": 2.5}}"#.to_vec();
        let parsed: Properties = simd_json::serde::from_slice(&mut json).unwrap();
        assert_eq!(parsed["a"], PropertyValue::Number(1.0));
        assert_eq!(parsed["b"], PropertyValue::Text("x".into()));
        assert_eq!(
            parsed["c"],
            PropertyValue::List(vec![PropertyValue::Bool(true), PropertyValue::Null])
        );
        assert_eq!(parsed["d"], PropertyValue::Map(props(&[("e", 2.5.into())])));
    }
}
