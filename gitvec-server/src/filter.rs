//! Translates the wire-level Qdrant-style filter JSON into the core's
//! narrow `Filter` predicate set. Anything that doesn't resolve to
//! `language`/`file_path`/`branch`/`type` is rejected, never silently
//! dropped.

use gitvec_core::error::CoreError;
use gitvec_core::model::Filter;
use gitvec_protocol::FilterJson;

pub fn to_core_filter(json: &FilterJson) -> Result<Filter, CoreError> {
    match json {
        FilterJson::Must { must } => Ok(Filter::Must(must.iter().map(to_core_filter).collect::<Result<_, _>>()?)),
        FilterJson::MustNot { must_not } => {
            Ok(Filter::MustNot(must_not.iter().map(to_core_filter).collect::<Result<_, _>>()?))
        }
        FilterJson::Should { should } => Ok(Filter::Should(should.iter().map(to_core_filter).collect::<Result<_, _>>()?)),
        FilterJson::Leaf { key, match_, range } => {
            if range.is_some() {
                return Err(CoreError::UnsupportedFilter(format!("range leaf on key {key:?} is not conforming")));
            }
            let value = match_
                .as_ref()
                .ok_or_else(|| CoreError::UnsupportedFilter(format!("leaf on key {key:?} has no match value")))?
                .value
                .clone();

            match key.as_str() {
                "language" => Ok(Filter::Language(value)),
                "file_path" => Ok(Filter::FilePathGlob(value)),
                "branch" => Ok(Filter::Branch(value)),
                "type" => Ok(Filter::Type(value)),
                other => Err(CoreError::UnsupportedFilter(format!("unrecognized filter key {other:?}"))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitvec_protocol::MatchJson;

    #[test]
    fn leaf_on_known_key_translates() {
        let json = FilterJson::Leaf { key: "language".to_string(), match_: Some(MatchJson { value: "rust".to_string() }), range: None };
        assert!(matches!(to_core_filter(&json), Ok(Filter::Language(v)) if v == "rust"));
    }

    #[test]
    fn unrecognized_key_is_rejected() {
        let json = FilterJson::Leaf { key: "owner".to_string(), match_: Some(MatchJson { value: "x".to_string() }), range: None };
        assert!(to_core_filter(&json).is_err());
    }

    #[test]
    fn nested_must_not_translates_recursively() {
        let json = FilterJson::MustNot {
            must_not: vec![FilterJson::Leaf { key: "branch".to_string(), match_: Some(MatchJson { value: "main".to_string() }), range: None }],
        };
        let translated = to_core_filter(&json).unwrap();
        assert!(matches!(translated, Filter::MustNot(inner) if matches!(inner.as_slice(), [Filter::Branch(b)] if b == "main")));
    }
}
