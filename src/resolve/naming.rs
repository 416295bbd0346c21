//! Casing-aware name matching between schema field/symbol names and host
//! member names (§4.2): comparisons are case-insensitive and treat snake,
//! camel, pascal and kebab casings of the same identifier as equal.

/// Matches a schema-side name against a host-side name.
///
/// The default implementation normalizes both sides to a lowercase,
/// separator-free form (`fooBar`, `foo_bar`, `FooBar` and `foo-bar` all
/// normalize to `foobar`) before comparing, so callers don't need to agree on
/// one casing convention up front. Implementors that need stricter or
/// custom matching (e.g. exact case-sensitive names) can override `matches`
/// directly.
pub trait NameMatcher {
	fn matches(&self, schema_name: &str, host_name: &str) -> bool {
		normalize(schema_name) == normalize(host_name)
	}
}

/// The matcher `Member`/`NamedMember` lookups use when the caller hasn't
/// supplied a custom one.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultNameMatcher;

impl NameMatcher for DefaultNameMatcher {}

/// Strips `_`/`-` separators and lowercases, so `foo_bar`, `fooBar`,
/// `FooBar` and `foo-bar` all collapse to the same key.
fn normalize(name: &str) -> String {
	name.chars()
		.filter(|c| *c != '_' && *c != '-')
		.flat_map(char::to_lowercase)
		.collect()
}

/// Finds the index of the schema-side name (or alias) in `candidates` that
/// matches `host_name`, preferring an exact match over a casing-normalized
/// one so an author who aliased two near-identical names isn't surprised by
/// which one wins.
pub fn find_best_match<'a>(
	matcher: &impl NameMatcher,
	candidates: impl Iterator<Item = &'a str>,
	host_name: &str,
) -> Option<usize> {
	let mut fallback = None;
	for (i, candidate) in candidates.enumerate() {
		if candidate == host_name {
			return Some(i);
		}
		if fallback.is_none() && matcher.matches(candidate, host_name) {
			fallback = Some(i);
		}
	}
	fallback
}

/// Finds the member among `members` whose name or one of whose aliases
/// matches `field_name`, preferring an exact match (name or alias) over a
/// casing-normalized one. Built on [`find_best_match`]: each member
/// contributes its name and every alias as a candidate, and the winning
/// candidate's member index is reported back to the caller.
///
/// `members` yields `(index, member)` rather than just `&NamedMember<T>` so
/// callers whose member list is partially consumed (e.g. a record writer
/// that `take`s each member as it's matched) can skip the taken slots while
/// keeping the original indices intact.
pub fn find_member_index<'a, T: 'a>(
	matcher: &impl NameMatcher,
	members: impl Iterator<Item = (usize, &'a super::NamedMember<T>)>,
	field_name: &str,
) -> Option<usize> {
	let mut candidates = Vec::new();
	let mut index_of = Vec::new();
	for (idx, member) in members {
		candidates.push(member.name.as_str());
		index_of.push(idx);
		for alias in &member.aliases {
			candidates.push(alias.as_str());
			index_of.push(idx);
		}
	}
	let pos = find_best_match(matcher, candidates.into_iter(), field_name)?;
	Some(index_of[pos])
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn matches_across_casings() {
		let m = DefaultNameMatcher;
		assert!(m.matches("foo_bar", "fooBar"));
		assert!(m.matches("FooBar", "foo-bar"));
		assert!(m.matches("foo_bar", "foo_bar"));
		assert!(!m.matches("foo_bar", "foobaz"));
	}

	#[test]
	fn find_best_match_prefers_exact() {
		let m = DefaultNameMatcher;
		let candidates = ["fooBar", "foo_bar"];
		assert_eq!(find_best_match(&m, candidates.into_iter(), "foo_bar"), Some(1));
	}

	#[test]
	fn find_best_match_falls_back_to_casing() {
		let m = DefaultNameMatcher;
		let candidates = ["fooBar"];
		assert_eq!(find_best_match(&m, candidates.into_iter(), "foo_bar"), Some(0));
	}

	#[test]
	fn find_member_index_matches_by_alias() {
		use crate::resolve::{Member, NamedMember};

		let m = DefaultNameMatcher;
		let members = vec![
			NamedMember {
				name: "first".to_owned(),
				aliases: vec!["old_first".to_owned()],
				member: Member::new(|t: &i32| Some(t)),
			},
			NamedMember {
				name: "second".to_owned(),
				aliases: Vec::new(),
				member: Member::new(|t: &i32| Some(t)),
			},
		];
		assert_eq!(
			find_member_index(&m, members.iter().enumerate(), "old_first"),
			Some(0)
		);
		assert_eq!(find_member_index(&m, members.iter().enumerate(), "Second"), Some(1));
		assert_eq!(find_member_index(&m, members.iter().enumerate(), "missing"), None);
	}
}
