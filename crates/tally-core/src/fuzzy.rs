//! Single-edit tolerance for phone numbers and email addresses.
//!
//! The comparison is positional: characters are compared index by index, and
//! a position present in only one of the two values counts as a mismatch. An
//! insertion or deletion early in a value therefore shifts every later
//! character and is not recognised as a near match.

/// Maximum number of mismatched positions two values may differ by.
const TOLERANCE: usize = 1;

/// Whether `a` and `b` are the same value give or take one character.
///
/// An email address splits at the first `@` and only its local part is
/// compared; the domains must be byte-identical. A value without `@` (a phone
/// number, formatted or not) is compared whole, and only matches another value
/// without `@`. Empty values never match.
pub fn is_near_match(a: &str, b: &str) -> bool {
  if a.is_empty() || b.is_empty() {
    return false;
  }

  let (local_a, domain_a) = split_address(a);
  let (local_b, domain_b) = split_address(b);

  domain_a == domain_b
    && local_a.len().abs_diff(local_b.len()) <= TOLERANCE
    && positional_mismatches(local_a.as_bytes(), local_b.as_bytes()) <= TOLERANCE
}

/// [`is_near_match`] lifted over optional values; absence never matches.
pub fn is_near_match_opt(a: Option<&str>, b: Option<&str>) -> bool {
  matches!((a, b), (Some(a), Some(b)) if is_near_match(a, b))
}

/// `(local part, domain)`, or the whole value with no domain.
fn split_address(value: &str) -> (&str, Option<&str>) {
  value
    .split_once('@')
    .map_or((value, None), |(local, domain)| (local, Some(domain)))
}

/// Count differing positions up to the longer length.
fn positional_mismatches(a: &[u8], b: &[u8]) -> usize {
  let shared = a.iter().zip(b).filter(|(x, y)| x != y).count();
  shared + a.len().abs_diff(b.len())
}
