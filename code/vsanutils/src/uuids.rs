/// CMMDS UUIDs are lowercase hex in 8-4-4-4-12 groups.  The pattern is a bit more permissive than
/// that (any lowercase alphanumeric) because the dumps are not always strict about it.

pub const UUID_PATTERN: &str = "[0-9a-z]{8}-[0-9a-z]{4}-[0-9a-z]{4}-[0-9a-z]{4}-[0-9a-z]{12}";

pub const ZERO_UUID: &str = "00000000-0000-0000-0000-000000000000";

#[test]
fn test_zero_uuid_matches_pattern() {
    let re = regex::Regex::new(&format!("^{UUID_PATTERN}$")).unwrap();
    assert!(re.is_match(ZERO_UUID));
    assert!(re.is_match("5c8a6a5e-3a4c-2f1b-9e1d-0050569a1b2c"));
    assert!(!re.is_match("5c8a6a5e-3a4c-2f1b-9e1d"));
}
