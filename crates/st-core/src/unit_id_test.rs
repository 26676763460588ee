use super::*;
use chrono::TimeZone;

#[test]
fn parses_timestamped_id() {
    let id = ChangeUnitId::parse("20251227034100_unify_reference_values").unwrap();
    assert_eq!(id.timestamp(), "20251227034100");
    assert_eq!(id.slug(), "unify_reference_values");
    assert_eq!(id, "20251227034100_unify_reference_values");
}

#[test]
fn rejects_missing_slug() {
    assert!(ChangeUnitId::parse("20251227034100").is_err());
    assert!(ChangeUnitId::parse("20251227034100_").is_err());
}

#[test]
fn rejects_bad_timestamp() {
    let err = ChangeUnitId::parse("2025122703410x_seed").unwrap_err();
    assert!(err.to_string().contains("14-digit"));

    // Month 13 is not a calendar date
    assert!(ChangeUnitId::parse("20251327034100_seed").is_err());
}

#[test]
fn rejects_punctuation_in_slug() {
    assert!(ChangeUnitId::parse("20251227034100_add-logo").is_err());
    assert!(ChangeUnitId::parse("20251227034100_add logo").is_err());
}

#[test]
fn rejects_multibyte_prefix_without_panicking() {
    assert!(ChangeUnitId::parse("é0251227034100_seed_values").is_err());
}

#[test]
fn ordering_follows_timestamp() {
    let mut ids = vec![
        ChangeUnitId::parse("20260122200000_rename_templates").unwrap(),
        ChangeUnitId::parse("20251227034100_unify_reference_values").unwrap(),
        ChangeUnitId::parse("20251229203039_expand_event_category").unwrap(),
    ];
    ids.sort();
    let ordered: Vec<&str> = ids.iter().map(|i| i.as_str()).collect();
    assert_eq!(
        ordered,
        vec![
            "20251227034100_unify_reference_values",
            "20251229203039_expand_event_category",
            "20260122200000_rename_templates",
        ]
    );
}

#[test]
fn generate_normalises_slug() {
    let at = Utc.with_ymd_and_hms(2026, 1, 28, 10, 0, 0).unwrap();
    let id = ChangeUnitId::generate("  Add Admin Email-Templates!! ", at).unwrap();
    assert_eq!(id.as_str(), "20260128100000_add_admin_email_templates");
}

#[test]
fn generate_rejects_empty_slug() {
    let at = Utc.with_ymd_and_hms(2026, 1, 28, 10, 0, 0).unwrap();
    assert!(ChangeUnitId::generate("---", at).is_err());
}

#[test]
fn serde_roundtrip_validates() {
    let id: ChangeUnitId = serde_json::from_str(r#""20251227034100_seed""#).unwrap();
    assert_eq!(serde_json::to_string(&id).unwrap(), r#""20251227034100_seed""#);

    let bad: Result<ChangeUnitId, _> = serde_json::from_str(r#""not_an_id""#);
    assert!(bad.is_err());
}
