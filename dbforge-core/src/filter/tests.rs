//! Unit tests for filter compilation and evaluation.

use super::*;
use crate::models::{Column, FieldType};

fn schema() -> Schema {
    Schema::new(vec![
        Column::new("DATE_FIELD", FieldType::Date),
        Column::new("STAMP", FieldType::DateTime),
        Column::new("STATUS", FieldType::Character),
        Column::new("MONTO", FieldType::Numeric),
        Column::new("ACTIVO", FieldType::Logical),
    ])
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn datetime(y: i32, m: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, mi, s).unwrap()
}

fn compile(conditions: Vec<FilterCondition>) -> FilterEvaluator {
    FilterSet::new(conditions).compile(&schema()).unwrap()
}

// =============================================================================
// Operator parsing
// =============================================================================

#[test]
fn test_operator_from_str() {
    assert_eq!("=".parse::<Operator>().unwrap(), Operator::Eq);
    assert_eq!(">=".parse::<Operator>().unwrap(), Operator::Ge);
    assert_eq!("between".parse::<Operator>().unwrap(), Operator::Between);

    let err = "like".parse::<Operator>().unwrap_err();
    assert!(matches!(err, DbForgeError::Configuration { .. }));
    assert!(err.to_string().contains("like"));
}

#[test]
fn test_operator_defaults_to_equality() {
    let set = FilterSet::from_json_str(
        r#"{"enabled": true, "conditions": [{"field": "STATUS", "value": "A"}]}"#,
    )
    .unwrap();
    assert_eq!(set.conditions[0].operator, Operator::Eq);
}

#[test]
fn test_unknown_operator_is_configuration_error() {
    let err = FilterSet::from_json_str(
        r#"{"enabled": true, "conditions": [{"field": "STATUS", "operator": "invalid", "value": "A"}]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, DbForgeError::Configuration { .. }));
}

#[test]
fn test_condition_without_field_is_configuration_error() {
    let err = FilterSet::from_json_str(r#"{"enabled": true, "conditions": [{"value": "test"}]}"#)
        .unwrap_err();
    assert!(matches!(err, DbForgeError::Configuration { .. }));
}

// =============================================================================
// Compilation
// =============================================================================

#[test]
fn test_unknown_field_rejected_at_compile() {
    let err = FilterSet::new(vec![FilterCondition::new(
        "NONEXISTENT",
        Operator::Eq,
        "test",
    )])
    .compile(&schema())
    .unwrap_err();
    assert!(matches!(err, DbForgeError::Configuration { .. }));
    assert!(err.to_string().contains("NONEXISTENT"));
}

#[test]
fn test_between_requires_value2() {
    let condition = FilterCondition::new("MONTO", Operator::Between, 1);
    let err = FilterSet::new(vec![condition]).compile(&schema()).unwrap_err();
    assert!(err.to_string().contains("value2"));
}

#[test]
fn test_value2_only_valid_with_between() {
    let mut condition = FilterCondition::new("MONTO", Operator::Gt, 1);
    condition.value2 = Some(serde_json::json!(5));
    let err = FilterSet::new(vec![condition]).compile(&schema()).unwrap_err();
    assert!(matches!(err, DbForgeError::Configuration { .. }));
}

#[test]
fn test_uncoercible_config_value_rejected() {
    let cases = vec![
        FilterCondition::new("MONTO", Operator::Gt, "abc"),
        FilterCondition::new("DATE_FIELD", Operator::Eq, "2023-13-45"),
        FilterCondition::new("DATE_FIELD", Operator::Eq, 20230918),
        FilterCondition::new("STATUS", Operator::Eq, serde_json::Value::Null),
        FilterCondition::new("ACTIVO", Operator::Eq, "maybe"),
    ];
    for condition in cases {
        let field = condition.field.clone();
        let result = FilterSet::new(vec![condition]).compile(&schema());
        assert!(
            matches!(result, Err(DbForgeError::Configuration { .. })),
            "expected configuration error for {}",
            field
        );
    }
}

#[test]
fn test_disabled_set_skips_validation() {
    let set = FilterSet {
        enabled: false,
        conditions: vec![FilterCondition::new("NONEXISTENT", Operator::Eq, "x")],
    };
    let evaluator = set.compile(&schema()).unwrap();
    assert!(!evaluator.is_enabled());
    assert!(evaluator.evaluate(&Record::new()).unwrap());
}

// =============================================================================
// Evaluation
// =============================================================================

#[test]
fn test_scalar_operators_on_numbers() {
    let record = Record::new().with("MONTO", 1000.0);

    let cases = [
        (Operator::Eq, 1000, true),
        (Operator::Gt, 999, true),
        (Operator::Gt, 1000, false),
        (Operator::Lt, 1001, true),
        (Operator::Ge, 1000, true),
        (Operator::Le, 1000, true),
        (Operator::Le, 999, false),
    ];
    for (operator, bound, expected) in cases {
        let evaluator = compile(vec![FilterCondition::new("MONTO", operator, bound)]);
        assert_eq!(
            evaluator.evaluate(&record).unwrap(),
            expected,
            "MONTO {} {}",
            operator,
            bound
        );
    }
}

#[test]
fn test_between_is_inclusive_at_both_ends() {
    let evaluator = compile(vec![FilterCondition::between(
        "DATE_FIELD",
        "2023-09-18",
        "2023-09-20",
    )]);

    for (day, expected) in [(17, false), (18, true), (19, true), (20, true), (21, false)] {
        let record = Record::new().with("DATE_FIELD", date(2023, 9, day));
        assert_eq!(evaluator.evaluate(&record).unwrap(), expected, "day {}", day);
    }
}

#[test]
fn test_between_with_reversed_bounds_is_closed_interval() {
    let evaluator = compile(vec![FilterCondition::between("MONTO", 10, 1)]);

    assert!(evaluator.evaluate(&Record::new().with("MONTO", 1_i64)).unwrap());
    assert!(evaluator.evaluate(&Record::new().with("MONTO", 5.5)).unwrap());
    assert!(evaluator.evaluate(&Record::new().with("MONTO", 10_i64)).unwrap());
    assert!(!evaluator.evaluate(&Record::new().with("MONTO", 11_i64)).unwrap());
    assert!(!evaluator.evaluate(&Record::new().with("MONTO", 0_i64)).unwrap());
}

#[test]
fn test_absent_field_fails_closed() {
    let evaluator = compile(vec![FilterCondition::new("STATUS", Operator::Eq, "A")]);
    let record = Record::new().with("MONTO", 1_i64);
    assert!(!evaluator.evaluate(&record).unwrap());
}

#[test]
fn test_null_value_fails_condition() {
    let evaluator = compile(vec![FilterCondition::new("STATUS", Operator::Le, "Z")]);
    let record = Record::new().with("STATUS", Value::Null);
    assert!(!evaluator.evaluate(&record).unwrap());
}

#[test]
fn test_date_lane_ignores_time_of_day() {
    let evaluator = compile(vec![FilterCondition::new(
        "DATE_FIELD",
        Operator::Eq,
        "2023-09-19",
    )]);

    let record = Record::new().with("DATE_FIELD", datetime(2023, 9, 19, 23, 59, 59));
    assert!(evaluator.evaluate(&record).unwrap());

    // DBF on-disk form stored in a character payload
    let record = Record::new().with("DATE_FIELD", "20230919");
    assert!(evaluator.evaluate(&record).unwrap());
}

#[test]
fn test_datetime_lane_keeps_time_of_day() {
    let evaluator = compile(vec![FilterCondition::between(
        "STAMP",
        "2023-09-19 08:00:00",
        "2023-09-19 17:30:00",
    )]);

    let inside = Record::new().with("STAMP", datetime(2023, 9, 19, 17, 30, 0));
    let after = Record::new().with("STAMP", datetime(2023, 9, 19, 17, 30, 1));
    let midnight = Record::new().with("STAMP", date(2023, 9, 19));

    assert!(evaluator.evaluate(&inside).unwrap());
    assert!(!evaluator.evaluate(&after).unwrap());
    assert!(!evaluator.evaluate(&midnight).unwrap());
}

#[test]
fn test_datetime_bound_given_as_date_is_midnight() {
    let evaluator = compile(vec![FilterCondition::new("STAMP", Operator::Ge, "2023-09-19")]);
    let record = Record::new().with("STAMP", datetime(2023, 9, 19, 0, 0, 0));
    assert!(evaluator.evaluate(&record).unwrap());
}

#[test]
fn test_text_lane_uses_lexicographic_order() {
    let evaluator = compile(vec![FilterCondition::between("STATUS", "300000", "300300")]);
    assert!(evaluator.evaluate(&Record::new().with("STATUS", "300150")).unwrap());
    assert!(!evaluator.evaluate(&Record::new().with("STATUS", "3004")).unwrap());
}

#[test]
fn test_numeric_bound_against_character_field_compares_as_text() {
    let evaluator = compile(vec![FilterCondition::new("STATUS", Operator::Eq, 1028)]);
    assert!(evaluator.evaluate(&Record::new().with("STATUS", "1028")).unwrap());
}

#[test]
fn test_boolean_lane() {
    let evaluator = compile(vec![FilterCondition::new("ACTIVO", Operator::Eq, true)]);
    assert!(evaluator.evaluate(&Record::new().with("ACTIVO", true)).unwrap());
    assert!(evaluator.evaluate(&Record::new().with("ACTIVO", "T")).unwrap());
    assert!(!evaluator.evaluate(&Record::new().with("ACTIVO", false)).unwrap());
}

#[test]
fn test_uncoercible_record_value_is_type_coercion_error() {
    let evaluator = compile(vec![FilterCondition::new("MONTO", Operator::Gt, 10)]);

    let err = evaluator
        .evaluate(&Record::new().with("MONTO", "not a number"))
        .unwrap_err();
    assert!(matches!(err, DbForgeError::TypeCoercion { ref field, .. } if field == "MONTO"));
    assert!(err.is_record_scoped());

    let err = evaluator
        .evaluate(&Record::new().with("MONTO", date(2023, 1, 1)))
        .unwrap_err();
    assert!(matches!(err, DbForgeError::TypeCoercion { .. }));
}

#[test]
fn test_numeric_string_record_value_is_parsed() {
    let evaluator = compile(vec![FilterCondition::new("MONTO", Operator::Gt, 1000)]);
    assert!(evaluator.evaluate(&Record::new().with("MONTO", " 1500.25 ")).unwrap());
}

#[test]
fn test_conditions_are_and_combined_and_short_circuit() {
    let evaluator = compile(vec![
        FilterCondition::new("STATUS", Operator::Eq, "A"),
        FilterCondition::new("MONTO", Operator::Gt, 1000),
    ]);

    let both = Record::new().with("STATUS", "A").with("MONTO", 1500_i64);
    let one = Record::new().with("STATUS", "A").with("MONTO", 10_i64);
    assert!(evaluator.evaluate(&both).unwrap());
    assert!(!evaluator.evaluate(&one).unwrap());

    // The first condition fails, so the uncoercible MONTO is never inspected.
    let short = Record::new().with("STATUS", "B").with("MONTO", "garbage");
    assert!(!evaluator.evaluate(&short).unwrap());
}

#[test]
fn test_empty_enabled_set_accepts_everything() {
    let evaluator = compile(Vec::new());
    assert!(evaluator.is_enabled());
    assert!(evaluator.is_empty());
    assert!(evaluator.evaluate(&Record::new().with("STATUS", "A")).unwrap());
}

// =============================================================================
// Date parsing helpers
// =============================================================================

#[test]
fn test_parse_date_formats() {
    assert_eq!(parse_date("2023-09-19"), Some(date(2023, 9, 19)));
    assert_eq!(parse_date("20230919"), Some(date(2023, 9, 19)));
    assert_eq!(parse_date("2023/09/19"), Some(date(2023, 9, 19)));
    assert_eq!(parse_date("2023-09-19 10:11:12"), Some(date(2023, 9, 19)));
    assert_eq!(parse_date("20231345"), None);
    assert_eq!(parse_date("yesterday"), None);
}

#[test]
fn test_parse_datetime_formats() {
    assert_eq!(
        parse_datetime("2023-09-19 10:11:12"),
        Some(datetime(2023, 9, 19, 10, 11, 12))
    );
    assert_eq!(
        parse_datetime("2023-09-19T10:11:12"),
        Some(datetime(2023, 9, 19, 10, 11, 12))
    );
    assert_eq!(
        parse_datetime("2023-09-19"),
        Some(datetime(2023, 9, 19, 0, 0, 0))
    );
    assert_eq!(
        parse_datetime("20230919"),
        Some(datetime(2023, 9, 19, 0, 0, 0))
    );
}
