//! Validation Invariant Tests
//!
//! - Every record lands in exactly one partition
//! - Every violated rule is reported, not just the first
//! - Input order is preserved in both partitions
//! - Counters agree with the per-record outcomes

use featuregate::contract::{Contract, FieldSpec};
use featuregate::record::{Record, Value};
use featuregate::validation::{ContractValidator, ExtraFieldPolicy, ViolationCounters, ViolationRule};

// =============================================================================
// Helper Functions
// =============================================================================

fn contract() -> Contract {
    Contract::new(
        "vp-1",
        vec![
            FieldSpec::string("user_id"),
            FieldSpec::float("amount").with_range(0.0, 100_000.0),
            FieldSpec::categorical("value_prop", ["cashback", "points"]),
            FieldSpec::timestamp("day"),
            FieldSpec::bool("clicked").nullable(),
        ],
    )
}

fn good(i: usize) -> Record {
    Record::new("vp-1")
        .with("user_id", format!("u{}", i))
        .with("amount", i as f64)
        .with("value_prop", if i % 2 == 0 { "cashback" } else { "points" })
        .with("day", "2024-03-01")
        .with("clicked", i % 3 == 0)
}

fn mixed_batch() -> Vec<Record> {
    (0..200)
        .map(|i| match i % 7 {
            0 => good(i).with("amount", -5i64),
            3 => good(i).with("value_prop", "voucher"),
            5 => {
                let mut r = good(i);
                r.values.remove("user_id");
                r
            }
            _ => good(i),
        })
        .collect()
}

// =============================================================================
// Partition Tests
// =============================================================================

/// Scenario: a negative amount is rejected with a range violation.
#[test]
fn test_negative_amount_is_range_violation() {
    let validator = ContractValidator::default();
    let report = validator.validate(
        vec![good(1).with("amount", -5i64)],
        &contract(),
        &ViolationCounters::new(),
    );

    assert!(report.accepted.is_empty());
    let violations = &report.rejected[0].outcome.violations;
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].field, "amount");
    assert_eq!(violations[0].rule, ViolationRule::Range);
    assert_eq!(violations[0].observed_value, Some(Value::Int(-5)));
}

#[test]
fn test_partition_is_total_and_ordered() {
    let batch = mixed_batch();
    let counters = ViolationCounters::new();
    let report = ContractValidator::default().validate(batch.clone(), &contract(), &counters);

    assert_eq!(report.total(), batch.len());

    let (rejected_idx, accepted_idx): (Vec<usize>, Vec<usize>) =
        (0..batch.len()).partition(|i| matches!(i % 7, 0 | 3 | 5));
    let expected_rejected: Vec<Record> = rejected_idx.iter().map(|i| batch[*i].clone()).collect();
    let expected_accepted: Vec<Record> = accepted_idx.iter().map(|i| batch[*i].clone()).collect();
    assert_eq!(report.accepted, expected_accepted);
    let rejected: Vec<Record> = report.rejected.into_iter().map(|r| r.record).collect();
    assert_eq!(rejected, expected_rejected);
}

#[test]
fn test_all_violations_reported() {
    let record = Record::new("vp-0")
        .with("amount", "lots")
        .with("value_prop", "voucher")
        .with("day", "not a date")
        .with("clicked", Value::Null)
        .with("referrer", "ad");

    let outcome = ContractValidator::new(ExtraFieldPolicy::Reject).validate_record(&record, &contract());
    assert!(!outcome.accepted);
    for rule in [
        ViolationRule::SchemaVersion,
        ViolationRule::Missing,
        ViolationRule::Type,
        ViolationRule::AllowedValues,
        ViolationRule::ExtraField,
    ] {
        assert!(outcome.has_rule(rule), "missing {:?}", rule);
    }
    // clicked is nullable
    assert!(outcome.violations.iter().all(|v| v.field != "clicked"));
}

#[test]
fn test_ignore_policy_keeps_extra_fields() {
    let record = good(4).with("referrer", "ad");
    let report = ContractValidator::new(ExtraFieldPolicy::Ignore).validate(
        vec![record],
        &contract(),
        &ViolationCounters::new(),
    );
    assert_eq!(report.accepted.len(), 1);
    assert!(report.accepted[0].values.contains_key("referrer"));
}

// =============================================================================
// Counter Tests
// =============================================================================

#[test]
fn test_counters_match_outcomes() {
    let counters = ViolationCounters::new();
    let report = ContractValidator::default().validate(mixed_batch(), &contract(), &counters);
    let snapshot = counters.snapshot();

    let total: usize = report.rejected.iter().map(|r| r.outcome.violations.len()).sum();
    assert_eq!(snapshot.total_violations(), total as u64);
    assert_eq!(snapshot.records_checked, 200);
    assert_eq!(snapshot.records_rejected, report.rejected.len() as u64);
    assert_eq!(counters.count(ViolationRule::Range), snapshot.by_rule["range"]);
}

#[test]
fn test_validation_is_deterministic() {
    let first = ContractValidator::default().validate(mixed_batch(), &contract(), &ViolationCounters::new());
    for _ in 0..10 {
        let again =
            ContractValidator::default().validate(mixed_batch(), &contract(), &ViolationCounters::new());
        assert_eq!(again.accepted, first.accepted);
        assert_eq!(again.rejected, first.rejected);
    }
}
