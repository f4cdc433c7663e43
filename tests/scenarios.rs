use std::io::Write;

use basket_rules::{
    compute_weighted, encode, generate_rules, weighted_support, Algorithm, Apriori, FpGrowth, FrequentItemsetMiner,
    FrequentItemsets, LogEntry, MiningConfig, MiningError, Pipeline, PresenceMatrix, RuleMetric, TransactionWeights,
    WeightedRules,
};

const EPS: f64 = 1e-9;

fn groceries_log() -> Vec<LogEntry> {
    [
        ("1", "milk"),
        ("1", "bread"),
        ("2", "milk"),
        ("2", "bread"),
        ("2", "eggs"),
        ("3", "bread"),
        ("4", "milk"),
        ("4", "eggs"),
    ]
    .iter()
    .map(|&(t, item)| LogEntry::new(t, item, 1.0))
    .collect()
}

fn groceries() -> PresenceMatrix {
    encode(&groceries_log(), 1.0).unwrap()
}

fn weights() -> TransactionWeights {
    TransactionWeights::new([("1", 10.0), ("2", 20.0), ("3", 5.0), ("4", 15.0)]).unwrap()
}

#[test]
fn frequent_itemsets_of_small_grocery_log() {
    let m = groceries();
    assert_eq!(m.n_transactions(), 4);
    assert_eq!(m.items(), ["bread", "eggs", "milk"]);

    let miners: [Box<dyn FrequentItemsetMiner>; 2] = [Box::new(Apriori::new()), Box::new(FpGrowth::new())];
    for miner in &miners {
        let sets = miner.mine(&m, 0.5).unwrap();
        let support = |names: &[&str]| sets.support_of(&m.item_ids(names).unwrap());
        assert_eq!(support(&["milk"]), Some(0.75), "{}", miner.name());
        assert_eq!(support(&["bread"]), Some(0.75));
        assert_eq!(support(&["eggs"]), Some(0.5));
        assert_eq!(support(&["milk", "bread"]), Some(0.5));
        assert_eq!(support(&["milk", "eggs"]), Some(0.5));
        assert_eq!(support(&["bread", "eggs"]), None);
        assert_eq!(sets.len(), 5);
    }
}

#[test]
fn milk_implies_bread_metrics() {
    let m = groceries();
    let sets = FpGrowth::new().run(&m, 0.5).unwrap();
    let rules = generate_rules(&sets, RuleMetric::Confidence, 0.0).unwrap();

    let milk = m.item_ids(&["milk"]).unwrap();
    let bread = m.item_ids(&["bread"]).unwrap();
    let rule = rules.find(&milk, &bread).unwrap();
    assert!((rule.support - 0.5).abs() < EPS);
    assert!((rule.confidence - 0.5 / 0.75).abs() < EPS);
    assert!((rule.lift - (0.5 / 0.75) / 0.75).abs() < EPS);
    assert!((rule.confidence - 0.667).abs() < 1e-3);
    assert!((rule.lift - 0.889).abs() < 1e-3);
    assert_eq!(rules.describe(rule), "milk → bread");
}

#[test]
fn weighted_support_of_milk() {
    let m = groceries();
    let w = weights();
    assert_eq!(w.total(), 50.0);
    let ws = weighted_support(&m, &w, &m.item_ids(&["milk"]).unwrap()).unwrap();
    assert!((ws - 0.9).abs() < EPS);
}

#[test]
fn empty_log_is_invalid_input() {
    assert!(matches!(encode(&[], 1.0), Err(MiningError::InvalidInput(_))));
    let pipeline = Pipeline::new(MiningConfig::default()).unwrap();
    assert!(matches!(pipeline.run(&[], None, Algorithm::FpGrowth), Err(MiningError::InvalidInput(_))));
}

#[test]
fn zero_min_support_is_invalid_threshold() {
    let m = groceries();
    assert!(matches!(Apriori::new().mine(&m, 0.0), Err(MiningError::InvalidThreshold { .. })));
    assert!(matches!(FpGrowth::new().run(&m, 0.0), Err(MiningError::InvalidThreshold { .. })));
}

#[test]
fn lift_is_confidence_over_consequent_support() {
    let m = groceries();
    let sets = Apriori::new().mine(&m, 0.25).unwrap();
    let rules = generate_rules(&sets, RuleMetric::Support, 0.25).unwrap();
    assert!(!rules.is_empty());
    for rule in &rules {
        let c_support = sets.support_of(&rule.consequent).unwrap();
        assert!((rule.lift - rule.confidence / c_support).abs() < EPS);
        assert!((rule.consequent_support - c_support).abs() < EPS);
    }
}

#[test]
fn weighted_rules_serialize_to_json() {
    let m = groceries();
    let sets = FpGrowth::new().run(&m, 0.5).unwrap();
    let rules = generate_rules(&sets, RuleMetric::Confidence, 0.6).unwrap();
    let weighted = compute_weighted(&rules, &m, &weights()).unwrap();

    let json = serde_json::to_value(&weighted).unwrap();
    assert_eq!(json["total_weight"], 50.0);
    assert_eq!(json["missing_weights"], 0);
    let first = &json["rules"]["rules"][0];
    assert!(first["weighted"]["weighted_support"].is_number());
    assert!(first["confidence"].is_number());

    let plain = serde_json::to_value(&rules).unwrap();
    assert!(plain["rules"][0].get("weighted").is_none());
}

#[test]
fn itemsets_and_rules_load_back_from_json() {
    let m = groceries();
    let sets = Apriori::new().mine(&m, 0.5).unwrap();
    let json = serde_json::to_string(&sets).unwrap();
    let back: FrequentItemsets = serde_json::from_str(&json).unwrap();
    assert_eq!(back, sets);
    // the lookup index is not serialized but rebuilt on load
    assert_eq!(back.support_of(&m.item_ids(&["milk", "eggs"]).unwrap()), Some(0.5));

    let rules = generate_rules(&sets, RuleMetric::Confidence, 0.6).unwrap();
    let weighted = compute_weighted(&rules, &m, &weights()).unwrap();
    let back: WeightedRules = serde_json::from_str(&serde_json::to_string(&weighted).unwrap()).unwrap();
    assert_eq!(back.rules.len(), weighted.rules.len());
    assert_eq!(back.total_weight, 50.0);
    let milk = m.item_ids(&["milk"]).unwrap();
    let bread = m.item_ids(&["bread"]).unwrap();
    let rule = back.rules.find(&milk, &bread).unwrap();
    assert_eq!(rule.support, 0.5);
    assert!(rule.weighted.is_some());

    // eggs → milk holds in every basket with eggs
    let eggs = m.item_ids(&["eggs"]).unwrap();
    let sure = back.rules.find(&eggs, &milk).unwrap();
    assert_eq!(sure.confidence, 1.0);
    assert_eq!(sure.conviction, f64::INFINITY);
}

#[test]
fn pipeline_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
        min_support = 0.5
        metric = "lift"
        min_threshold = 1.0
        "#
    )
    .unwrap();

    let config = MiningConfig::from_path(file.path()).unwrap();
    assert_eq!(config.metric, RuleMetric::Lift);

    let out = Pipeline::new(config).unwrap().run(&groceries_log(), Some(&weights()), Algorithm::Both).unwrap();
    assert_eq!(out.agreement, Some(true));
    // Only milk ↔ eggs has lift above 1.
    assert_eq!(out.rules.len(), 2);
    assert!(out.rules.iter().all(|r| r.lift > 1.0));
    assert!(out.weighted.is_some());
}

#[test]
fn missing_config_file_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let err = MiningConfig::from_path(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, MiningError::InvalidInput(_)));
}
