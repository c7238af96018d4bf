use crate::domain::catalog::{CatalogDocument, CatalogSnapshot};
use crate::error::{PayrollError, Result};
use std::io::Read;

/// Loads a catalog document (`{"components": [...]}`) as version 1.
///
/// Rules go through `Rule::try_from(RawRule)` while deserializing, so a
/// malformed rule fails the whole load.
pub fn read_catalog<R: Read>(source: R) -> Result<CatalogSnapshot> {
    let document: CatalogDocument = serde_json::from_reader(source)
        .map_err(|e| PayrollError::ValidationError(format!("invalid catalog: {e}")))?;
    CatalogSnapshot::try_from(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::{Category, RuleKind};
    use rust_decimal_macros::dec;

    #[test]
    fn test_read_catalog() {
        let json = r#"{
            "components": [
                {
                    "id": "HRA",
                    "name": "House Rent",
                    "category": "allowance",
                    "global_rule": {"type": "percentage", "percentage": 10, "percentage_base": "basic"},
                    "scoped_rules": [
                        {"department": "Sales", "rule": {"type": "fixed", "amount": 2000}}
                    ]
                },
                {
                    "id": "PT",
                    "name": "Professional Tax",
                    "category": "deduction",
                    "global_rule": {"type": "fixed", "amount": "200"}
                }
            ]
        }"#;
        let catalog = read_catalog(json.as_bytes()).unwrap();

        assert_eq!(catalog.version(), 1);
        assert_eq!(catalog.len(), 2);
        let hra = catalog.get("HRA").unwrap();
        assert_eq!(hra.category, Category::Allowance);
        assert!(matches!(
            hra.scoped_rules[0].rule.kind,
            RuleKind::Fixed { amount } if amount.value() == dec!(2000)
        ));
    }

    #[test]
    fn test_malformed_rule_fails_load() {
        let json = r#"{"components": [{
            "id": "HRA", "name": "House Rent", "category": "allowance",
            "global_rule": {"type": "fixed", "percentage": 10}
        }]}"#;

        assert!(matches!(
            read_catalog(json.as_bytes()),
            Err(PayrollError::ValidationError(_))
        ));
    }

    #[test]
    fn test_division_only_scope_fails_load() {
        let json = r#"{"components": [{
            "id": "HRA", "name": "House Rent", "category": "allowance",
            "scoped_rules": [{"division": "North", "rule": {"type": "fixed", "amount": 5}}]
        }]}"#;

        assert!(matches!(
            read_catalog(json.as_bytes()),
            Err(PayrollError::ValidationError(_))
        ));
    }
}
