//! Rule resolution: picks the one rule that applies to an employee for a
//! component, and turns a rule into an amount once its base is known.
//!
//! Both halves are pure. The engine owns the ordering of allowances and
//! deductions and supplies the bases.

use crate::domain::component::{Category, PayComponent, PercentageBase, Rule, RuleKind};
use crate::domain::employee::Employee;
use crate::domain::money::{Money, round2};
use crate::domain::record::RuleTier;
use rust_decimal::Decimal;
use serde::Serialize;

/// The rule that won, and which tier it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveRule {
    pub rule: Rule,
    pub tier: RuleTier,
}

/// Outcome of resolving one component for one employee. `rule` is `None`
/// when the component is inactive for this employee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    pub component_id: String,
    pub name: String,
    pub category: Category,
    pub rule: Option<EffectiveRule>,
    pub warnings: Vec<String>,
}

impl Resolution {
    pub fn is_active(&self) -> bool {
        self.rule.is_some()
    }
}

/// Most specific rule wins: employee override, then division + department,
/// then department only, then the global rule.
pub fn resolve(component: &PayComponent, employee: &Employee) -> Resolution {
    let mut warnings = Vec::new();

    let rule = match employee.override_for(&component.id) {
        Some(ov) if component.is_active => Some(EffectiveRule {
            rule: ov.rule,
            tier: RuleTier::Override,
        }),
        Some(_) => {
            warnings.push(format!(
                "override for {} ignored: component is inactive, using global rule",
                component.id
            ));
            global(component)
        }
        None if !component.is_active => None,
        None => scoped(component, employee).or_else(|| global(component)),
    };

    Resolution {
        component_id: component.id.clone(),
        name: component.name.clone(),
        category: component.category,
        rule,
        warnings,
    }
}

fn scoped(component: &PayComponent, employee: &Employee) -> Option<EffectiveRule> {
    let department = employee.department.as_deref()?;
    let division = employee.division.as_deref();

    let exact = component.scoped_rules.iter().find(|s| {
        s.division.is_some()
            && s.division.as_deref() == division
            && s.department.as_deref() == Some(department)
    });
    if let Some(s) = exact {
        return Some(EffectiveRule {
            rule: s.rule,
            tier: RuleTier::DivisionDepartment,
        });
    }

    component
        .scoped_rules
        .iter()
        .find(|s| s.division.is_none() && s.department.as_deref() == Some(department))
        .map(|s| EffectiveRule {
            rule: s.rule,
            tier: RuleTier::Department,
        })
}

fn global(component: &PayComponent) -> Option<EffectiveRule> {
    component.global_rule.map(|rule| EffectiveRule {
        rule,
        tier: RuleTier::Global,
    })
}

/// Everything a rule's amount may depend on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmountBasis {
    pub basic: Money,
    pub gross: Money,
    pub payable_days: Decimal,
    pub total_days: Decimal,
}

/// Applies a rule: fixed (optionally prorated) or percentage of its base,
/// then the min clamp, then the max clamp, rounded to 2 dp.
pub fn compute_amount(rule: &Rule, basis: &AmountBasis) -> Money {
    let raw = match rule.kind {
        RuleKind::Fixed { amount } => {
            let amount = amount.value();
            if rule.prorate_by_attendance && basis.total_days > Decimal::ZERO {
                round2(amount * basis.payable_days / basis.total_days).min(amount)
            } else {
                amount
            }
        }
        RuleKind::Percentage { percentage, base } => {
            let base = match base {
                PercentageBase::Basic => basis.basic,
                PercentageBase::Gross => basis.gross,
            };
            base.value() * percentage / Decimal::ONE_HUNDRED
        }
    };

    let mut value = raw;
    if let Some(min) = rule.bounds.min_amount {
        value = value.max(min.value());
    }
    if let Some(max) = rule.bounds.max_amount {
        value = value.min(max.value());
    }
    Money::new(round2(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::ScopedRule;
    use crate::domain::employee::EmployeeComponentOverride;
    use rust_decimal_macros::dec;

    fn hra() -> PayComponent {
        PayComponent::new("HRA", "House Rent", Category::Allowance)
            .with_global(Rule::percentage(dec!(10), PercentageBase::Basic).unwrap())
            .with_scoped(ScopedRule::department("Sales", Rule::fixed(dec!(2000)).unwrap()))
            .with_scoped(ScopedRule::division_department(
                "North",
                "Sales",
                Rule::fixed(dec!(2500)).unwrap(),
            ))
    }

    fn employee(division: Option<&str>, department: Option<&str>) -> Employee {
        let mut employee = Employee::new("E1", "Asha");
        employee.division = division.map(str::to_string);
        employee.department = department.map(str::to_string);
        employee.base_salary = Some(dec!(20000));
        employee
    }

    fn basis() -> AmountBasis {
        AmountBasis {
            basic: Money::new(dec!(20000)),
            gross: Money::new(dec!(25000)),
            payable_days: dec!(15),
            total_days: dec!(30),
        }
    }

    #[test]
    fn test_department_rule_beats_global() {
        let resolution = resolve(&hra(), &employee(None, Some("Sales")));
        let effective = resolution.rule.unwrap();
        assert_eq!(effective.tier, RuleTier::Department);
        assert_eq!(compute_amount(&effective.rule, &basis()), Money::new(dec!(2000)));
    }

    #[test]
    fn test_division_department_beats_department() {
        let resolution = resolve(&hra(), &employee(Some("North"), Some("Sales")));
        assert_eq!(resolution.rule.unwrap().tier, RuleTier::DivisionDepartment);

        let other_division = resolve(&hra(), &employee(Some("South"), Some("Sales")));
        assert_eq!(other_division.rule.unwrap().tier, RuleTier::Department);
    }

    #[test]
    fn test_unrelated_scope_change_does_not_alter_match() {
        let before = resolve(&hra(), &employee(Some("North"), Some("Sales")));
        let edited = hra().with_scoped(ScopedRule::department("Ops", Rule::fixed(dec!(1)).unwrap()));
        let after = resolve(&edited, &employee(Some("North"), Some("Sales")));
        assert_eq!(before, after);
    }

    #[test]
    fn test_override_wins_over_everything() {
        let mut emp = employee(Some("North"), Some("Sales"));
        emp.set_override(EmployeeComponentOverride::new(
            "HRA",
            Category::Allowance,
            Rule::fixed(dec!(999)).unwrap(),
        ));
        let effective = resolve(&hra(), &emp).rule.unwrap();
        assert_eq!(effective.tier, RuleTier::Override);
        assert_eq!(effective.rule, Rule::fixed(dec!(999)).unwrap());
    }

    #[test]
    fn test_global_when_no_scope_matches() {
        let effective = resolve(&hra(), &employee(None, Some("Ops"))).rule.unwrap();
        assert_eq!(effective.tier, RuleTier::Global);
        assert_eq!(compute_amount(&effective.rule, &basis()), Money::new(dec!(2000)));
    }

    #[test]
    fn test_no_rule_is_inactive() {
        let bare = PayComponent::new("X", "Nothing", Category::Deduction);
        let resolution = resolve(&bare, &employee(None, None));
        assert!(!resolution.is_active());
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn test_inactive_component() {
        let mut component = hra();
        component.is_active = false;
        assert!(!resolve(&component, &employee(None, Some("Sales"))).is_active());

        let mut emp = employee(None, Some("Sales"));
        emp.set_override(EmployeeComponentOverride::new(
            "HRA",
            Category::Allowance,
            Rule::fixed(dec!(999)).unwrap(),
        ));
        let resolution = resolve(&component, &emp);
        assert_eq!(resolution.rule.unwrap().tier, RuleTier::Global);
        assert_eq!(resolution.warnings.len(), 1);
    }

    #[test]
    fn test_clamp_min_then_max() {
        let clamped = |amount| {
            let rule = Rule::fixed(amount)
                .unwrap()
                .with_bounds(Some(dec!(100)), Some(dec!(500)))
                .unwrap();
            compute_amount(&rule, &basis())
        };
        assert_eq!(clamped(dec!(50)), Money::new(dec!(100)));
        assert_eq!(clamped(dec!(700)), Money::new(dec!(500)));
        assert_eq!(clamped(dec!(250)), Money::new(dec!(250)));
    }

    #[test]
    fn test_proration_never_exceeds_amount() {
        let rule = Rule::fixed(dec!(1000)).unwrap().prorated();
        assert_eq!(compute_amount(&rule, &basis()), Money::new(dec!(500)));

        let over = AmountBasis {
            payable_days: dec!(31),
            ..basis()
        };
        assert_eq!(compute_amount(&rule, &over), Money::new(dec!(1000)));
    }

    #[test]
    fn test_percentage_of_gross_rounds() {
        let rule = Rule::percentage(dec!(3.333), PercentageBase::Gross).unwrap();
        assert_eq!(compute_amount(&rule, &basis()), Money::new(dec!(833.25)));
    }
}
