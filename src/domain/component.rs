use crate::domain::money::Amount;
use crate::error::PayrollError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Allowance,
    Deduction,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Allowance => f.write_str("allowance"),
            Category::Deduction => f.write_str("deduction"),
        }
    }
}

/// What a percentage rule is a percentage of.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PercentageBase {
    Basic,
    Gross,
}

/// The shape of a rule. Each variant carries exactly the fields it needs,
/// so a fixed rule can never hold a percentage and vice versa.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RuleKind {
    Fixed {
        amount: Amount,
    },
    Percentage {
        percentage: Decimal,
        #[serde(rename = "percentage_base")]
        base: PercentageBase,
    },
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy, Default)]
pub struct RuleBounds {
    pub min_amount: Option<Amount>,
    pub max_amount: Option<Amount>,
}

impl RuleBounds {
    /// Non-negative bounds with `min <= max` when both are set.
    pub fn new(min: Option<Decimal>, max: Option<Decimal>) -> Result<Self, PayrollError> {
        if let (Some(min), Some(max)) = (min, max)
            && min > max
        {
            return Err(PayrollError::ValidationError(format!(
                "min_amount {min} is above max_amount {max}"
            )));
        }
        Ok(Self {
            min_amount: min.map(Amount::new).transpose()?,
            max_amount: max.map(Amount::new).transpose()?,
        })
    }
}

/// A validated pay rule.
///
/// Build one from untrusted input with `Rule::try_from(RawRule)`; that is the
/// single validation path for catalog edits, direct override edits and bulk
/// imports alike.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Copy)]
#[serde(try_from = "RawRule", into = "RawRule")]
pub struct Rule {
    pub kind: RuleKind,
    pub bounds: RuleBounds,
    /// Prorate by payable days. Only meaningful for fixed rules.
    pub prorate_by_attendance: bool,
}

impl Rule {
    pub fn fixed(amount: Decimal) -> Result<Self, PayrollError> {
        Ok(Self {
            kind: RuleKind::Fixed {
                amount: Amount::new(amount)?,
            },
            bounds: RuleBounds::default(),
            prorate_by_attendance: false,
        })
    }

    pub fn percentage(percentage: Decimal, base: PercentageBase) -> Result<Self, PayrollError> {
        validate_percentage(percentage)?;
        Ok(Self {
            kind: RuleKind::Percentage { percentage, base },
            bounds: RuleBounds::default(),
            prorate_by_attendance: false,
        })
    }

    pub fn with_bounds(mut self, min: Option<Decimal>, max: Option<Decimal>) -> Result<Self, PayrollError> {
        self.bounds = RuleBounds::new(min, max)?;
        Ok(self)
    }

    pub fn prorated(mut self) -> Self {
        self.prorate_by_attendance = true;
        self
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.kind, RuleKind::Fixed { .. })
    }
}

fn validate_percentage(percentage: Decimal) -> Result<(), PayrollError> {
    if percentage < Decimal::ZERO || percentage > Decimal::ONE_HUNDRED {
        return Err(PayrollError::ValidationError(format!(
            "percentage must be between 0 and 100, got {percentage}"
        )));
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    Fixed,
    Percentage,
}

/// The loosely-typed wire shape of a rule, as authored in a catalog file or
/// an import row. Never used for computation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct RawRule {
    #[serde(rename = "type")]
    pub rule_type: Option<RuleType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage_base: Option<PercentageBase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_amount: Option<Decimal>,
    #[serde(default)]
    pub prorate_by_attendance: bool,
}

impl TryFrom<RawRule> for Rule {
    type Error = PayrollError;

    fn try_from(raw: RawRule) -> Result<Self, Self::Error> {
        let kind = match raw.rule_type {
            Some(RuleType::Fixed) => {
                if raw.percentage.is_some() || raw.percentage_base.is_some() {
                    return Err(PayrollError::ValidationError(
                        "fixed rule must not carry a percentage".to_string(),
                    ));
                }
                let amount = raw.amount.ok_or_else(|| {
                    PayrollError::ValidationError("fixed rule requires an amount".to_string())
                })?;
                RuleKind::Fixed {
                    amount: Amount::new(amount)?,
                }
            }
            Some(RuleType::Percentage) => {
                if raw.amount.is_some() {
                    return Err(PayrollError::ValidationError(
                        "percentage rule must not carry an amount".to_string(),
                    ));
                }
                let percentage = raw.percentage.ok_or_else(|| {
                    PayrollError::ValidationError("percentage rule requires a percentage".to_string())
                })?;
                let base = raw.percentage_base.ok_or_else(|| {
                    PayrollError::ValidationError(
                        "percentage rule requires a percentage base".to_string(),
                    )
                })?;
                validate_percentage(percentage)?;
                RuleKind::Percentage { percentage, base }
            }
            None => {
                return Err(PayrollError::ValidationError(
                    "rule type is required".to_string(),
                ));
            }
        };

        Ok(Rule {
            kind,
            bounds: RuleBounds::new(raw.min_amount, raw.max_amount)?,
            prorate_by_attendance: raw.prorate_by_attendance,
        })
    }
}

impl From<Rule> for RawRule {
    fn from(rule: Rule) -> Self {
        let mut raw = RawRule {
            min_amount: rule.bounds.min_amount.map(Decimal::from),
            max_amount: rule.bounds.max_amount.map(Decimal::from),
            prorate_by_attendance: rule.prorate_by_attendance,
            ..Default::default()
        };
        match rule.kind {
            RuleKind::Fixed { amount } => {
                raw.rule_type = Some(RuleType::Fixed);
                raw.amount = Some(amount.into());
            }
            RuleKind::Percentage { percentage, base } => {
                raw.rule_type = Some(RuleType::Percentage);
                raw.percentage = Some(percentage);
                raw.percentage_base = Some(base);
            }
        }
        raw
    }
}

/// A rule restricted to a department, optionally narrowed to one division.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ScopedRule {
    #[serde(default)]
    pub division: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    pub rule: Rule,
}

impl ScopedRule {
    pub fn department(department: impl Into<String>, rule: Rule) -> Self {
        Self {
            division: None,
            department: Some(department.into()),
            rule,
        }
    }

    pub fn division_department(
        division: impl Into<String>,
        department: impl Into<String>,
        rule: Rule,
    ) -> Self {
        Self {
            division: Some(division.into()),
            department: Some(department.into()),
            rule,
        }
    }
}

/// A named allowance or deduction as held in the catalog.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PayComponent {
    pub id: String,
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub global_rule: Option<Rule>,
    #[serde(default)]
    pub scoped_rules: Vec<ScopedRule>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl PayComponent {
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            global_rule: None,
            scoped_rules: Vec::new(),
            is_active: true,
        }
    }

    pub fn with_global(mut self, rule: Rule) -> Self {
        self.global_rule = Some(rule);
        self
    }

    pub fn with_scoped(mut self, scoped: ScopedRule) -> Self {
        self.scoped_rules.push(scoped);
        self
    }

    /// Structural checks beyond the per-rule shape, which the type already holds.
    pub fn validate(&self) -> Result<(), PayrollError> {
        if self.id.trim().is_empty() {
            return Err(PayrollError::ValidationError(
                "component id must not be empty".to_string(),
            ));
        }
        if self.name.trim().is_empty() {
            return Err(PayrollError::ValidationError(format!(
                "component {} must have a name",
                self.id
            )));
        }
        for (index, scoped) in self.scoped_rules.iter().enumerate() {
            if scoped.department.as_deref().is_none_or(|d| d.trim().is_empty()) {
                return Err(PayrollError::ValidationError(format!(
                    "scoped rule {index} of component {} must name a department",
                    self.id
                )));
            }
            let duplicate = self.scoped_rules[..index]
                .iter()
                .any(|other| other.division == scoped.division && other.department == scoped.department);
            if duplicate {
                return Err(PayrollError::ValidationError(format!(
                    "component {} has more than one rule for the same scope",
                    self.id
                )));
            }
        }
        Ok(())
    }
}
