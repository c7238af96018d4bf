use crate::domain::component::{Category, Rule};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A per-employee rule snapshot for one component.
///
/// Stored on the employee and independent of later catalog edits.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct EmployeeComponentOverride {
    pub component_id: String,
    pub category: Category,
    pub rule: Rule,
    #[serde(default = "override_flag")]
    pub is_override: bool,
}

fn override_flag() -> bool {
    true
}

impl EmployeeComponentOverride {
    pub fn new(component_id: impl Into<String>, category: Category, rule: Rule) -> Self {
        Self {
            component_id: component_id.into(),
            category,
            rule,
            is_override: true,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct PaymentDetails {
    pub bank_name: String,
    pub account_number: String,
}

/// Directory view of an employee, as much of it as payroll needs.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Employee {
    pub id: String,
    pub name: String,
    pub division: Option<String>,
    pub department: Option<String>,
    pub designation: Option<String>,
    /// Monthly base salary. `None` means the directory has no salary on file.
    pub base_salary: Option<Decimal>,
    pub payment: Option<PaymentDetails>,
    #[serde(default)]
    pub overrides: Vec<EmployeeComponentOverride>,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool {
    true
}

impl Employee {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            division: None,
            department: None,
            designation: None,
            base_salary: None,
            payment: None,
            overrides: Vec::new(),
            is_active: true,
        }
    }

    pub fn override_for(&self, component_id: &str) -> Option<&EmployeeComponentOverride> {
        self.overrides
            .iter()
            .find(|ov| ov.component_id == component_id)
    }

    /// Inserts or replaces the override for the same component.
    pub fn set_override(&mut self, ov: EmployeeComponentOverride) {
        match self
            .overrides
            .iter_mut()
            .find(|existing| existing.component_id == ov.component_id)
        {
            Some(existing) => *existing = ov,
            None => self.overrides.push(ov),
        }
    }
}
