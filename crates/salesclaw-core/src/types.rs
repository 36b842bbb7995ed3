//! Shared enums and the account directory.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How urgently a fired trigger needs a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Immediate response required.
    Critical,
    /// Same day response.
    High,
    /// Next day response.
    #[default]
    Medium,
    /// Weekly digest.
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Critical => "critical",
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Sort key (lower = more urgent).
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Critical => 0,
            Priority::High => 1,
            Priority::Medium => 2,
            Priority::Low => 3,
        }
    }

    /// True for critical and high.
    pub fn is_urgent(&self) -> bool {
        matches!(self, Priority::Critical | Priority::High)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "critical" => Ok(Priority::Critical),
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// Kind of condition bundle a rule carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    CustomerSpecific,
    PersonSpecific,
    Keyword,
    Metric,
    Pattern,
    Threshold,
}

impl TriggerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerType::CustomerSpecific => "customer_specific",
            TriggerType::PersonSpecific => "person_specific",
            TriggerType::Keyword => "keyword",
            TriggerType::Metric => "metric",
            TriggerType::Pattern => "pattern",
            TriggerType::Threshold => "threshold",
        }
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intent of a trigger. Actions decide recipients, channels and content
/// by matching on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCategory {
    BuyingSignal,
    ChurnRisk,
    Competitive,
    Security,
    AccountHealth,
    UsageDrop,
    ExecutiveEngagement,
    General,
}

impl TriggerCategory {
    /// Classify a rule id that was configured without an explicit category.
    ///
    /// This is the only place where ids are inspected; the first matching
    /// family wins.
    pub fn infer(trigger_id: &str) -> Self {
        let id = trigger_id.to_lowercase();
        if id.contains("buying_signal") {
            TriggerCategory::BuyingSignal
        } else if id.contains("churn") {
            TriggerCategory::ChurnRisk
        } else if id.contains("competitive") || id.contains("competitor") {
            TriggerCategory::Competitive
        } else if id.contains("security") || id.contains("compliance") {
            TriggerCategory::Security
        } else if id.contains("usage") {
            TriggerCategory::UsageDrop
        } else if id.contains("health") {
            TriggerCategory::AccountHealth
        } else if id.contains("executive") || id.contains("stakeholder") {
            TriggerCategory::ExecutiveEngagement
        } else {
            TriggerCategory::General
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerCategory::BuyingSignal => "buying_signal",
            TriggerCategory::ChurnRisk => "churn_risk",
            TriggerCategory::Competitive => "competitive",
            TriggerCategory::Security => "security",
            TriggerCategory::AccountHealth => "account_health",
            TriggerCategory::UsageDrop => "usage_drop",
            TriggerCategory::ExecutiveEngagement => "executive_engagement",
            TriggerCategory::General => "general",
        }
    }

    /// Categories that concern the health of an existing account.
    pub fn is_health_related(&self) -> bool {
        matches!(
            self,
            TriggerCategory::AccountHealth | TriggerCategory::ChurnRisk | TriggerCategory::UsageDrop
        )
    }
}

impl fmt::Display for TriggerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who to contact for an account or a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDirectory {
    /// customer_id → account executive email.
    #[serde(default = "default_account_executives")]
    pub account_executives: BTreeMap<String, String>,
    #[serde(default = "default_sales_team")]
    pub sales_team: String,
    #[serde(default = "default_sales_manager")]
    pub sales_manager: String,
    #[serde(default = "default_sales_director")]
    pub sales_director: String,
    #[serde(default = "default_cro")]
    pub cro: String,
    #[serde(default = "default_customer_success")]
    pub customer_success: String,
    #[serde(default = "default_security_team")]
    pub security_team: String,
    #[serde(default = "default_solutions_engineer")]
    pub solutions_engineer: String,
    #[serde(default = "default_competitive_intel")]
    pub competitive_intel: String,
}

fn default_account_executives() -> BTreeMap<String, String> {
    [
        ("acme_inc", "john.doe@company.com"),
        ("techcorp", "jane.smith@company.com"),
        ("financeapp", "mike.johnson@company.com"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
fn default_sales_team() -> String { "sales-team@company.com".into() }
fn default_sales_manager() -> String { "sales-manager@company.com".into() }
fn default_sales_director() -> String { "sales-director@company.com".into() }
fn default_cro() -> String { "cro@company.com".into() }
fn default_customer_success() -> String { "customer-success@company.com".into() }
fn default_security_team() -> String { "security-team@company.com".into() }
fn default_solutions_engineer() -> String { "solutions-engineer@company.com".into() }
fn default_competitive_intel() -> String { "competitive-intel@company.com".into() }

impl Default for AccountDirectory {
    fn default() -> Self {
        Self {
            account_executives: default_account_executives(),
            sales_team: default_sales_team(),
            sales_manager: default_sales_manager(),
            sales_director: default_sales_director(),
            cro: default_cro(),
            customer_success: default_customer_success(),
            security_team: default_security_team(),
            solutions_engineer: default_solutions_engineer(),
            competitive_intel: default_competitive_intel(),
        }
    }
}

impl AccountDirectory {
    /// Account executive assigned to a customer, if any.
    pub fn account_executive(&self, customer_id: &str) -> Option<&str> {
        self.account_executives.get(customer_id).map(String::as_str)
    }

    /// Account executive, falling back to the shared sales inbox.
    pub fn account_executive_or_team(&self, customer_id: &str) -> &str {
        self.account_executive(customer_id)
            .unwrap_or(self.sales_team.as_str())
    }

    /// Whether the customer has a named owner (an existing account).
    pub fn is_managed(&self, customer_id: &str) -> bool {
        self.account_executives.contains_key(customer_id)
    }
}

/// Append `item` unless it is already present (keeps first-seen order).
pub fn push_unique(list: &mut Vec<String>, item: impl Into<String>) {
    let item = item.into();
    if !list.contains(&item) {
        list.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_inference() {
        assert_eq!(TriggerCategory::infer("buying_signals"), TriggerCategory::BuyingSignal);
        assert_eq!(TriggerCategory::infer("churn_risk_keywords"), TriggerCategory::ChurnRisk);
        assert_eq!(TriggerCategory::infer("competitive_mention"), TriggerCategory::Competitive);
        assert_eq!(TriggerCategory::infer("security_compliance"), TriggerCategory::Security);
        assert_eq!(TriggerCategory::infer("usage_drop"), TriggerCategory::UsageDrop);
        assert_eq!(TriggerCategory::infer("account_health"), TriggerCategory::AccountHealth);
        assert_eq!(
            TriggerCategory::infer("high_value_account_mention"),
            TriggerCategory::General
        );
    }

    #[test]
    fn test_priority_parse_and_order() {
        assert_eq!("HIGH".parse::<Priority>(), Ok(Priority::High));
        assert!("urgent".parse::<Priority>().is_err());
        assert!(Priority::Critical.rank() < Priority::Low.rank());
        assert!(Priority::High.is_urgent());
        assert!(!Priority::Medium.is_urgent());
    }

    #[test]
    fn test_directory_fallback() {
        let dir = AccountDirectory::default();
        assert_eq!(dir.account_executive_or_team("acme_inc"), "john.doe@company.com");
        assert_eq!(dir.account_executive_or_team("unknown"), "sales-team@company.com");
        assert!(!dir.is_managed("unknown"));
    }
}
