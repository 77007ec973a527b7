//! Reseller (affiliate) network rows, filtering and summary figures.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::contains_ignore_case;

pub const RESELLERS_TABLE: &str = "resellers";

/// Commission rate applied to a new reseller when none is given.
pub const DEFAULT_COMMISSION_RATE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResellerStatus {
    #[default]
    Active,
    Pending,
    Inactive,
}

impl FromStr for ResellerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(ResellerStatus::Active),
            "pending" => Ok(ResellerStatus::Pending),
            "inactive" => Ok(ResellerStatus::Inactive),
            other => Err(format!("Unknown status '{}'", other)),
        }
    }
}

impl ResellerStatus {
    pub fn display_name(&self) -> &'static str {
        match self {
            ResellerStatus::Active => "Active",
            ResellerStatus::Pending => "Pending",
            ResellerStatus::Inactive => "Inactive",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reseller {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub commission_rate: f64,
    #[serde(default)]
    pub status: ResellerStatus,
    #[serde(default)]
    pub total_sales: f64,
    #[serde(default)]
    pub total_commissions: f64,
    #[serde(default)]
    pub customers_count: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_sale: Option<DateTime<Utc>>,
}

/// Insert payload for `resellers`.
#[derive(Debug, Clone, Serialize)]
pub struct NewReseller {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub company: String,
    pub commission_rate: f64,
    pub status: ResellerStatus,
}

impl NewReseller {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: String::new(),
            company: String::new(),
            commission_rate: DEFAULT_COMMISSION_RATE,
            status: ResellerStatus::Active,
        }
    }

    /// Name and email are required; rates are percentages.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Name is required".to_string());
        }
        if !self.email.contains('@') {
            return Err("A valid email is required".to_string());
        }
        if !(0.0..=100.0).contains(&self.commission_rate) {
            return Err("Commission rate must be between 0 and 100".to_string());
        }
        Ok(())
    }
}

/// Search + status filter for the reseller list.
#[derive(Debug, Clone, Default)]
pub struct ResellerFilter {
    pub search: String,
    /// `None` means all statuses.
    pub status: Option<ResellerStatus>,
}

impl ResellerFilter {
    pub fn matches(&self, reseller: &Reseller) -> bool {
        let matches_search = self.search.is_empty()
            || contains_ignore_case(&reseller.name, &self.search)
            || contains_ignore_case(&reseller.email, &self.search)
            || reseller
                .company
                .as_deref()
                .map(|c| contains_ignore_case(c, &self.search))
                .unwrap_or(false);
        let matches_status = self.status.map(|s| s == reseller.status).unwrap_or(true);
        matches_search && matches_status
    }

    pub fn apply<'a>(&self, resellers: &'a [Reseller]) -> Vec<&'a Reseller> {
        resellers.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Totals shown above the reseller list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResellerSummary {
    pub total: usize,
    pub active: usize,
    pub total_sales: f64,
    pub total_commissions: f64,
}

impl ResellerSummary {
    pub fn from_resellers(resellers: &[Reseller]) -> Self {
        Self {
            total: resellers.len(),
            active: resellers
                .iter()
                .filter(|r| r.status == ResellerStatus::Active)
                .count(),
            total_sales: resellers.iter().map(|r| r.total_sales).sum(),
            total_commissions: resellers.iter().map(|r| r.total_commissions).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reseller(
        name: &str,
        email: &str,
        company: Option<&str>,
        status: ResellerStatus,
    ) -> Reseller {
        Reseller {
            id: name.to_lowercase(),
            name: name.to_string(),
            email: email.to_string(),
            phone: None,
            company: company.map(str::to_string),
            commission_rate: 10.0,
            status,
            total_sales: 1000.0,
            total_commissions: 100.0,
            customers_count: 1,
            created_at: Utc::now(),
            last_sale: None,
        }
    }

    fn sample() -> Vec<Reseller> {
        vec![
            reseller(
                "John Smith",
                "john.smith@example.com",
                Some("TechSolutions Inc."),
                ResellerStatus::Active,
            ),
            reseller(
                "Mike Chen",
                "mike.chen@example.com",
                Some("AI Consulting Group"),
                ResellerStatus::Pending,
            ),
            reseller("Lisa Rodriguez", "lisa@growth.io", None, ResellerStatus::Inactive),
        ]
    }

    #[test]
    fn test_filter_search_covers_name_email_company() {
        let resellers = sample();
        let by = |search: &str| ResellerFilter { search: search.to_string(), status: None };

        assert_eq!(by("smith").apply(&resellers).len(), 1);
        assert_eq!(by("GROWTH.IO").apply(&resellers).len(), 1);
        assert_eq!(by("consulting").apply(&resellers)[0].name, "Mike Chen");
        assert_eq!(by("example.com").apply(&resellers).len(), 2);
        assert_eq!(by("").apply(&resellers).len(), 3);
    }

    #[test]
    fn test_filter_combines_search_and_status() {
        let resellers = sample();
        let filter = ResellerFilter {
            search: "example".to_string(),
            status: Some(ResellerStatus::Pending),
        };
        let matched = filter.apply(&resellers);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].name, "Mike Chen");
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("Active".parse(), Ok(ResellerStatus::Active));
        assert_eq!(" pending ".parse(), Ok(ResellerStatus::Pending));
        assert!("all".parse::<ResellerStatus>().is_err());
    }

    #[test]
    fn test_summary() {
        let summary = ResellerSummary::from_resellers(&sample());
        assert_eq!(summary.total, 3);
        assert_eq!(summary.active, 1);
        assert_eq!(summary.total_sales, 3000.0);
        assert_eq!(summary.total_commissions, 300.0);
    }

    #[test]
    fn test_new_reseller_validation() {
        let mut new = NewReseller::new("Sarah Johnson", "sarah@example.com");
        assert!(new.validate().is_ok());
        assert_eq!(new.commission_rate, DEFAULT_COMMISSION_RATE);

        new.email = "not-an-email".to_string();
        assert!(new.validate().is_err());

        new.email = "sarah@example.com".to_string();
        new.commission_rate = 120.0;
        assert!(new.validate().is_err());
    }
}
