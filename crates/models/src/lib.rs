use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// User models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaid_token: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub income: Option<f64>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub filing_status: Option<String>,
}

impl User {
    /// Whether a bank access token is stored. Its presence gates all bank operations.
    pub fn has_bank_link(&self) -> bool {
        self.plaid_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Partial profile update; only the fields that are present are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profession: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub income: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filing_status: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.profession.is_none()
            && self.income.is_none()
            && self.state.is_none()
            && self.filing_status.is_none()
    }
}

// Account models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: String,
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub institution_id: Option<String>,
    #[serde(default)]
    pub last_cursor: Option<String>,
}

// Transaction models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub trans_id: String,
    pub account_id: String,
    pub date: NaiveDate,
    /// Absolute value, in currency major units.
    pub amount: f64,
    pub merchant_name: String,
    /// Comma-joined label list.
    pub category: String,
    #[serde(default)]
    pub is_deductible: Option<bool>,
    #[serde(default)]
    pub deductible_reason: Option<String>,
    #[serde(default)]
    pub deduction_score: Option<f64>,
}

impl Transaction {
    /// Merge a classification verdict into the record. Happens once, on import.
    pub fn apply_verdict(&mut self, verdict: DeductionVerdict) {
        self.is_deductible = Some(verdict.is_deductible);
        self.deductible_reason = Some(verdict.reason);
        self.deduction_score = verdict.score;
    }

    pub fn is_classified(&self) -> bool {
        self.is_deductible.is_some()
    }
}

/// Structured output of classifying one transaction.
///
/// `score` is a confidence in `[0, 1]`; it is `None` when the model's reply
/// contained no recognizable percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeductionVerdict {
    pub is_deductible: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl DeductionVerdict {
    /// Conservative default used when a classification call fails: not
    /// deductible, flagged for a human, zero confidence.
    pub fn manual_review() -> Self {
        Self {
            is_deductible: false,
            reason: "Requires manual review".to_string(),
            score: Some(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_verdict_sets_all_classification_fields() {
        let mut txn = Transaction {
            trans_id: "TXN001".to_string(),
            account_id: "ACC001".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            amount: 42.50,
            merchant_name: "Staples".to_string(),
            category: "Shops, Office Supplies".to_string(),
            is_deductible: None,
            deductible_reason: None,
            deduction_score: None,
        };
        assert!(!txn.is_classified());

        txn.apply_verdict(DeductionVerdict {
            is_deductible: true,
            reason: "Office supplies for business operations".to_string(),
            score: Some(0.85),
        });

        assert!(txn.is_classified());
        assert_eq!(txn.is_deductible, Some(true));
        assert_eq!(
            txn.deductible_reason.as_deref(),
            Some("Office supplies for business operations")
        );
        assert_eq!(txn.deduction_score, Some(0.85));
    }

    #[test]
    fn test_manual_review_default_is_conservative() {
        let verdict = DeductionVerdict::manual_review();
        assert!(!verdict.is_deductible);
        assert_eq!(verdict.reason, "Requires manual review");
        assert_eq!(verdict.score, Some(0.0));
    }

    #[test]
    fn test_has_bank_link_requires_non_empty_token() {
        let mut user = User {
            id: "user-1".to_string(),
            plaid_token: None,
            full_name: None,
            profession: None,
            income: None,
            state: None,
            filing_status: None,
        };
        assert!(!user.has_bank_link());

        user.plaid_token = Some(String::new());
        assert!(!user.has_bank_link());

        user.plaid_token = Some("access-sandbox-123".to_string());
        assert!(user.has_bank_link());
    }
}
