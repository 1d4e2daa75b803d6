use chrono::NaiveDate;
use models::User;

/// Fixed instructions sent as the system message for every classification.
/// The reply format is what [`crate::parser::VerdictParser`] expects.
pub const SYSTEM_PROMPT: &str = "You are a tax assistant for self-employed professionals and \
small business owners in the United States. Decide whether the expense described by the user \
is tax-deductible for them. Answer in exactly this format: Yes or No, followed by a short \
reason, followed by your confidence as a percentage. Example: \
\"Yes, Office supplies for business operations, 85%\". Do not add anything else.";

/// The facts about one expense that the model sees.
#[derive(Debug, Clone)]
pub struct ExpenseFacts {
    pub merchant_name: String,
    /// Absolute value, currency major units.
    pub amount: f64,
    pub date: Option<NaiveDate>,
    /// Comma-joined label list.
    pub category: String,
}

/// Builds the user message for one expense, folding in whatever profile
/// fields are on record. Absent fields are simply left out of the prompt.
pub fn build_user_prompt(facts: &ExpenseFacts, profile: Option<&User>) -> String {
    let mut prompt = format!(
        "Expense: {} for ${:.2}",
        facts.merchant_name, facts.amount
    );
    if let Some(date) = facts.date {
        prompt.push_str(&format!(" on {}", date.format("%Y-%m-%d")));
    }
    if !facts.category.is_empty() {
        prompt.push_str(&format!(" (category: {})", facts.category));
    }
    prompt.push('.');

    if let Some(user) = profile {
        if let Some(profession) = user.profession.as_deref().filter(|p| !p.is_empty()) {
            prompt.push_str(&format!(" The taxpayer works as: {profession}."));
        }
        if let Some(state) = user.state.as_deref().filter(|s| !s.is_empty()) {
            prompt.push_str(&format!(" They file in {state}."));
        }
        if let Some(filing_status) = user.filing_status.as_deref().filter(|f| !f.is_empty()) {
            prompt.push_str(&format!(" Filing status: {filing_status}."));
        }
        if let Some(income) = user.income {
            prompt.push_str(&format!(" Annual income: ${income:.0}."));
        }
    }

    prompt.push_str(" Is this expense tax-deductible?");
    prompt
}
