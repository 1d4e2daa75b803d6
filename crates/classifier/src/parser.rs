use models::DeductionVerdict;
use regex::Regex;

const DEFAULT_REASON: &str = "No reason provided";

/// Parser for the model's free-text deduction verdict.
///
/// The model is asked to answer `Yes/No, <short reason>, NN%` but is not
/// guaranteed to comply, so parsing degrades gracefully instead of rejecting:
/// a best-effort verdict always comes back, with `score: None` when no
/// percentage is found anywhere in the reply.
pub struct VerdictParser {
    strict: Regex,
    percent: Regex,
    leading_reason: Regex,
}

impl VerdictParser {
    pub fn new() -> Self {
        // Static patterns; construction cannot fail.
        Self {
            strict: Regex::new(r"(?i)^(yes|no)\s*,\s*(.+?)\s*,\s*(\d{1,3})%").unwrap(),
            percent: Regex::new(r"(\d{1,3})%").unwrap(),
            leading_reason: Regex::new(r"(?i)^(?:yes|no)\s*,\s*([^,]+?)(?:[,\s]+\d{1,3}%.*)?$")
                .unwrap(),
        }
    }

    /// Parse one reply. Pure and total: same input, same output, no failure
    /// path and no distinct "unknown" state.
    pub fn parse(&self, text: &str) -> DeductionVerdict {
        let text = text.trim();

        // The verdict itself only needs the leading token.
        let is_deductible = text
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("yes"));

        // Strict path: the reply followed the requested format.
        if let Some(caps) = self.strict.captures(text) {
            let reason = caps[2].trim();
            let score = caps[3].parse::<u32>().ok().map(clamp_percentage);
            return DeductionVerdict {
                is_deductible,
                reason: capitalize(reason),
                score,
            };
        }

        // Fallback path: fish a percentage out of anywhere in the text, and
        // take the first comma-delimited segment after the leading yes/no as
        // the reason.
        let score = self
            .percent
            .captures(text)
            .and_then(|caps| caps[1].parse::<u32>().ok())
            .map(clamp_percentage);

        let reason = self
            .leading_reason
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REASON.to_string());

        DeductionVerdict {
            is_deductible,
            reason: capitalize(&reason),
            score,
        }
    }
}

impl Default for VerdictParser {
    fn default() -> Self {
        Self::new()
    }
}

/// One-off convenience wrapper around [`VerdictParser`].
pub fn parse_verdict(text: &str) -> DeductionVerdict {
    VerdictParser::new().parse(text)
}

fn clamp_percentage(raw: u32) -> f64 {
    f64::from(raw.min(100)) / 100.0
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
