//! Keyword triggers: substring and regex search over `text` and `subject`.

use regex::{Regex, RegexBuilder};
use salesclaw_core::Priority;
use salesclaw_core::payload::lower_field;
use serde_json::{Map, Value, json};

use crate::base::{Trigger, TriggerMeta, TriggerResult};

/// Matches configured keywords (case-insensitive substrings) and regex
/// patterns against the payload's `text` and `subject`.
pub struct KeywordTrigger {
    meta: TriggerMeta,
    keywords: Vec<String>,
    patterns: Vec<(String, Regex)>,
    context_window: usize,
}

impl KeywordTrigger {
    pub const DEFAULT_CONTEXT_WINDOW: usize = 50;

    /// Invalid patterns are logged and dropped.
    pub fn new<K, P>(meta: TriggerMeta, keywords: K, patterns: P) -> Self
    where
        K: IntoIterator,
        K::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.as_ref().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        let patterns = patterns
            .into_iter()
            .filter_map(|p| {
                let source = p.as_ref().to_string();
                match RegexBuilder::new(&source).case_insensitive(true).build() {
                    Ok(re) => Some((source, re)),
                    Err(e) => {
                        tracing::warn!(
                            "⚠️ Trigger '{}': dropping invalid pattern '{}': {}",
                            meta.id,
                            source,
                            e
                        );
                        None
                    }
                }
            })
            .collect();

        Self {
            meta,
            keywords,
            patterns,
            context_window: Self::DEFAULT_CONTEXT_WINDOW,
        }
    }

    pub fn with_context_window(mut self, chars: usize) -> Self {
        self.context_window = chars;
        self
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Byte span of the earliest keyword or pattern hit in `haystack`.
    fn first_match(
        &self,
        haystack: &str,
        keywords: &[String],
        patterns: &[String],
    ) -> Option<(usize, usize)> {
        let keyword_hits = keywords
            .iter()
            .filter_map(|kw| haystack.find(kw.as_str()).map(|at| (at, at + kw.len())));
        let pattern_hits = self
            .patterns
            .iter()
            .filter(|(source, _)| patterns.contains(source))
            .filter_map(|(_, re)| re.find(haystack).map(|m| (m.start(), m.end())));
        keyword_hits.chain(pattern_hits).min()
    }

    /// The match plus `context_window` chars on each side, with `...` where
    /// the window stops short of the string boundary.
    fn snippet(&self, haystack: &str, (from, to): (usize, usize)) -> String {
        let chars: Vec<char> = haystack.chars().collect();
        let match_start = haystack[..from].chars().count();
        let match_end = haystack[..to].chars().count();
        let start = match_start.saturating_sub(self.context_window);
        let end = (match_end + self.context_window).min(chars.len());

        let body: String = chars[start..end].iter().collect();
        let mut out = String::new();
        if start > 0 {
            out.push_str("...");
        }
        out.push_str(body.trim());
        if end < chars.len() {
            out.push_str("...");
        }
        out
    }
}

impl Trigger for KeywordTrigger {
    fn meta(&self) -> &TriggerMeta {
        &self.meta
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let text = lower_field(data, "text");
        let subject = lower_field(data, "subject");

        let mut matched_conditions = Vec::new();
        let mut matched_keywords = Vec::new();
        let mut matched_patterns = Vec::new();

        for keyword in &self.keywords {
            if text.contains(keyword.as_str()) || subject.contains(keyword.as_str()) {
                matched_keywords.push(keyword.clone());
                matched_conditions.push(format!("keyword_match_{keyword}"));
            }
        }

        for (source, re) in &self.patterns {
            if re.is_match(&text) || re.is_match(&subject) {
                matched_patterns.push(source.clone());
                matched_conditions.push("pattern_match".to_string());
            }
        }

        let mut context = Map::new();
        if !matched_conditions.is_empty() {
            let snippet = match self.first_match(&text, &matched_keywords, &matched_patterns) {
                Some(span) => self.snippet(&text, span),
                None => self
                    .first_match(&subject, &matched_keywords, &matched_patterns)
                    .map(|span| self.snippet(&subject, span))
                    .unwrap_or_default(),
            };
            context.insert("matched_keywords".into(), json!(matched_keywords));
            context.insert("matched_patterns".into(), json!(matched_patterns));
            context.insert("text_snippet".into(), Value::String(snippet));
        }

        TriggerResult::from_matches(
            matched_conditions,
            Vec::new(),
            context,
            self.keywords.len() + self.patterns.len(),
        )
    }

    fn conditions(&self) -> Value {
        let patterns: Vec<&str> = self.patterns.iter().map(|(s, _)| s.as_str()).collect();
        json!({
            "keywords": self.keywords,
            "patterns": patterns,
            "context_window": self.context_window,
        })
    }
}

pub const BUYING_KEYWORDS: &[&str] = &[
    "budget approved",
    "looking for a solution",
    "need something by",
    "ready to purchase",
    "when can we start",
    "what would it take",
    "can acme handle",
    "timeline for implementation",
    "contract terms",
    "pricing proposal",
    "next steps",
    "decision by",
    "approve this",
    "move forward",
    "sign up",
    "get started",
];

pub const BUYING_PATTERNS: &[&str] = &[
    r"budget\s+of\s+\$?\d+",
    r"need\s+this\s+by\s+\w+",
    r"timeline\s+is\s+\w+",
    r"decision\s+maker\s+is",
    r"ready\s+to\s+(sign|commit|proceed)",
    r"what\s+(would|will)\s+it\s+take",
    r"can\s+you\s+(deliver|provide|support)",
    r"(urgent|asap|immediately)\s+need",
];

const STRONG_BUYING_SIGNALS: &[&str] = &["budget approved", "ready to purchase", "sign up", "get started"];

/// Buying intent. Strong signals add +0.2 confidence.
pub struct BuyingSignalTrigger {
    base: KeywordTrigger,
}

impl BuyingSignalTrigger {
    pub fn new() -> Self {
        Self::with_meta(TriggerMeta::new(
            "buying_signals",
            "Buying Signal Detection",
            "Detects when prospects show buying intent",
            Priority::High,
        ))
    }

    pub fn with_meta(meta: TriggerMeta) -> Self {
        Self::from_keyword(KeywordTrigger::new(meta, BUYING_KEYWORDS, BUYING_PATTERNS))
    }

    /// Apply buying-signal handling on top of a custom keyword set.
    pub fn from_keyword(base: KeywordTrigger) -> Self {
        Self { base }
    }
}

impl Default for BuyingSignalTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for BuyingSignalTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "notify_ae_immediately",
            "schedule_demo",
            "prepare_proposal",
            "update_opportunity_stage",
        ]);

        let matched = result.context_strings("matched_keywords");
        if STRONG_BUYING_SIGNALS.iter().any(|s| matched.iter().any(|m| m == s)) {
            result.boost(0.2);
        }
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

pub const CHURN_KEYWORDS: &[&str] = &[
    "cancel",
    "terminate",
    "disappointed",
    "frustrated",
    "switching",
    "alternative",
    "competitor",
    "not meeting needs",
    "considering options",
    "poor performance",
    "unreliable",
    "expensive",
    "cheaper option",
    "end contract",
    "not renewing",
    "unsatisfied",
    "problems with",
    "issues with",
    "complaints about",
];

pub const CHURN_PATTERNS: &[&str] = &[
    r"considering\s+(other\s+)?alternatives",
    r"not\s+meeting\s+.*\s+needs",
    r"shopping\s+around",
    r"price\s+is\s+too\s+high",
    r"found\s+(a\s+)?cheaper",
    r"having\s+issues\s+with",
    r"problems\s+with\s+.*\s+(service|platform|support)",
    r"thinking\s+about\s+(leaving|switching)",
    r"(downtime|outage)\s+issues",
];

const CRITICAL_CHURN_SIGNALS: &[&str] = &["cancel", "terminate", "switching", "not renewing"];

/// Churn risk. A critical signal forces confidence 1.0 and priority critical.
pub struct ChurnRiskTrigger {
    base: KeywordTrigger,
}

impl ChurnRiskTrigger {
    pub fn new() -> Self {
        Self::with_meta(TriggerMeta::new(
            "churn_risk",
            "Churn Risk Detection",
            "Detects when customers show signs of leaving",
            Priority::Critical,
        ))
    }

    pub fn with_meta(meta: TriggerMeta) -> Self {
        Self::from_keyword(KeywordTrigger::new(meta, CHURN_KEYWORDS, CHURN_PATTERNS))
    }

    pub fn from_keyword(base: KeywordTrigger) -> Self {
        Self { base }
    }
}

impl Default for ChurnRiskTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for ChurnRiskTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "immediate_escalation",
            "notify_csm",
            "schedule_emergency_call",
            "prepare_retention_offer",
            "alert_management",
        ]);

        let matched = result.context_strings("matched_keywords");
        if CRITICAL_CHURN_SIGNALS.iter().any(|s| matched.iter().any(|m| m == s)) {
            result.confidence = 1.0;
            result.escalate(Priority::Critical);
        }
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

pub const COMPETITOR_KEYWORDS: &[&str] = &[
    "vercel",
    "netlify",
    "aws amplify",
    "cloudflare pages",
    "github pages",
    "heroku",
    "firebase hosting",
    "azure static web apps",
];

pub const COMPETITIVE_PATTERNS: &[&str] = &[
    r"comparing\s+with\s+\w+",
    r"vs\.?\s+\w+",
    r"better\s+than\s+\w+",
    r"cheaper\s+than\s+\w+",
    r"(competitor|alternative)\s+offers",
    r"their\s+platform\s+(has|offers|provides)",
];

/// Competitor mentions. Records the first matched competitor.
pub struct CompetitiveTrigger {
    base: KeywordTrigger,
}

impl CompetitiveTrigger {
    pub fn new() -> Self {
        Self::with_meta(TriggerMeta::new(
            "competitive_mention",
            "Competitive Mention Detection",
            "Detects when competitors are mentioned",
            Priority::High,
        ))
    }

    pub fn with_meta(meta: TriggerMeta) -> Self {
        Self::from_keyword(KeywordTrigger::new(meta, COMPETITOR_KEYWORDS, COMPETITIVE_PATTERNS))
    }

    pub fn from_keyword(base: KeywordTrigger) -> Self {
        Self { base }
    }
}

impl Default for CompetitiveTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for CompetitiveTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "notify_competitive_team",
            "prepare_battlecard",
            "schedule_competitive_demo",
            "gather_competitive_intel",
        ]);

        let matched = result.context_strings("matched_keywords");
        if let Some(first) = matched.first() {
            result.context.insert("competitor".into(), Value::String(first.clone()));
        }
        for competitor in &matched {
            let action = format!("load_{}_battlecard", competitor.replace(' ', "_"));
            result.suggest(&[action.as_str()]);
        }
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

pub const SECURITY_KEYWORDS: &[&str] = &[
    "security",
    "compliance",
    "hipaa",
    "gdpr",
    "soc2",
    "penetration test",
    "vulnerability",
    "encryption",
    "data protection",
    "privacy policy",
    "audit",
    "certification",
    "iso 27001",
    "pci dss",
    "data residency",
    "access control",
    "authentication",
    "authorization",
];

pub const SECURITY_PATTERNS: &[&str] = &[
    r"security\s+(audit|assessment|review)",
    r"compliance\s+with\s+\w+",
    r"data\s+(protection|privacy|security)",
    r"(penetration|pen)\s+test",
    r"vulnerability\s+(scan|assessment)",
    r"security\s+(controls|measures)",
    r"(encrypt|decrypt)\w*",
    r"access\s+(control|management)",
];

const HEALTHCARE_TERMS: &[&str] = &["hipaa", "baa", "phi", "healthcare"];

/// Security and compliance inquiries. Healthcare terms add HIPAA handling.
pub struct SecurityComplianceTrigger {
    base: KeywordTrigger,
}

impl SecurityComplianceTrigger {
    pub fn new() -> Self {
        Self::with_meta(TriggerMeta::new(
            "security_compliance",
            "Security/Compliance Inquiry",
            "Detects security and compliance questions",
            Priority::High,
        ))
    }

    pub fn with_meta(meta: TriggerMeta) -> Self {
        Self::from_keyword(KeywordTrigger::new(meta, SECURITY_KEYWORDS, SECURITY_PATTERNS))
    }

    pub fn from_keyword(base: KeywordTrigger) -> Self {
        Self { base }
    }
}

impl Default for SecurityComplianceTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Trigger for SecurityComplianceTrigger {
    fn meta(&self) -> &TriggerMeta {
        self.base.meta()
    }

    fn evaluate(&self, data: &Value) -> TriggerResult {
        let mut result = self.base.evaluate(data);
        if !result.triggered {
            return result;
        }

        result.suggest(&[
            "notify_security_team",
            "prepare_compliance_docs",
            "schedule_security_review",
            "provide_certifications",
        ]);

        let matched = result.context_strings("matched_keywords");
        if HEALTHCARE_TERMS.iter().any(|t| matched.iter().any(|m| m == t)) {
            result.suggest(&["prepare_hipaa_materials"]);
            result
                .context
                .insert("compliance_type".into(), Value::String("healthcare".into()));
        }
        result
    }

    fn conditions(&self) -> Value {
        self.base.conditions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::TriggerExt;

    fn plain(keywords: &[&str], patterns: &[&str]) -> KeywordTrigger {
        KeywordTrigger::new(
            TriggerMeta::new("kw", "Keywords", "", Priority::Medium),
            keywords,
            patterns,
        )
    }

    #[test]
    fn test_keyword_substring_is_case_insensitive() {
        let trigger = plain(&["Pricing", "discount"], &[]);
        let result = trigger.evaluate(&json!({"text": "Can you share PRICING details?"}));

        assert!(result.triggered);
        assert_eq!(result.matched_conditions, vec!["keyword_match_pricing"]);
        assert_eq!(result.context_strings("matched_keywords"), vec!["pricing"]);
        assert!((result.confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_subject_and_pattern_match() {
        let trigger = plain(&["renewal"], &[r"contract\s+ends"]);
        let result = trigger.evaluate(&json!({
            "subject": "Renewal question",
            "text": "Our contract  ends in May",
        }));

        assert_eq!(
            result.matched_conditions,
            vec!["keyword_match_renewal", "pattern_match"]
        );
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_no_match_has_zero_confidence_and_empty_context() {
        let trigger = plain(&["pricing"], &[]);
        let result = trigger.evaluate(&json!({"text": "hello"}));
        assert!(!result.triggered);
        assert_eq!(result.confidence, 0.0);
        assert!(result.context.is_empty());
    }

    #[test]
    fn test_invalid_pattern_is_dropped() {
        let trigger = plain(&["a"], &["(unclosed", r"\d+"]);
        assert_eq!(trigger.pattern_count(), 1);
    }

    #[test]
    fn test_snippet_window_and_ellipsis() {
        let trigger = plain(&["budget"], &[]).with_context_window(5);
        let result = trigger.evaluate(&json!({"text": "we finally got the budget approved today"}));
        assert_eq!(result.context_str("text_snippet"), Some("...the budget appr..."));

        let short = plain(&["budget"], &[]).evaluate(&json!({"text": "budget ok"}));
        assert_eq!(short.context_str("text_snippet"), Some("budget ok"));
    }

    #[test]
    fn test_buying_signal_strong_boost() {
        let payload = json!({"text": "We're ready to move forward, budget approved"});
        let base = plain(BUYING_KEYWORDS, BUYING_PATTERNS).evaluate(&payload);
        let result = BuyingSignalTrigger::new().evaluate(&payload);

        assert!(result.triggered);
        assert!(
            result
                .context_strings("matched_keywords")
                .contains(&"budget approved".to_string())
        );
        assert!((result.confidence - (base.confidence + 0.2)).abs() < 1e-9);
        assert!(result.suggested_actions.contains(&"notify_ae_immediately".to_string()));
    }

    #[test]
    fn test_churn_cancel_is_certain_and_critical() {
        let trigger = ChurnRiskTrigger::with_meta(TriggerMeta::new(
            "churn",
            "Churn",
            "",
            Priority::High,
        ));
        let result = trigger.evaluate(&json!({"text": "We may cancel next quarter"}));

        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.escalated_priority, Some(Priority::Critical));
        assert!(result.suggested_actions.contains(&"alert_management".to_string()));

        let mild = trigger.evaluate(&json!({"text": "a bit frustrated lately"}));
        assert!(mild.triggered);
        assert!(mild.confidence < 1.0);
        assert_eq!(mild.escalated_priority, None);
    }

    #[test]
    fn test_competitor_recorded() {
        let result = CompetitiveTrigger::new()
            .evaluate(&json!({"text": "We are evaluating Netlify and AWS Amplify"}));

        assert_eq!(result.context_str("competitor"), Some("netlify"));
        assert!(result.suggested_actions.contains(&"load_netlify_battlecard".to_string()));
        assert!(result.suggested_actions.contains(&"load_aws_amplify_battlecard".to_string()));
    }

    #[test]
    fn test_security_hipaa_materials() {
        let result = SecurityComplianceTrigger::new()
            .evaluate(&json!({"subject": "HIPAA and SOC2 questions"}));

        assert_eq!(result.context_str("compliance_type"), Some("healthcare"));
        let hipaa = result
            .suggested_actions
            .iter()
            .filter(|a| a.as_str() == "prepare_hipaa_materials")
            .count();
        assert_eq!(hipaa, 1);
    }

    #[test]
    fn test_disabled_keyword_trigger() {
        let trigger = KeywordTrigger::new(
            TriggerMeta::new("kw", "Keywords", "", Priority::Low).disabled(),
            ["cancel"],
            Vec::<String>::new(),
        );
        assert!(!trigger.should_fire(&json!({"text": "cancel"})));
    }
}
