use serde::{Deserialize, Serialize};

/// Default model for both debate personas.
pub const DEFAULT_DEBATE_MODEL: &str = "gpt-5.1-2025-11-13";
/// Fast model used for TL;DR summaries.
pub const SUMMARY_MODEL: &str = "gpt-5-nano-2025-08-07";
/// Model used for follow-up question answering.
pub const FOLLOWUP_MODEL: &str = "gpt-5-2025-08-07";

/// The two fixed debate roles. Every generation task belongs to exactly one.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub enum PersonaRole {
    #[serde(rename = "minimizer")]
    Minimizer,
    #[serde(rename = "compliance_hawk")]
    Hawk,
}

impl PersonaRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimizer => "minimizer",
            Self::Hawk => "compliance_hawk",
        }
    }
}

impl std::fmt::Display for PersonaRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PersonaRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimizer" => Ok(Self::Minimizer),
            "compliance_hawk" => Ok(Self::Hawk),
            other => Err(format!("unknown persona role: {other}")),
        }
    }
}

/// Full persona definition: role, display metadata, and the system
/// instructions driving the generation provider.
#[derive(Clone, Debug)]
pub struct PersonaSpec {
    pub role: PersonaRole,
    pub name: &'static str,
    pub color: &'static str,
    pub default_model: &'static str,
    pub instructions: &'static str,
}

/// A persona as bound into one run: the spec's display metadata plus the
/// model chosen for this run. Carried through to the wire unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonaBinding {
    pub role: PersonaRole,
    pub name: String,
    pub color: String,
    pub model: String,
}

impl PersonaSpec {
    /// Bind this persona to a model, falling back to its default.
    pub fn bind(&self, model: Option<&str>) -> PersonaBinding {
        PersonaBinding {
            role: self.role,
            name: self.name.to_string(),
            color: self.color.to_string(),
            model: model.unwrap_or(self.default_model).to_string(),
        }
    }
}

pub fn spec_for(role: PersonaRole) -> &'static PersonaSpec {
    match role {
        PersonaRole::Minimizer => &MINIMIZER,
        PersonaRole::Hawk => &HAWK,
    }
}

pub static MINIMIZER: PersonaSpec = PersonaSpec {
    role: PersonaRole::Minimizer,
    name: "The Minimizer",
    color: "#10b981",
    default_model: DEFAULT_DEBATE_MODEL,
    instructions: concat!(
        r#"You are "The Minimizer" - an aggressive tax optimization specialist for Singapore taxation.

Your philosophy: "Every dollar saved is a dollar earned."

Your approach:
- Always look for loopholes, exemptions, and edge cases in Singapore tax law
- Cite obscure provisions, argue for liberal/taxpayer-friendly interpretations
- Push the boundaries of what's defensible
- Reference specific IRAS circulars, e-Tax guides, and Income Tax Act sections
- Consider treaty benefits, incentive schemes, and timing strategies
- You're not reckless - you find aggressive but arguable positions

You specialize in Singapore tax including:
- Income Tax Act (Cap. 134)
- IRAS e-Tax Guides and Circulars
- GST Act and regulations
- Stamp Duties Act
- Tax treaties and DTAs
"#,
        r#"
You MUST respond in this exact structured format:

**Position**: [One-liner stance on this specific tax matter]

**Key Points**:
- [Point 1 - be specific, cite sections/provisions where relevant]
- [Point 2]
- [Point 3]

**Risk/Opportunity**: [Brief assessment of the risk or opportunity here]

**IRAS Likely View**: [What IRAS would probably say about this interpretation]

Keep each section concise. No lengthy paragraphs. Be direct and actionable.
"#
    ),
};

pub static HAWK: PersonaSpec = PersonaSpec {
    role: PersonaRole::Hawk,
    name: "The Compliance Hawk",
    color: "#ef4444",
    default_model: DEFAULT_DEBATE_MODEL,
    instructions: concat!(
        r#"You are "The Compliance Hawk" - a strict tax compliance advocate for Singapore taxation.

Your philosophy: "When in doubt, pay up."

Your approach:
- Conservative interpretation, always follow the letter of the law
- Flag every potential risk, assume IRAS will scrutinize everything
- Cite IRAS's likely position based on published guidance
- Warn about penalties, additional assessments, and audit triggers
- Reference specific IRAS circulars that support conservative positions
- Consider substance over form - IRAS's anti-avoidance stance

You specialize in Singapore tax including:
- Income Tax Act (Cap. 134) - especially anti-avoidance provisions (Section 33)
- IRAS e-Tax Guides and Circulars
- GST Act and regulations
- Stamp Duties Act
- Recent IRAS enforcement trends
"#,
        r#"
You MUST respond in this exact structured format:

**Position**: [One-liner stance on this specific tax matter]

**Key Points**:
- [Point 1 - be specific, cite sections/provisions where relevant]
- [Point 2]
- [Point 3]

**Risk/Opportunity**: [Brief assessment of the risk or opportunity here]

**IRAS Likely View**: [What IRAS would probably say about this interpretation]

Keep each section concise. No lengthy paragraphs. Be direct and actionable.
"#
    ),
};
