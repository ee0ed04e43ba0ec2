use serde::{Deserialize, Serialize};

/// Duration applied when a booking arrives with a service type outside the
/// published catalog.
pub const DEFAULT_DURATION_MINUTES: u32 = 60;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    Consultation,
    BusinessPlanning,
    FinancialReview,
    StrategySession,
    FollowUp,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Consultation => "consultation",
            Self::BusinessPlanning => "business-planning",
            Self::FinancialReview => "financial-review",
            Self::StrategySession => "strategy-session",
            Self::FollowUp => "follow-up",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "consultation" => Some(Self::Consultation),
            "business-planning" => Some(Self::BusinessPlanning),
            "financial-review" => Some(Self::FinancialReview),
            "strategy-session" => Some(Self::StrategySession),
            "follow-up" => Some(Self::FollowUp),
            _ => None,
        }
    }

    pub fn duration_minutes(&self) -> u32 {
        match self {
            Self::Consultation => 30,
            Self::BusinessPlanning => 60,
            Self::FinancialReview => 45,
            Self::StrategySession => 90,
            Self::FollowUp => 30,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Consultation => "Initial Consultation (30 min)",
            Self::BusinessPlanning => "Business Planning (60 min)",
            Self::FinancialReview => "Financial Review (45 min)",
            Self::StrategySession => "Strategy Session (90 min)",
            Self::FollowUp => "Follow-up Meeting (30 min)",
        }
    }
}

/// Resolve the duration for a raw service-type string, falling back to the
/// default for anything outside the catalog.
pub fn duration_for(raw: &str) -> u32 {
    ServiceType::parse(raw).map(|service| service.duration_minutes()).unwrap_or(DEFAULT_DURATION_MINUTES)
}
