//! Lead model for the academy's sales desk: filtering, pipeline columns, dashboard
//! figures and the lead-strategy exchange with the assistant.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const COURSE_OPTIONS: [&str; 6] = [
    "Diploma in Cabin Crew & In-flight Services",
    "Airport Ground Handling & Management",
    "Travel & Tourism Management (IATA Certified)",
    "Aviation Hospitality Executive Program",
    "Customer Service Excellence Training",
    "Personality Development & Grooming",
];

/// Label of the source filter that matches every lead.
pub const ALL_SOURCES: &str = "All Sources";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeadStatus {
    New,
    Contacted,
    Counseling,
    Demo,
    #[serde(rename = "Trial Flight")]
    TrialFlight,
    Negotiation,
    #[serde(rename = "Closed Won")]
    ClosedWon,
    #[serde(rename = "Closed Lost")]
    ClosedLost,
}

impl LeadStatus {
    pub const ALL: [LeadStatus; 8] = [
        LeadStatus::New,
        LeadStatus::Contacted,
        LeadStatus::Counseling,
        LeadStatus::Demo,
        LeadStatus::TrialFlight,
        LeadStatus::Negotiation,
        LeadStatus::ClosedWon,
        LeadStatus::ClosedLost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "New",
            LeadStatus::Contacted => "Contacted",
            LeadStatus::Counseling => "Counseling",
            LeadStatus::Demo => "Demo",
            LeadStatus::TrialFlight => "Trial Flight",
            LeadStatus::Negotiation => "Negotiation",
            LeadStatus::ClosedWon => "Closed Won",
            LeadStatus::ClosedLost => "Closed Lost",
        }
    }

    /// Name shown to sales reps; the demo stage is run as a counseling session.
    pub fn label(&self) -> &'static str {
        match self {
            LeadStatus::Demo => "Counseling",
            other => other.as_str(),
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("unknown lead status: {}", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub status: LeadStatus,
    pub course_interest: String,
    pub source: String,
    pub created_at: String,
    pub last_contacted: String,
    /// Expected course fee in rupees.
    pub estimated_value: u64,
    pub notes: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    Call,
    Email,
    Meeting,
    Flight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: String,
    pub lead_id: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub description: String,
    pub timestamp: String,
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SalesReport {
    pub period: String,
    pub total_leads: usize,
    pub closed_won: usize,
    pub conversion_rate: u32,
    pub total_revenue: u64,
    pub top_performer: String,
}

/// Lead list filter. Empty criteria match everything.
#[derive(Debug, Clone, Default)]
pub struct LeadFilter {
    /// Case-insensitive match on name, email or course.
    pub search: String,
    /// `None` means all sources.
    pub source: Option<String>,
    pub statuses: Vec<LeadStatus>,
    pub courses: Vec<String>,
}

impl LeadFilter {
    pub fn matches(&self, lead: &Lead) -> bool {
        let query = self.search.to_lowercase();
        let matches_search = lead.name.to_lowercase().contains(&query)
            || lead.email.to_lowercase().contains(&query)
            || lead.course_interest.to_lowercase().contains(&query);

        let matches_source = match self.source.as_deref() {
            None | Some(ALL_SOURCES) => true,
            Some(source) => lead.source == source,
        };
        let matches_status = self.statuses.is_empty() || self.statuses.contains(&lead.status);
        let matches_course = self.courses.is_empty() || self.courses.contains(&lead.course_interest);

        matches_search && matches_source && matches_status && matches_course
    }

    pub fn apply<'a>(&self, leads: &'a [Lead]) -> Vec<&'a Lead> {
        leads.iter().filter(|lead| self.matches(lead)).collect()
    }
}

fn unique_by<T: PartialEq + Clone>(leads: &[Lead], key: impl Fn(&Lead) -> T) -> Vec<T> {
    let mut seen = Vec::new();
    for lead in leads {
        let value = key(lead);
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen
}

pub fn unique_sources(leads: &[Lead]) -> Vec<String> {
    unique_by(leads, |l| l.source.clone())
}

pub fn unique_statuses(leads: &[Lead]) -> Vec<LeadStatus> {
    unique_by(leads, |l| l.status)
}

pub fn unique_courses(leads: &[Lead]) -> Vec<String> {
    unique_by(leads, |l| l.course_interest.clone())
}

/// First entry of [`COURSE_OPTIONS`] containing `query`, ignoring case.
pub fn find_course(query: &str) -> Option<&'static str> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return None;
    }
    COURSE_OPTIONS
        .iter()
        .copied()
        .find(|course| course.to_lowercase().contains(&query))
}

/// Kanban columns, left to right.
pub const PIPELINE_STAGES: [LeadStatus; 5] = [
    LeadStatus::New,
    LeadStatus::Contacted,
    LeadStatus::Demo,
    LeadStatus::Negotiation,
    LeadStatus::ClosedWon,
];

#[derive(Debug, Clone)]
pub struct PipelineColumn<'a> {
    pub stage: LeadStatus,
    pub label: &'static str,
    pub leads: Vec<&'a Lead>,
    pub total_value: u64,
}

/// Group leads into [`PIPELINE_STAGES`]. Counseling leads sit in the demo column.
pub fn pipeline(leads: &[Lead]) -> Vec<PipelineColumn<'_>> {
    PIPELINE_STAGES
        .iter()
        .map(|&stage| {
            let in_stage: Vec<&Lead> = leads
                .iter()
                .filter(|l| {
                    l.status == stage
                        || (stage == LeadStatus::Demo && l.status == LeadStatus::Counseling)
                })
                .collect();
            PipelineColumn {
                stage,
                label: stage.label(),
                total_value: in_stage.iter().map(|l| l.estimated_value).sum(),
                leads: in_stage,
            }
        })
        .collect()
}

/// Figures sent to the assistant for the dashboard overview.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceSnapshot {
    pub total_leads: usize,
    /// Percentage of leads closed won, rounded.
    pub conversion_rate: u32,
    /// Sum of closed-won values in rupees.
    pub total_revenue: u64,
}

impl PerformanceSnapshot {
    pub fn from_leads(leads: &[Lead]) -> Self {
        let won: Vec<&Lead> = leads
            .iter()
            .filter(|l| l.status == LeadStatus::ClosedWon)
            .collect();
        let conversion_rate = if leads.is_empty() {
            0
        } else {
            (won.len() as f64 * 100.0 / leads.len() as f64).round() as u32
        };

        Self {
            total_leads: leads.len(),
            conversion_rate,
            total_revenue: won.iter().map(|l| l.estimated_value).sum(),
        }
    }
}

impl SalesReport {
    pub fn from_leads(period: &str, leads: &[Lead], top_performer: &str) -> Self {
        let snapshot = PerformanceSnapshot::from_leads(leads);
        Self {
            period: period.to_string(),
            total_leads: snapshot.total_leads,
            closed_won: leads.iter().filter(|l| l.status == LeadStatus::ClosedWon).count(),
            conversion_rate: snapshot.conversion_rate,
            total_revenue: snapshot.total_revenue,
            top_performer: top_performer.to_string(),
        }
    }
}

/// Render rupees with Indian digit grouping, e.g. `12,00,000`.
pub fn format_inr(amount: u64) -> String {
    let digits = amount.to_string();
    if digits.len() <= 3 {
        return digits;
    }

    let (head, tail) = digits.split_at(digits.len() - 3);
    let mut groups = Vec::new();
    let mut end = head.len();
    while end > 2 {
        groups.push(&head[end - 2..end]);
        end -= 2;
    }
    groups.push(&head[..end]);
    groups.reverse();

    format!("{},{}", groups.join(","), tail)
}

/// Closing strategy and follow-up actions for one lead.
#[derive(Debug, Clone, PartialEq)]
pub struct LeadStrategy {
    pub strategy: String,
    pub next_steps: Vec<String>,
}

impl LeadStrategy {
    /// Shown when the assistant could not be reached.
    pub fn unavailable() -> Self {
        Self {
            strategy: "Emphasize career placement records with international airlines.".to_string(),
            next_steps: vec![
                "Follow up on grooming standards inquiry.".to_string(),
                "Provide EMI options for course fees.".to_string(),
                "Invite for a campus visit.".to_string(),
            ],
        }
    }
}

pub fn lead_strategy_prompt(lead: &Lead) -> String {
    format!(
        "Provide a high-conversion sales closing strategy AND exactly 3 specific next-step actions for this student lead.\n\n\
         Lead Details:\n\
         - Name: {}\n\
         - Current Status: {}\n\
         - Interested In: {}\n\
         - CRM Notes: {}\n\n\
         Format your response precisely like this:\n\
         STRATEGY: [One paragraph strategy]\n\
         NEXT STEPS:\n\
         1. [Step 1]\n\
         2. [Step 2]\n\
         3. [Step 3]",
        lead.name, lead.status, lead.course_interest, lead.notes
    )
}

fn strip_numbering(line: &str) -> &str {
    let line = line.trim();
    let digits = line.len() - line.trim_start_matches(|c: char| c.is_ascii_digit()).len();
    if digits > 0 {
        if let Some(rest) = line[digits..].strip_prefix('.') {
            return rest.trim();
        }
    }
    line
}

/// Split a `STRATEGY: … NEXT STEPS: …` answer. Missing parts fall back to canned advice.
pub fn parse_lead_strategy(text: &str) -> LeadStrategy {
    let mut sections = text.split("NEXT STEPS:");
    let strategy = sections
        .next()
        .unwrap_or_default()
        .replacen("STRATEGY:", "", 1)
        .trim()
        .to_string();

    let next_steps: Vec<String> = sections
        .next()
        .map(|steps| {
            steps
                .lines()
                .map(strip_numbering)
                .filter(|s| !s.is_empty())
                .take(3)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    LeadStrategy {
        strategy: if strategy.is_empty() {
            "Maintain frequent follow-ups highlighting placement records.".to_string()
        } else {
            strategy
        },
        next_steps: if next_steps.is_empty() {
            vec![
                "Schedule a final placement counseling call.".to_string(),
                "Share success stories of alumni in international airlines.".to_string(),
                "Invite to our upcoming grooming workshop.".to_string(),
            ]
        } else {
            next_steps
        },
    }
}

#[allow(clippy::too_many_arguments)]
fn lead(
    id: &str,
    name: &str,
    email: &str,
    phone: &str,
    status: LeadStatus,
    course: &str,
    source: &str,
    dates: (&str, &str),
    value: u64,
    notes: &str,
) -> Lead {
    Lead {
        id: id.to_string(),
        name: name.to_string(),
        email: email.to_string(),
        phone: phone.to_string(),
        status,
        course_interest: course.to_string(),
        source: source.to_string(),
        created_at: dates.0.to_string(),
        last_contacted: dates.1.to_string(),
        estimated_value: value,
        notes: notes.to_string(),
    }
}

/// Seed leads for the demo desk.
pub fn mock_leads() -> Vec<Lead> {
    vec![
        lead(
            "1",
            "Ananya Sharma",
            "ananya.s@gmail.com",
            "+91 98765 43210",
            LeadStatus::Counseling,
            "Diploma in Cabin Crew & In-flight Services",
            "Instagram Ads",
            ("2024-01-01", "2024-01-15"),
            150000,
            "Inquired about height requirements and grooming standards for international airlines.",
        ),
        lead(
            "2",
            "Priya Iyer",
            "priya.iyer@outlook.com",
            "+91 88776 55443",
            LeadStatus::New,
            "Airport Ground Handling & Management",
            "Website",
            ("2024-01-10", "2024-01-10"),
            120000,
            "Interested in working with major ground handling agencies at Delhi Airport.",
        ),
        lead(
            "3",
            "Rahul Varma",
            "rahul.v@rediffmail.com",
            "+91 99887 76655",
            LeadStatus::Negotiation,
            "Travel & Tourism Management (IATA)",
            "Referral",
            ("2023-12-25", "2024-01-14"),
            85000,
            "Looking for certification to start a travel agency or join an MNC travel desk.",
        ),
    ]
}

/// Seed activity log, in the order it happened.
pub fn mock_activities(lead_id: &str) -> Vec<Activity> {
    let entries: &[(&str, ActivityKind, &str, &str, &str)] = match lead_id {
        "1" => &[
            ("a1", ActivityKind::Call, "Initial inquiry about course fees.", "2024-01-02 10:30 AM", "Sarah Admin"),
            ("a2", ActivityKind::Email, "Sent brochure for Cabin Crew program.", "2024-01-03 02:15 PM", "Sarah Admin"),
            ("a3", ActivityKind::Meeting, "Counseling session completed. Student is positive.", "2024-01-15 11:00 AM", "Raj Consultant"),
        ],
        "2" => &[
            ("b1", ActivityKind::Call, "Inquired via website. Callback scheduled.", "2024-01-10 09:00 AM", "System"),
        ],
        "3" => &[
            ("c1", ActivityKind::Email, "Requested details on IATA certification.", "2023-12-26 11:20 AM", "Raj Consultant"),
            ("c2", ActivityKind::Call, "Followed up on registration forms.", "2024-01-14 04:30 PM", "Raj Consultant"),
        ],
        _ => &[],
    };

    entries
        .iter()
        .map(|&(id, kind, description, timestamp, agent)| Activity {
            id: id.to_string(),
            lead_id: lead_id.to_string(),
            kind,
            description: description.to_string(),
            timestamp: timestamp.to_string(),
            agent: agent.to_string(),
        })
        .collect()
}
