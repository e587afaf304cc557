//! Mentor persona prompts

/// System instruction shared by text chat and voice sessions
pub const SYSTEM_INSTRUCTION: &str = "You are an expert Data Science Mentor and Career Coach. \
Your goal is to guide the user through a 90-day roadmap to become job-ready. \
You are encouraging, technical, and practical. \
Focus on Python, SQL, Machine Learning (Scikit-Learn), and Deep Learning fundamentals. \
Always provide actionable advice, specific tool recommendations, and career tips for freelancing.";

/// Suffix appended to the system instruction for spoken sessions
const LIVE_SUFFIX: &str = " You are speaking to the student now.";

/// Build the system instruction for a live voice session
#[must_use]
pub fn live_instruction(base: &str) -> String {
    format!("{}{LIVE_SUFFIX}", base.trim_end())
}
