//! Section parser for enrichment replies.
//!
//! A reply is expected to contain the literal headers `WHY:`,
//! `BUSINESS_IMPACT:` and `TECHNICAL_CHANGES:`. Each section runs from its
//! header to the next known header (or end of text). Missing or empty
//! sections fall back to fixed prose, so parsing never fails.

pub const WHY_HEADER: &str = "WHY:";
pub const BUSINESS_IMPACT_HEADER: &str = "BUSINESS_IMPACT:";
pub const TECHNICAL_CHANGES_HEADER: &str = "TECHNICAL_CHANGES:";

pub const DEFAULT_WHY: &str = "Unable to determine the purpose of this change.";
pub const DEFAULT_BUSINESS_IMPACT: &str = "Business impact not clear from available information.";
pub const DEFAULT_TECHNICAL_CHANGES: &str = "Technical changes not well documented.";

const HEADERS: [&str; 3] = [WHY_HEADER, BUSINESS_IMPACT_HEADER, TECHNICAL_CHANGES_HEADER];

/// The three narrative fields, always populated.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSections {
    pub why: String,
    pub business_impact: String,
    pub technical_changes: String,
    /// True when all three headers yielded non-empty text.
    pub all_found: bool,
}

/// Parse a model reply into its three sections, substituting defaults.
pub fn parse_sections(reply: &str) -> ParsedSections {
    let why = extract_section(reply, WHY_HEADER);
    let business_impact = extract_section(reply, BUSINESS_IMPACT_HEADER);
    let technical_changes = extract_section(reply, TECHNICAL_CHANGES_HEADER);
    let all_found = why.is_some() && business_impact.is_some() && technical_changes.is_some();

    ParsedSections {
        why: why.unwrap_or_else(|| DEFAULT_WHY.to_string()),
        business_impact: business_impact.unwrap_or_else(|| DEFAULT_BUSINESS_IMPACT.to_string()),
        technical_changes: technical_changes
            .unwrap_or_else(|| DEFAULT_TECHNICAL_CHANGES.to_string()),
        all_found,
    }
}

/// Text between `header` and the next known header, trimmed.
/// `None` when the header is absent or the section is blank.
pub fn extract_section(reply: &str, header: &str) -> Option<String> {
    let start = reply.find(header)? + header.len();
    let rest = &reply[start..];
    let end = HEADERS
        .iter()
        .filter_map(|h| rest.find(h))
        .min()
        .unwrap_or(rest.len());

    // Markdown emphasis around headers ("**WHY:**") leaves stray asterisks.
    let text = rest[..end].trim();
    let text = text.strip_prefix("**").unwrap_or(text);
    let text = text.strip_suffix("**").unwrap_or(text).trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}
