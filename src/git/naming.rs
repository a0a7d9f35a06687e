//! Deterministic names derived from a candidate id.
//!
//! The branch, the label and the PR title are pure functions of the id so
//! that a later run can find the work of an earlier one without any stored
//! state.

pub const LABEL_PREFIX: &str = "vuln-id:";
pub const LABEL_DESCRIPTION: &str = "Vulnerability remediated by vulnfix";
pub const LABEL_COLOR: &str = "ff0000";
pub const BRANCH_PREFIX: &str = "vulnfix/";

const MAX_TITLE_LEN: usize = 50;
const MAX_LABEL_LEN: usize = 50;
const MAX_BRANCH_ID_LEN: usize = 64;

/// Label attached to every PR for a candidate; also the dedup key.
///
/// GitHub rejects labels longer than 50 characters, so long ids are cut and
/// suffixed with a hash of the full id.
pub fn label_for(id: &str) -> String {
    let label = format!("{}{}", LABEL_PREFIX, id);
    if label.chars().count() <= MAX_LABEL_LEN {
        return label;
    }
    let keep = MAX_LABEL_LEN - LABEL_PREFIX.len() - 9;
    let head: String = id.chars().take(keep).collect();
    format!("{}{}-{:08x}", LABEL_PREFIX, head, fnv1a32(id.as_bytes()))
}

/// Branch name for a candidate.
///
/// Ids that are already valid ref components are used verbatim. Otherwise the
/// id is sanitized and suffixed with a hash of the raw id, so two ids that
/// sanitize to the same text still get different branches.
pub fn branch_for(id: &str) -> String {
    let sanitized = sanitize_ref_component(id);
    if sanitized == id {
        format!("{}{}", BRANCH_PREFIX, sanitized)
    } else {
        format!("{}{}-{:08x}", BRANCH_PREFIX, sanitized, fnv1a32(id.as_bytes()))
    }
}

pub fn commit_message(title: &str, id: &str) -> String {
    format!("Automated fix attempt for: {} ({})", shorten(title, MAX_TITLE_LEN), id)
}

pub fn pr_title(title: &str) -> String {
    format!("Fix: {}", shorten(title, MAX_TITLE_LEN))
}

/// Feed note recorded once a PR is open.
pub fn pr_note(url: &str) -> String {
    format!("vulnfix opened remediation PR: {}", url)
}

fn sanitize_ref_component(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    let mut last_dash = false;
    for c in id.chars() {
        let keep = c.is_ascii_alphanumeric() || c == '_' || c == '-';
        if keep {
            out.push(c);
            last_dash = c == '-';
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
        if out.len() >= MAX_BRANCH_ID_LEN {
            break;
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "id".to_string()
    } else {
        trimmed.to_string()
    }
}

fn fnv1a32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for b in bytes {
        hash ^= *b as u32;
        hash = hash.wrapping_mul(0x01000193);
    }
    hash
}

fn shorten(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
