//! Markdown and JSON report generation.
//!
//! This module renders the audit report for one run: run metadata, the
//! identity registry with its activity, and anything that was skipped.

use crate::models::{IdentityEntry, Report, ReportMetadata, SkippedKey};
use anyhow::Result;
use std::io::Write;
use std::path::Path;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Uptime Submission Audit\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_identities_section(&report.identities));
    output.push_str(&generate_shared_addresses_section(&report.shared_addresses));
    output.push_str(&generate_skipped_section(&report.skipped));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Network:** {}\n", metadata.network));
    section.push_str(&format!("- **Bucket:** {}\n", metadata.bucket));
    section.push_str(&format!(
        "- **Window:** {} to {} (exclusive)\n",
        metadata.window_start.format("%Y-%m-%d %H:%M:%S UTC"),
        metadata.window_end.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Partitions:** {}\n",
        metadata
            .partitions
            .iter()
            .map(|p| format!("`{}`", p))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    section.push_str(&format!(
        "- **Analysis Date:** {}\n",
        metadata.analysis_date.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Keys Listed:** {}\n", metadata.keys_listed));
    section.push_str(&format!(
        "- **Submissions In Window:** {}\n",
        metadata.submissions_in_window
    ));
    section.push_str(&format!("- **Identities:** {}\n", metadata.identities));
    if metadata.keys_skipped > 0 {
        section.push_str(&format!("- **Keys Skipped:** {}\n", metadata.keys_skipped));
    }
    section.push_str(&format!("- **Failure Policy:** {}\n", metadata.failure_policy));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the identity table.
fn generate_identities_section(entries: &[IdentityEntry]) -> String {
    let mut section = String::new();

    section.push_str("## Identities\n\n");

    if entries.is_empty() {
        section.push_str("No submissions were found in this window.\n\n");
        return section;
    }

    section.push_str("| Public Key | IP | Submissions | First Seen | Last Seen | Id |\n");
    section.push_str("|:---|:---|:---:|:---|:---|:---|\n");

    for entry in entries {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {} | `{}` |\n",
            entry.identity.public_key,
            entry.identity.public_ip,
            entry.activity.submissions,
            entry.activity.first_seen.format("%H:%M:%S"),
            entry.activity.last_seen.format("%H:%M:%S"),
            short_id(&entry.identity.id)
        ));
    }
    section.push('\n');

    section
}

/// Generate the shared-address section.
fn generate_shared_addresses_section(shared: &[(String, usize)]) -> String {
    if shared.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Shared Addresses\n\n");
    section.push_str("Addresses that submitted under more than one public key:\n\n");
    section.push_str("| IP | Public Keys |\n");
    section.push_str("|:---|:---:|\n");

    for (addr, count) in shared {
        section.push_str(&format!("| {} | {} |\n", addr, count));
    }
    section.push('\n');

    section
}

/// Generate the skipped-keys section.
fn generate_skipped_section(skipped: &[SkippedKey]) -> String {
    if skipped.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Skipped Keys\n\n");
    section.push_str("| Key | Kind | Reason |\n");
    section.push_str("|:---|:---|:---|\n");

    for skip in skipped {
        section.push_str(&format!(
            "| `{}` | {} | {} |\n",
            skip.key,
            skip.kind,
            skip.reason.replace('|', "\\|")
        ));
    }
    section.push('\n');

    section
}

fn short_id(id: &str) -> &str {
    id.get(..12).unwrap_or(id)
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by uptime-auditor v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

/// Write a report to a file, in Markdown or JSON.
pub fn write_report(report: &Report, path: &Path, json: bool) -> Result<()> {
    let content = if json {
        generate_json_report(report)?
    } else {
        generate_markdown_report(report)
    };

    let mut file = std::fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
