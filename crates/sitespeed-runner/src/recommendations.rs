//! Aggregated improvement advice
//!
//! Coach and lighthouse both grade individual rules per page. This module
//! collects every rule that scored below its tool's "fine" threshold,
//! merges duplicates across pages (keeping the worst score seen) and sorts
//! the result ascending so the worst issues come first.

use crate::metrics;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

/// Severity tier derived from a 0-100 score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    fn from_score(score: f64) -> Self {
        if score < 50.0 {
            Severity::Error
        } else if score < 90.0 {
            Severity::Warning
        } else {
            Severity::Info
        }
    }
}

/// Which tool produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Coach,
    Lighthouse,
}

/// One failing rule, merged across all pages that triggered it
#[derive(Debug, Clone, Serialize)]
pub struct Recommendation {
    /// Rule or audit id as reported by the tool
    pub id: String,

    pub source: Source,

    pub category: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Worst score seen across pages, on a 0-100 scale
    pub score: f64,

    pub severity: Severity,

    /// Page directory names where the rule fired
    pub pages: Vec<String>,
}

const COACH_CATEGORIES: [&str; 4] = ["performance", "accessibility", "bestpractice", "privacy"];

/// Collect and merge all coach and lighthouse findings under `report_dir`
pub fn collect(report_dir: &Path) -> Vec<Recommendation> {
    let mut map: HashMap<(Source, String), Recommendation> = HashMap::new();

    for page_dir in metrics::page_directories(report_dir) {
        let page = page_dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        if let Some(data) = metrics::read_data_json(&page_dir, "coach.pageSummary.json") {
            collect_coach(&mut map, &data, &page);
        }
        if let Some(data) = metrics::read_data_json(&page_dir, "lighthouse.pageSummary.json") {
            collect_lighthouse(&mut map, &data, &page);
        }
    }

    let mut recommendations: Vec<Recommendation> = map.into_values().collect();
    // Worst issues first; id as tie-break for a stable listing
    recommendations.sort_by(|a, b| {
        a.score
            .partial_cmp(&b.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    recommendations
}

/// Coach scores rules 0-100; anything below 100 is advice worth surfacing
fn collect_coach(map: &mut HashMap<(Source, String), Recommendation>, data: &Value, page: &str) {
    for category in COACH_CATEGORIES {
        let advice_list = match data
            .pointer(&format!("/advice/{}/adviceList", category))
            .and_then(Value::as_object)
        {
            Some(list) => list,
            None => continue,
        };

        for (rule_id, rule) in advice_list {
            let score = match rule.get("score").and_then(Value::as_f64) {
                Some(score) => score,
                None => continue,
            };
            if score < 100.0 {
                upsert(map, Source::Coach, rule_id, category, rule, score, page);
            }
        }
    }
}

/// Lighthouse audits score 0-1; null means not applicable, and anything at
/// or above 0.9 passes. Scores are served on the 0-100 scale.
fn collect_lighthouse(
    map: &mut HashMap<(Source, String), Recommendation>,
    data: &Value,
    page: &str,
) {
    let audits = match data.get("audits").and_then(Value::as_object) {
        Some(audits) => audits,
        None => return,
    };

    for (audit_id, audit) in audits {
        let score = match audit.get("score").and_then(Value::as_f64) {
            Some(score) => score,
            None => continue,
        };
        if score < 0.9 {
            let scaled = (score * 100.0).trunc();
            upsert(
                map,
                Source::Lighthouse,
                audit_id,
                lighthouse_category(audit_id),
                audit,
                scaled,
                page,
            );
        }
    }
}

fn upsert(
    map: &mut HashMap<(Source, String), Recommendation>,
    source: Source,
    id: &str,
    category: &str,
    rule: &Value,
    score: f64,
    page: &str,
) {
    let entry = map
        .entry((source, id.to_string()))
        .or_insert_with(|| Recommendation {
            id: id.to_string(),
            source,
            category: category.to_string(),
            title: rule.get("title").and_then(Value::as_str).map(String::from),
            description: rule
                .get("description")
                .and_then(Value::as_str)
                .map(String::from),
            score,
            severity: Severity::from_score(score),
            pages: Vec::new(),
        });

    if !entry.pages.iter().any(|p| p == page) {
        entry.pages.push(page.to_string());
    }

    // Keep the worst score found across pages
    if score < entry.score {
        entry.score = score;
        entry.severity = Severity::from_score(score);
    }
}

/// Category of a lighthouse audit id. Audits not in the fixed set (custom
/// plugins, future lighthouse versions) land in "other".
fn lighthouse_category(audit_id: &str) -> &'static str {
    match audit_id {
        "first-contentful-paint"
        | "largest-contentful-paint"
        | "total-blocking-time"
        | "cumulative-layout-shift"
        | "speed-index"
        | "interactive"
        | "max-potential-fid"
        | "server-response-time"
        | "render-blocking-resources"
        | "unused-css-rules"
        | "unused-javascript"
        | "modern-image-formats"
        | "uses-responsive-images"
        | "efficient-animated-content"
        | "duplicated-javascript"
        | "legacy-javascript"
        | "dom-size"
        | "total-byte-weight"
        | "offscreen-images"
        | "unminified-css"
        | "unminified-javascript"
        | "uses-optimized-images"
        | "uses-text-compression"
        | "uses-rel-preconnect"
        | "redirects"
        | "uses-http2"
        | "unsized-images"
        | "mainthread-work-breakdown"
        | "font-display-insight"
        | "forced-reflow-insight"
        | "image-delivery-insight"
        | "lcp-breakdown-insight"
        | "lcp-discovery-insight"
        | "network-dependency-tree-insight"
        | "render-blocking-insight"
        | "cache-insight"
        | "legacy-javascript-insight" => "performance",

        "target-size"
        | "color-contrast"
        | "image-alt"
        | "button-name"
        | "link-name"
        | "aria-allowed-attr"
        | "aria-hidden-body"
        | "aria-hidden-focus"
        | "aria-input-field-name"
        | "aria-required-attr"
        | "aria-roles"
        | "aria-valid-attr"
        | "aria-valid-attr-value"
        | "document-title"
        | "html-has-lang"
        | "html-lang-valid"
        | "label"
        | "meta-viewport" => "accessibility",

        "is-on-https"
        | "external-anchors-use-rel-noopener"
        | "geolocation-on-start"
        | "notification-on-start"
        | "no-vulnerable-libraries"
        | "image-size-responsive"
        | "doctype"
        | "charset"
        | "inspector-issues"
        | "js-libraries"
        | "deprecations"
        | "password-inputs-can-be-pasted-into" => "best-practices",

        "viewport"
        | "meta-description"
        | "http-status-code"
        | "link-text"
        | "crawlable-anchors"
        | "is-crawlable"
        | "robots-txt"
        | "canonical"
        | "hreflang"
        | "font-size"
        | "plugins"
        | "tap-targets" => "seo",

        _ => "other",
    }
}
