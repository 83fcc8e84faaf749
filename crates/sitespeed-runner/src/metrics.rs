//! Standardized per-page metrics
//!
//! The external tool writes one `data/` directory per analyzed page. This
//! module extracts a fixed set of browsertime, coach and lighthouse metrics
//! from those files and averages them across pages. Missing files or fields
//! simply yield absent metrics.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Browsertime timing medians, in milliseconds
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowsertimeMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fully_loaded: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_contentful_paint: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_contentful_paint: Option<f64>,
}

/// Coach advice scores (0-100)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_practice: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub privacy: Option<f64>,

    /// Technology stack detected by coach, passed through as-is
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technology: Option<Value>,
}

/// Lighthouse category scores (scaled to 0-100) and timing audits
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LighthouseScores {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seo: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_practices: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessibility: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub fully_loaded: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_contentful_paint: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub largest_contentful_paint: Option<f64>,
}

/// Metrics for one analyzed page
#[derive(Debug, Clone, Serialize)]
pub struct PageMetrics {
    /// Page directory name (the page's host/path slug)
    pub page: String,

    pub browsertime: BrowsertimeMetrics,
    pub coach: CoachScores,
    pub lighthouse: LighthouseScores,
}

/// Averages across all analyzed pages
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateMetrics {
    pub pages_count: usize,
    pub browsertime: BrowsertimeMetrics,
    pub coach: CoachScores,
    pub lighthouse: LighthouseScores,
}

/// All page directories of a scan, sorted. A page directory is any directory
/// under `pages/` that contains a `data/` child; depth varies with the page's
/// URL path.
pub fn page_directories(report_dir: &Path) -> Vec<PathBuf> {
    let pages_dir = report_dir.join("pages");
    let mut found = Vec::new();
    collect_data_parents(&pages_dir, &mut found);
    found.sort();
    found
}

fn collect_data_parents(dir: &Path, found: &mut Vec<PathBuf>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some("data") {
            found.push(dir.to_path_buf());
        } else {
            collect_data_parents(&path, found);
        }
    }
}

/// Extract the standardized metrics for one page directory
pub fn parse_page_metrics(page_dir: &Path) -> PageMetrics {
    let page = page_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string();

    let browsertime = read_data_json(page_dir, "browsertime.pageSummary.json")
        .map(|data| BrowsertimeMetrics {
            fully_loaded: pointer_f64(&data, "/statistics/timings/fullyLoaded/median"),
            first_contentful_paint: pointer_f64(
                &data,
                "/statistics/timings/paintTiming/first-contentful-paint/median",
            )
            .or_else(|| pointer_f64(&data, "/statistics/timings/firstPaint/median")),
            largest_contentful_paint: pointer_f64(
                &data,
                "/statistics/timings/largestContentfulPaint/renderTime/median",
            )
            .or_else(|| pointer_f64(&data, "/statistics/timings/largestContentfulPaint/median")),
        })
        .unwrap_or(BrowsertimeMetrics {
            fully_loaded: None,
            first_contentful_paint: None,
            largest_contentful_paint: None,
        });

    let coach = read_data_json(page_dir, "coach.pageSummary.json")
        .map(|data| CoachScores {
            score: pointer_f64(&data, "/advice/score"),
            performance: pointer_f64(&data, "/advice/performance/score"),
            accessibility: pointer_f64(&data, "/advice/accessibility/score"),
            best_practice: pointer_f64(&data, "/advice/bestpractice/score"),
            privacy: pointer_f64(&data, "/advice/privacy/score"),
            technology: data.pointer("/advice/info/technology").cloned(),
        })
        .unwrap_or(CoachScores {
            score: None,
            performance: None,
            accessibility: None,
            best_practice: None,
            privacy: None,
            technology: None,
        });

    let lighthouse = read_data_json(page_dir, "lighthouse.pageSummary.json")
        .map(|data| LighthouseScores {
            performance: pointer_f64(&data, "/categories/performance/score").map(|s| s * 100.0),
            seo: pointer_f64(&data, "/categories/seo/score").map(|s| s * 100.0),
            best_practices: pointer_f64(&data, "/categories/best-practices/score")
                .map(|s| s * 100.0),
            accessibility: pointer_f64(&data, "/categories/accessibility/score")
                .map(|s| s * 100.0),
            // Interactive time stands in for fully loaded
            fully_loaded: pointer_f64(&data, "/audits/interactive/numericValue"),
            first_contentful_paint: pointer_f64(
                &data,
                "/audits/first-contentful-paint/numericValue",
            ),
            largest_contentful_paint: pointer_f64(
                &data,
                "/audits/largest-contentful-paint/numericValue",
            ),
        })
        .unwrap_or(LighthouseScores {
            performance: None,
            seo: None,
            best_practices: None,
            accessibility: None,
            fully_loaded: None,
            first_contentful_paint: None,
            largest_contentful_paint: None,
        });

    PageMetrics {
        page,
        browsertime,
        coach,
        lighthouse,
    }
}

/// Average the standardized metrics across pages. Returns None for an empty
/// page set.
pub fn aggregate(pages: &[PageMetrics]) -> Option<AggregateMetrics> {
    if pages.is_empty() {
        return None;
    }

    Some(AggregateMetrics {
        pages_count: pages.len(),
        browsertime: BrowsertimeMetrics {
            fully_loaded: avg(pages.iter().map(|p| p.browsertime.fully_loaded)),
            first_contentful_paint: avg(pages.iter().map(|p| p.browsertime.first_contentful_paint)),
            largest_contentful_paint: avg(
                pages.iter().map(|p| p.browsertime.largest_contentful_paint),
            ),
        },
        coach: CoachScores {
            score: avg(pages.iter().map(|p| p.coach.score)),
            performance: avg(pages.iter().map(|p| p.coach.performance)),
            accessibility: avg(pages.iter().map(|p| p.coach.accessibility)),
            best_practice: avg(pages.iter().map(|p| p.coach.best_practice)),
            privacy: avg(pages.iter().map(|p| p.coach.privacy)),
            technology: None,
        },
        lighthouse: LighthouseScores {
            performance: avg(pages.iter().map(|p| p.lighthouse.performance)),
            seo: avg(pages.iter().map(|p| p.lighthouse.seo)),
            best_practices: avg(pages.iter().map(|p| p.lighthouse.best_practices)),
            accessibility: avg(pages.iter().map(|p| p.lighthouse.accessibility)),
            fully_loaded: avg(pages.iter().map(|p| p.lighthouse.fully_loaded)),
            first_contentful_paint: avg(pages.iter().map(|p| p.lighthouse.first_contentful_paint)),
            largest_contentful_paint: avg(
                pages.iter().map(|p| p.lighthouse.largest_contentful_paint),
            ),
        },
    })
}

/// Mean of the present values, rounded to two decimals; None if all absent
fn avg(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = values.flatten().collect();
    if present.is_empty() {
        return None;
    }
    let mean = present.iter().sum::<f64>() / present.len() as f64;
    Some((mean * 100.0).round() / 100.0)
}

pub(crate) fn read_data_json(page_dir: &Path, name: &str) -> Option<Value> {
    let path = page_dir.join("data").join(name);
    if !path.is_file() {
        return None;
    }
    let content = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Could not parse {}: {}", path.display(), e);
            None
        }
    }
}

fn pointer_f64(data: &Value, pointer: &str) -> Option<f64> {
    data.pointer(pointer).and_then(Value::as_f64)
}
