use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::async_trait;
use tracing::{debug, error};
use uuid::Uuid;

use crate::error::ApiError;
use crate::trips::repo_types::{derived_total, Trip};

/// Opaque HTML-to-PDF collaborator. The store only ever records metadata;
/// the binary artifact stays behind this seam.
#[async_trait]
pub trait ReportRenderer: Send + Sync {
    async fn render_pdf(&self, html: &str, output: &Path) -> Result<(), ApiError>;
}

/// Renders through a headless browser binary, bounded by an explicit timeout.
pub struct HeadlessRenderer {
    bin: String,
    timeout: Duration,
}

impl HeadlessRenderer {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ReportRenderer for HeadlessRenderer {
    async fn render_pdf(&self, html: &str, output: &Path) -> Result<(), ApiError> {
        let source = std::env::temp_dir().join(format!("travelmate-{}.html", Uuid::new_v4()));
        tokio::fs::write(&source, html)
            .await
            .map_err(|e| ApiError::Upstream(format!("write render input: {e}")))?;

        let run = tokio::process::Command::new(&self.bin)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(format!("file://{}", source.display()))
            .output();

        let result = tokio::time::timeout(self.timeout, run).await;
        if let Err(e) = tokio::fs::remove_file(&source).await {
            debug!(error = %e, "temp html cleanup failed");
        }

        match result {
            Err(_) => Err(ApiError::UpstreamTimeout),
            Ok(Err(e)) => Err(ApiError::Upstream(format!("renderer spawn: {e}"))),
            Ok(Ok(out)) if !out.status.success() => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                error!(status = ?out.status, %stderr, "pdf renderer failed");
                Err(ApiError::Upstream("pdf renderer failed".into()))
            }
            Ok(Ok(_)) => Ok(()),
        }
    }
}

pub fn report_file_name(trip_id: Uuid) -> String {
    format!("{trip_id}-{}.pdf", Uuid::new_v4())
}

pub fn report_path(reports_dir: &str, file: &str) -> PathBuf {
    Path::new(reports_dir).join(file)
}

/// String-templated report body handed to the renderer.
pub fn trip_report_html(trip: &Trip) -> String {
    let mut itinerary = String::new();
    for day in &trip.itinerary.0 {
        itinerary.push_str(&format!("<h3>Day {}</h3><ul>", day.day_number));
        for activity in &day.activities {
            itinerary.push_str(&format!(
                "<li>{} ({}){}</li>",
                escape(&activity.title),
                escape(&activity.category),
                activity
                    .location
                    .as_deref()
                    .map(|l| format!(" — {}", escape(l)))
                    .unwrap_or_default(),
            ));
        }
        itinerary.push_str("</ul>");
    }

    let mut costs = String::new();
    for line in &trip.costs.0 {
        costs.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{} {:.2}</td><td>{}</td><td>{} {:.2}</td></tr>",
            escape(&line.kind),
            escape(&line.label),
            escape(&line.currency),
            line.amount,
            line.quantity,
            escape(&line.currency),
            line.amount * line.quantity,
        ));
    }

    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><h1>{title}</h1>\
         <p>{destination}, {start} to {end}, party of {party}</p>\
         <h2>Itinerary</h2>{itinerary}\
         <h2>Costs</h2><table><thead><tr><th>Type</th><th>Label</th><th>Unit</th>\
         <th>Qty</th><th>Total</th></tr></thead><tbody>{costs}</tbody></table>\
         <p>Total: {total:.2}</p></body></html>",
        title = escape(&trip.title),
        destination = escape(&trip.destination),
        start = trip.start_date,
        end = trip.end_date,
        party = trip.party_size,
        itinerary = itinerary,
        costs = costs,
        total = derived_total(&trip.costs.0),
    )
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use time::{macros::date, OffsetDateTime};

    use crate::trips::repo_types::{Activity, CostLine, ItineraryDay, TripStatus};

    fn sample_trip() -> Trip {
        Trip {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Paris & Beyond".into(),
            destination: "Paris".into(),
            start_date: date!(2025 - 06 - 01),
            end_date: date!(2025 - 06 - 05),
            party_size: 2,
            status: TripStatus::Planned,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            itinerary: Json(vec![ItineraryDay {
                day_number: 1,
                activities: vec![Activity {
                    title: "Eiffel <Tower>".into(),
                    category: "sightseeing".into(),
                    start_time: None,
                    end_time: None,
                    location: Some("Champ de Mars".into()),
                }],
            }]),
            costs: Json(vec![CostLine {
                kind: "lodging".into(),
                label: "Hotel".into(),
                currency: "USD".into(),
                amount: 100.0,
                quantity: 4.0,
            }]),
            reports: Json(vec![]),
            conversations: Json(vec![]),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn report_html_escapes_and_totals() {
        let html = trip_report_html(&sample_trip());
        assert!(html.contains("Paris &amp; Beyond"));
        assert!(html.contains("Eiffel &lt;Tower&gt;"));
        assert!(html.contains("Total: 400.00"));
        assert!(!html.contains("<Tower>"));
    }

    #[test]
    fn file_names_are_unique_per_call() {
        let id = Uuid::new_v4();
        let a = report_file_name(id);
        let b = report_file_name(id);
        assert!(a.starts_with(&id.to_string()));
        assert!(a.ends_with(".pdf"));
        assert_ne!(a, b);
    }

    #[test]
    fn report_path_joins_dir_and_file() {
        let p = report_path("/var/reports", "x.pdf");
        assert_eq!(p, std::path::Path::new("/var/reports/x.pdf"));
    }
}
