use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "trip_status", rename_all = "lowercase")]
pub enum TripStatus {
    Planned,
    Ongoing,
    Completed,
    Cancelled,
}

/// One activity inside an itinerary day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub title: String,
    pub category: String,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// Day numbers are caller-supplied and deliberately not re-validated for
/// uniqueness or contiguity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItineraryDay {
    pub day_number: i32,
    pub activities: Vec<Activity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostLine {
    pub kind: String,
    pub label: String,
    pub currency: String,
    pub amount: f64,
    pub quantity: f64,
}

/// Line totals are never stored; the only source of truth is this derivation.
pub fn derived_total(costs: &[CostLine]) -> f64 {
    costs.iter().map(|c| c.amount * c.quantity).sum()
}

/// Metadata of a generated PDF artifact. The binary itself lives on disk
/// under the configured reports directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDescriptor {
    pub file: String,
    pub format: String,
    #[serde(with = "time::serde::rfc3339")]
    pub generated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub question: String,
    pub answer: String,
    #[serde(with = "time::serde::rfc3339")]
    pub at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct Trip {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub destination: String,
    pub start_date: Date,
    pub end_date: Date,
    pub party_size: i32,
    pub status: TripStatus,
    pub is_deleted: bool,
    pub deleted_by: Option<Uuid>,
    pub deleted_at: Option<OffsetDateTime>,
    pub itinerary: Json<Vec<ItineraryDay>>,
    pub costs: Json<Vec<CostLine>>,
    pub reports: Json<Vec<ReportDescriptor>>,
    pub conversations: Json<Vec<Transcript>>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(amount: f64, quantity: f64) -> CostLine {
        CostLine {
            kind: "lodging".into(),
            label: "Hotel".into(),
            currency: "USD".into(),
            amount,
            quantity,
        }
    }

    #[test]
    fn total_is_amount_times_quantity_summed() {
        let costs = vec![line(100.0, 4.0), line(25.5, 2.0)];
        assert_eq!(derived_total(&costs), 451.0);
    }

    #[test]
    fn total_of_empty_list_is_zero() {
        assert_eq!(derived_total(&[]), 0.0);
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_value(TripStatus::Planned).unwrap(),
            serde_json::json!("planned")
        );
        let parsed: TripStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, TripStatus::Cancelled);
    }

    #[test]
    fn itinerary_day_roundtrips_through_json() {
        let day = ItineraryDay {
            day_number: 2,
            activities: vec![Activity {
                title: "Louvre".into(),
                category: "museum".into(),
                start_time: Some("09:00".into()),
                end_time: Some("12:00".into()),
                location: Some("Paris".into()),
            }],
        };
        let value = serde_json::to_value(&day).unwrap();
        let back: ItineraryDay = serde_json::from_value(value).unwrap();
        assert_eq!(back, day);
    }
}
