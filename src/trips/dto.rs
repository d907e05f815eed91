use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::trips::repo_types::{
    derived_total, CostLine, ItineraryDay, ReportDescriptor, Transcript, Trip, TripStatus,
};

/// `YYYY-MM-DD` (de)serialization for `time::Date` fields.
pub mod iso_date {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::{format_description::FormatItem, macros::format_description, Date};

    const FORMAT: &[FormatItem<'_>] = format_description!("[year]-[month]-[day]");

    pub fn serialize<S: Serializer>(date: &Date, serializer: S) -> Result<S::Ok, S::Error> {
        let text = date.format(FORMAT).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Date, D::Error> {
        let text = String::deserialize(deserializer)?;
        Date::parse(&text, FORMAT).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::FORMAT;
        use serde::{Deserialize, Deserializer, Serializer};
        use time::Date;

        pub fn serialize<S: Serializer>(
            date: &Option<Date>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match date {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Date>, D::Error> {
            let text = Option::<String>::deserialize(deserializer)?;
            text.map(|s| Date::parse(&s, FORMAT).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTripRequest {
    pub title: String,
    pub destination: String,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
    pub party_size: Option<i32>,
    pub status: Option<TripStatus>,
}

/// Partial update of scalar trip fields; absent fields are left untouched.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTripRequest {
    pub title: Option<String>,
    pub destination: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub start_date: Option<Date>,
    #[serde(default, with = "iso_date::option")]
    pub end_date: Option<Date>,
    pub party_size: Option<i32>,
    pub status: Option<TripStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AddCostsRequest {
    pub costs: Vec<CostLine>,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceItineraryRequest {
    pub days: Vec<ItineraryDay>,
}

#[derive(Debug, Serialize)]
pub struct TripSummary {
    pub id: Uuid,
    pub title: String,
    pub destination: String,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
    pub party_size: i32,
    pub status: TripStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<Trip> for TripSummary {
    fn from(trip: Trip) -> Self {
        Self {
            id: trip.id,
            title: trip.title,
            destination: trip.destination,
            start_date: trip.start_date,
            end_date: trip.end_date,
            party_size: trip.party_size,
            status: trip.status,
            created_at: trip.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TripDetails {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub destination: String,
    #[serde(with = "iso_date")]
    pub start_date: Date,
    #[serde(with = "iso_date")]
    pub end_date: Date,
    pub party_size: i32,
    pub status: TripStatus,
    pub is_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none", with = "time::serde::rfc3339::option")]
    pub deleted_at: Option<OffsetDateTime>,
    pub itinerary: Vec<ItineraryDay>,
    pub costs: Vec<CostLine>,
    /// Always derived at read time, never persisted.
    pub total_cost: f64,
    pub reports: Vec<ReportDescriptor>,
    pub conversations: Vec<Transcript>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<Trip> for TripDetails {
    fn from(trip: Trip) -> Self {
        let total_cost = derived_total(&trip.costs.0);
        Self {
            id: trip.id,
            owner_id: trip.user_id,
            title: trip.title,
            destination: trip.destination,
            start_date: trip.start_date,
            end_date: trip.end_date,
            party_size: trip.party_size,
            status: trip.status,
            is_deleted: trip.is_deleted,
            deleted_at: trip.deleted_at,
            itinerary: trip.itinerary.0,
            costs: trip.costs.0,
            total_cost,
            reports: trip.reports.0,
            conversations: trip.conversations.0,
            created_at: trip.created_at,
            updated_at: trip.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn create_request_parses_iso_dates() {
        let req: CreateTripRequest = serde_json::from_str(
            r#"{"title":"Summer","destination":"Paris",
                "start_date":"2025-06-01","end_date":"2025-06-05","party_size":2}"#,
        )
        .unwrap();
        assert_eq!(req.start_date, date!(2025 - 06 - 01));
        assert_eq!(req.end_date, date!(2025 - 06 - 05));
        assert_eq!(req.party_size, Some(2));
        assert!(req.status.is_none());
    }

    #[test]
    fn update_request_tolerates_missing_fields() {
        let req: UpdateTripRequest = serde_json::from_str(r#"{"status":"ongoing"}"#).unwrap();
        assert!(req.title.is_none());
        assert!(req.start_date.is_none());
        assert_eq!(req.status, Some(TripStatus::Ongoing));
    }

    #[test]
    fn summary_dates_serialize_as_iso() {
        let summary = TripSummary {
            id: Uuid::new_v4(),
            title: "T".into(),
            destination: "Rome".into(),
            start_date: date!(2025 - 09 - 10),
            end_date: date!(2025 - 09 - 14),
            party_size: 1,
            status: TripStatus::Planned,
            created_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["start_date"], "2025-09-10");
        assert_eq!(json["status"], "planned");
    }
}
