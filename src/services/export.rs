//! Renders a trip list as the reimbursement CSV. Every data field is
//! double-quoted with internal quotes doubled, so destinations like
//! `Sam's "clinic"` survive a standard CSV parser.

use crate::models::{child::Child, trip::Trip};

const HEADERS: &str =
    "date,reason,destinationName,destinationAddress,oneWayMiles,roundTrip,totalMiles,notes,children";

pub const EXPORT_FILENAME: &str = "mileage-trips.csv";

pub fn trips_csv(trips: &[Trip], children: &[Child]) -> String {
    let mut lines = Vec::with_capacity(trips.len() + 1);
    lines.push(HEADERS.to_string());
    for trip in trips {
        let fields = [
            trip.date.format("%Y-%m-%d").to_string(),
            trip.reason.as_str().to_string(),
            trip.destination_name.clone(),
            trip.destination_address.clone().unwrap_or_default(),
            trip.one_way_miles.to_string(),
            trip.round_trip.to_string(),
            trip.total_miles().to_string(),
            trip.notes.clone().unwrap_or_default(),
            children_column(trip, children),
        ];
        lines.push(
            fields
                .iter()
                .map(|field| quote(field))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

/// Nicknames resolved from the trip's child ids; an id with no matching
/// child stays in the output as-is.
fn children_column(trip: &Trip, children: &[Child]) -> String {
    trip.child_ids
        .iter()
        .map(|child_id| {
            children
                .iter()
                .find(|child| &child.id == child_id)
                .map(|child| child.nickname.clone())
                .unwrap_or_else(|| child_id.clone())
        })
        .collect::<Vec<_>>()
        .join("; ")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
