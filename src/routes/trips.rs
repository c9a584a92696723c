use askama::Template;
use askama_axum::IntoResponse as AskamaTemplateResponse;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use axum_extra::extract::Form;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{
        child::Child,
        trip::{calculate_totals, current_month, Trip, TripInput, TripReason, TRIP_REASONS},
    },
    services::export::{self, EXPORT_FILENAME},
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard).post(create))
        .route("/export.csv", get(export_csv))
        .route("/:id/edit", get(edit_form))
        .route("/:id", post(update))
        .route("/:id/delete", post(delete))
}

/// Query-string filters for the dashboard and the CSV export. Checkbox
/// params are present-or-absent, as browsers send them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripFilter {
    month: Option<String>,
    all_months: Option<String>,
    child: Option<String>,
    shared_only: Option<String>,
}

impl TripFilter {
    fn month_value(&self) -> String {
        self.month
            .clone()
            .filter(|month| !month.is_empty())
            .unwrap_or_else(current_month)
    }

    fn all_months(&self) -> bool {
        self.all_months.is_some()
    }

    fn shared_only(&self) -> bool {
        self.shared_only.is_some()
    }

    fn child_filter(&self) -> Option<&str> {
        self.child
            .as_deref()
            .filter(|child| !child.is_empty() && *child != "all")
    }

    fn apply(&self, trips: Vec<Trip>) -> Vec<Trip> {
        let month = self.month_value();
        trips
            .into_iter()
            .filter(|trip| self.all_months() || trip.month() == month)
            .filter(|trip| {
                self.child_filter()
                    .map_or(true, |child| trip.child_ids.iter().any(|id| id == child))
            })
            .filter(|trip| !self.shared_only() || trip.child_ids.len() >= 2)
            .collect()
    }
}

#[derive(Clone)]
struct ReasonOption {
    value: &'static str,
    label: &'static str,
    selected: bool,
}

fn reason_options(selected: TripReason) -> Vec<ReasonOption> {
    TRIP_REASONS
        .into_iter()
        .map(|reason| ReasonOption {
            value: reason.as_str(),
            label: reason.label(),
            selected: reason == selected,
        })
        .collect()
}

#[derive(Clone)]
struct ChildOption {
    id: String,
    nickname: String,
    selected: bool,
}

fn child_options(children: &[Child], selected: &[String]) -> Vec<ChildOption> {
    children
        .iter()
        .map(|child| ChildOption {
            id: child.id.clone(),
            nickname: child.nickname.clone(),
            selected: selected.contains(&child.id),
        })
        .collect()
}

#[derive(Clone)]
struct TripRowView {
    id: String,
    date: String,
    reason: &'static str,
    destination: String,
    address: String,
    one_way: String,
    trip_kind: &'static str,
    total: String,
    children: String,
    notes: String,
}

fn trip_row(trip: &Trip, children: &[Child]) -> TripRowView {
    let names = trip
        .child_ids
        .iter()
        .map(|child_id| {
            children
                .iter()
                .find(|child| &child.id == child_id)
                .map(|child| child.nickname.clone())
                .unwrap_or_else(|| child_id.clone())
        })
        .collect::<Vec<_>>()
        .join(", ");
    TripRowView {
        id: trip.id.clone(),
        date: trip.date.format("%Y-%m-%d").to_string(),
        reason: trip.reason.label(),
        destination: trip.destination_name.clone(),
        address: trip.destination_address.clone().unwrap_or_default(),
        one_way: format!("{}", trip.one_way_miles),
        trip_kind: if trip.round_trip { "round trip" } else { "one way" },
        total: format!("{:.1}", trip.total_miles()),
        children: names,
        notes: trip.notes.clone().unwrap_or_default(),
    }
}

#[derive(Template)]
#[template(path = "trips/dashboard.html")]
struct DashboardTemplate {
    username: String,
    total_trips: usize,
    total_miles: String,
    month_miles: String,
    month: String,
    all_months: bool,
    child_filter: String,
    shared_only: bool,
    filter_children: Vec<ChildOption>,
    form_children: Vec<ChildOption>,
    reasons: Vec<ReasonOption>,
    today: String,
    trips: Vec<TripRowView>,
    has_trips: bool,
}

async fn dashboard(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<TripFilter>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let trips = load_trips(&state, &user.uuid).await?;
    let children = state.children.list(&user.uuid).await?;

    let filtered = filter.apply(trips);
    let totals = calculate_totals(&filtered);
    let rows = filtered
        .iter()
        .map(|trip| trip_row(trip, &children))
        .collect::<Vec<_>>();

    Ok(AskamaTemplateResponse::into_response(DashboardTemplate {
        username: user.username.clone(),
        total_trips: totals.total_trips,
        total_miles: format!("{:.1}", totals.total_miles),
        month_miles: format!("{:.1}", totals.month_miles),
        month: filter.month_value(),
        all_months: filter.all_months(),
        child_filter: filter.child_filter().unwrap_or("all").to_owned(),
        shared_only: filter.shared_only(),
        filter_children: child_options(&children, &[]),
        form_children: child_options(&children, &[]),
        reasons: reason_options(TripReason::Visit),
        today: Utc::now().date_naive().format("%Y-%m-%d").to_string(),
        has_trips: !rows.is_empty(),
        trips: rows,
    }))
}

#[derive(Deserialize)]
struct TripForm {
    date: NaiveDate,
    reason: String,
    destination_name: String,
    destination_address: Option<String>,
    one_way_miles: f64,
    round_trip: Option<String>,
    notes: Option<String>,
    #[serde(default)]
    child_ids: Vec<String>,
}

impl TripForm {
    fn into_parts(self) -> Result<(TripInput, Vec<String>), AppError> {
        let reason = TripReason::parse(&self.reason)
            .ok_or_else(|| AppError::Validation(format!("unknown reason: {}", self.reason)))?;
        let input = TripInput {
            date: self.date,
            reason,
            destination_name: self.destination_name.trim().to_owned(),
            destination_address: normalize_optional(self.destination_address),
            one_way_miles: self.one_way_miles,
            round_trip: self.round_trip.is_some(),
            notes: normalize_optional(self.notes),
        };
        input.validate()?;
        Ok((input, self.child_ids))
    }
}

async fn create(
    State(state): State<AppState>,
    current: CurrentUser,
    Form(form): Form<TripForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let (input, child_ids) = form.into_parts()?;

    let created = state.trips.create(&user.uuid, &input).await?;
    if let Err(err) = state.trip_children.set(&created.id, &child_ids).await {
        // A trip without its recorded children is worse than no trip;
        // undo the insert before surfacing the error.
        if let Err(cleanup_err) = state.trips.delete(&user.uuid, &created.id).await {
            warn!("could not remove orphaned trip {}: {cleanup_err}", created.id);
        }
        return Err(err);
    }
    Ok(Redirect::to("/trips"))
}

#[derive(Template)]
#[template(path = "trips/edit.html")]
struct EditTripTemplate {
    trip_id: String,
    date: String,
    destination_name: String,
    destination_address: String,
    one_way_miles: String,
    round_trip: bool,
    notes: String,
    reasons: Vec<ReasonOption>,
    form_children: Vec<ChildOption>,
}

async fn edit_form(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = current.require_user()?;
    let mut trip = state.trips.get(&user.uuid, &trip_id).await?;
    let links = state.trip_children.list(std::slice::from_ref(&trip.id)).await?;
    trip.child_ids = links.get(&trip.id).cloned().unwrap_or_default();
    let children = state.children.list(&user.uuid).await?;

    Ok(AskamaTemplateResponse::into_response(EditTripTemplate {
        trip_id: trip.id.clone(),
        date: trip.date.format("%Y-%m-%d").to_string(),
        destination_name: trip.destination_name.clone(),
        destination_address: trip.destination_address.clone().unwrap_or_default(),
        one_way_miles: format!("{}", trip.one_way_miles),
        round_trip: trip.round_trip,
        notes: trip.notes.clone().unwrap_or_default(),
        reasons: reason_options(trip.reason),
        form_children: child_options(&children, &trip.child_ids),
    }))
}

async fn update(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
    Form(form): Form<TripForm>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    let (input, child_ids) = form.into_parts()?;
    let saved = state.trips.update(&user.uuid, &trip_id, &input).await?;
    state.trip_children.set(&saved.id, &child_ids).await?;
    Ok(Redirect::to("/trips"))
}

async fn delete(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(trip_id): Path<String>,
) -> Result<Redirect, AppError> {
    let user = current.require_user()?;
    state.trip_children.set(&trip_id, &[]).await?;
    state.trips.delete(&user.uuid, &trip_id).await?;
    Ok(Redirect::to("/trips"))
}

async fn export_csv(
    State(state): State<AppState>,
    current: CurrentUser,
    Query(filter): Query<TripFilter>,
) -> Result<Response, AppError> {
    let user = current.require_user()?;
    let trips = load_trips(&state, &user.uuid).await?;
    let children = state.children.list(&user.uuid).await?;
    let body = export::trips_csv(&filter.apply(trips), &children);
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{EXPORT_FILENAME}\""),
            ),
        ],
        body,
    )
        .into_response())
}

/// Trips hydrated with their child links; absent links become empty sets.
async fn load_trips(state: &AppState, user_uuid: &str) -> Result<Vec<Trip>, AppError> {
    let trips = state.trips.list(user_uuid).await?;
    let trip_ids: Vec<String> = trips.iter().map(|trip| trip.id.clone()).collect();
    let mut links = state.trip_children.list(&trip_ids).await?;
    Ok(trips
        .into_iter()
        .map(|mut trip| {
            trip.child_ids = links.remove(&trip.id).unwrap_or_default();
            trip
        })
        .collect())
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input.and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn trip(date: &str, child_ids: &[&str]) -> Trip {
        Trip {
            id: format!("t-{date}"),
            date: date.parse().expect("test date"),
            reason: TripReason::Visit,
            destination_name: "School".into(),
            destination_address: None,
            one_way_miles: 4.0,
            round_trip: false,
            notes: None,
            created_at: Utc::now(),
            child_ids: child_ids.iter().map(|id| id.to_string()).collect(),
        }
    }

    #[test]
    fn month_filter_keeps_only_the_selected_month() {
        let filter = TripFilter {
            month: Some("2024-03".into()),
            ..TripFilter::default()
        };
        let kept = filter.apply(vec![trip("2024-03-05", &[]), trip("2024-04-05", &[])]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].month(), "2024-03");
    }

    #[test]
    fn all_months_overrides_the_month_filter() {
        let filter = TripFilter {
            month: Some("2024-03".into()),
            all_months: Some("on".into()),
            ..TripFilter::default()
        };
        let kept = filter.apply(vec![trip("2024-03-05", &[]), trip("2024-04-05", &[])]);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn child_filter_matches_the_trip_links() {
        let filter = TripFilter {
            all_months: Some("on".into()),
            child: Some("c-1".into()),
            ..TripFilter::default()
        };
        let kept = filter.apply(vec![
            trip("2024-03-05", &["c-1", "c-2"]),
            trip("2024-03-06", &["c-2"]),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "t-2024-03-05");
    }

    #[test]
    fn shared_only_needs_at_least_two_children() {
        let filter = TripFilter {
            all_months: Some("on".into()),
            shared_only: Some("on".into()),
            ..TripFilter::default()
        };
        let kept = filter.apply(vec![
            trip("2024-03-05", &["c-1", "c-2"]),
            trip("2024-03-06", &["c-1"]),
            trip("2024-03-07", &[]),
        ]);
        assert_eq!(kept.len(), 1);
    }

    #[test]
    fn a_child_value_of_all_means_no_child_filter() {
        let filter = TripFilter {
            all_months: Some("on".into()),
            child: Some("all".into()),
            ..TripFilter::default()
        };
        let kept = filter.apply(vec![trip("2024-03-05", &[]), trip("2024-03-06", &["c-1"])]);
        assert_eq!(kept.len(), 2);
    }
}
