use std::{fmt, fs::File, net::SocketAddr};

use anyhow::Context;
use chrono::Utc;
use cucumber::{given, then, when, World as _};
use mileage::{
    auth::{self, AuthenticatedUser},
    config::AppConfig,
    db::init_pool,
    models::trip::{Trip, TripInput, TripReason},
    services::export,
    state::AppState,
};
use tempfile::TempDir;

#[derive(Debug, cucumber::World, Default)]
struct AppWorld {
    state: Option<TestState>,
    registered_user: Option<AuthenticatedUser>,
}

impl AppWorld {
    fn app_state(&self) -> &AppState {
        self.state
            .as_ref()
            .expect("state must be initialised first")
            .app()
    }

    fn user(&self) -> &AuthenticatedUser {
        self.registered_user
            .as_ref()
            .expect("a registered user is required for this step")
    }
}

struct TestState {
    app: AppState,
    _root: TempDir,
}

impl fmt::Debug for TestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestState").finish()
    }
}

impl TestState {
    async fn new() -> anyhow::Result<Self> {
        let root = TempDir::new().context("create temp dir for bdd world")?;
        let db_path = root.path().join("bdd.sqlite");
        File::create(&db_path)?;
        let database_url = format!("sqlite://{}", db_path.to_string_lossy());

        let config = AppConfig {
            database_url: database_url.clone(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            cookie_secret: "bdd-cookie-secret".into(),
        };

        let db = init_pool(&config.database_url).await?;
        sqlx::migrate!("./migrations").run(&db).await?;

        let app = AppState::new(config, db);
        Ok(Self { app, _root: root })
    }

    fn app(&self) -> &AppState {
        &self.app
    }
}

async fn register_user(world: &mut AppWorld, username: String, email: String, password: String) {
    let created = auth::register_user(world.app_state(), &username, &email, &password)
        .await
        .expect("register user");
    world.registered_user = Some(created);
}

/// Trips of the registered user, newest first, hydrated with child links.
async fn trips(world: &AppWorld) -> Vec<Trip> {
    let state = world.app_state();
    let mut trips = state
        .trips
        .list(&world.user().uuid)
        .await
        .expect("list trips");
    let trip_ids: Vec<String> = trips.iter().map(|trip| trip.id.clone()).collect();
    let mut links = state
        .trip_children
        .list(&trip_ids)
        .await
        .expect("list trip links");
    for trip in &mut trips {
        trip.child_ids = links.remove(&trip.id).unwrap_or_default();
    }
    trips
}

async fn latest_trip(world: &AppWorld) -> Trip {
    trips(world)
        .await
        .into_iter()
        .next()
        .expect("at least one trip expected")
}

fn trip_input(reason: &str, date: &str, destination: &str, miles: f64, kind: &str) -> TripInput {
    let input = TripInput {
        date: date.parse().expect("trip date"),
        reason: TripReason::parse(reason).expect("known reason"),
        destination_name: destination.to_owned(),
        destination_address: None,
        one_way_miles: miles,
        round_trip: kind == "round trip",
        notes: None,
    };
    input.validate().expect("valid trip input");
    input
}

async fn child_id_by_nickname(world: &AppWorld, nickname: &str) -> String {
    world
        .app_state()
        .children
        .list(&world.user().uuid)
        .await
        .expect("list children")
        .into_iter()
        .find(|child| child.nickname == nickname)
        .map(|child| child.id)
        .expect("child with that nickname")
}

#[given("a fresh application state")]
async fn given_fresh_state(world: &mut AppWorld) {
    world.state = Some(TestState::new().await.expect("state"));
    world.registered_user = None;
}

#[given(
    regex = r#"^a registered user \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#
)]
async fn given_registered_user(
    world: &mut AppWorld,
    username: String,
    email: String,
    password: String,
) {
    register_user(world, username, email, password).await;
}

#[when(
    regex = r#"^I register a user \"([^\"]+)\" with email \"([^\"]+)\" and password \"([^\"]+)\"$"#
)]
async fn when_register_user(
    world: &mut AppWorld,
    username: String,
    email: String,
    password: String,
) {
    register_user(world, username, email, password).await;
}

#[then(regex = r#"^I can authenticate as \"([^\"]+)\" using password \"([^\"]+)\"$"#)]
async fn then_can_authenticate(world: &mut AppWorld, identifier: String, password: String) {
    let authed = auth::authenticate_user(world.app_state(), &identifier, &password)
        .await
        .expect("authentication");
    assert_eq!(authed.username, identifier);
}

#[then(regex = r#"^authenticating as \"([^\"]+)\" with password \"([^\"]+)\" is rejected$"#)]
async fn then_authentication_rejected(world: &mut AppWorld, identifier: String, password: String) {
    let result = auth::authenticate_user(world.app_state(), &identifier, &password).await;
    assert!(result.is_err(), "authentication should have been rejected");
}

#[when(
    regex = r#"^I log a \"([^\"]+)\" trip on \"([^\"]+)\" to \"([^\"]+)\" of ([\d.]+) miles (round trip|one way)$"#
)]
async fn when_log_trip(
    world: &mut AppWorld,
    reason: String,
    date: String,
    destination: String,
    miles: f64,
    kind: String,
) {
    let input = trip_input(&reason, &date, &destination, miles, &kind);
    let user_uuid = world.user().uuid.clone();
    world
        .app_state()
        .trips
        .create(&user_uuid, &input)
        .await
        .expect("create trip");
}

#[when(regex = r#"^a raw trip row dated \"([^\"]+)\" with ([\d.]+) miles and notes \"([^\"]*)\" exists$"#)]
async fn when_raw_row_exists(world: &mut AppWorld, date: String, miles: f64, notes: String) {
    let user_uuid = world.user().uuid.clone();
    let date: chrono::NaiveDate = date.parse().expect("row date");
    sqlx::query(
        "INSERT INTO trips (id, user_id, date, start_text, end_text, miles, notes, created_at) \
         VALUES (?1, ?2, ?3, NULL, ?4, ?5, ?6, ?7)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(&user_uuid)
    .bind(date)
    .bind("Office")
    .bind(miles)
    .bind(&notes)
    .bind(Utc::now())
    .execute(&world.app_state().db)
    .await
    .expect("insert raw row");
}

#[when(regex = r#"^I change the latest trip to ([\d.]+) miles (round trip|one way)$"#)]
async fn when_change_latest_trip(world: &mut AppWorld, miles: f64, kind: String) {
    let trip = latest_trip(world).await;
    let input = TripInput {
        date: trip.date,
        reason: trip.reason,
        destination_name: trip.destination_name.clone(),
        destination_address: trip.destination_address.clone(),
        one_way_miles: miles,
        round_trip: kind == "round trip",
        notes: trip.notes.clone(),
    };
    let user_uuid = world.user().uuid.clone();
    world
        .app_state()
        .trips
        .update(&user_uuid, &trip.id, &input)
        .await
        .expect("update trip");
}

#[when("I delete the latest trip")]
async fn when_delete_latest_trip(world: &mut AppWorld) {
    let trip = latest_trip(world).await;
    let user_uuid = world.user().uuid.clone();
    let state = world.app_state();
    state
        .trip_children
        .set(&trip.id, &[])
        .await
        .expect("clear trip links");
    state
        .trips
        .delete(&user_uuid, &trip.id)
        .await
        .expect("delete trip");
}

#[then(regex = r"^the trip log contains (\d+) trips?$")]
async fn then_trip_count(world: &mut AppWorld, expected: usize) {
    assert_eq!(trips(world).await.len(), expected);
}

#[then(regex = r"^the latest trip totals ([\d.]+) miles$")]
async fn then_latest_trip_totals(world: &mut AppWorld, expected: f64) {
    let trip = latest_trip(world).await;
    assert_eq!(trip.total_miles(), expected);
}

#[then(regex = r#"^the latest trip is dated \"([^\"]+)\"$"#)]
async fn then_latest_trip_dated(world: &mut AppWorld, expected: String) {
    let trip = latest_trip(world).await;
    assert_eq!(trip.date.format("%Y-%m-%d").to_string(), expected);
}

#[then(regex = r#"^the latest trip falls back to reason \"other\" as a one-way drive of ([\d.]+) miles$"#)]
async fn then_latest_trip_fallback(world: &mut AppWorld, miles: f64) {
    let trip = latest_trip(world).await;
    assert_eq!(trip.reason, TripReason::Other);
    assert!(!trip.round_trip);
    assert_eq!(trip.one_way_miles, miles);
}

#[then(regex = r#"^the latest trip keeps the note \"([^\"]*)\"$"#)]
async fn then_latest_trip_note(world: &mut AppWorld, expected: String) {
    let trip = latest_trip(world).await;
    assert_eq!(trip.notes.as_deref(), Some(expected.as_str()));
}

#[given(regex = r#"^a child nicknamed \"([^\"]+)\"$"#)]
#[when(regex = r#"^I add a child nicknamed \"([^\"]+)\"$"#)]
async fn add_child(world: &mut AppWorld, nickname: String) {
    let user_uuid = world.user().uuid.clone();
    world
        .app_state()
        .children
        .create(&user_uuid, &nickname)
        .await
        .expect("create child");
}

#[when(regex = r#"^I rename the child \"([^\"]+)\" to \"([^\"]+)\"$"#)]
async fn when_rename_child(world: &mut AppWorld, nickname: String, new_nickname: String) {
    let child_id = child_id_by_nickname(world, &nickname).await;
    let user_uuid = world.user().uuid.clone();
    world
        .app_state()
        .children
        .update(&user_uuid, &child_id, &new_nickname)
        .await
        .expect("rename child");
}

#[when(regex = r#"^I delete the child \"([^\"]+)\"$"#)]
async fn when_delete_child(world: &mut AppWorld, nickname: String) {
    let child_id = child_id_by_nickname(world, &nickname).await;
    let user_uuid = world.user().uuid.clone();
    world
        .app_state()
        .children
        .delete(&user_uuid, &child_id)
        .await
        .expect("delete child");
}

#[then(regex = r#"^the children list shows \"([^\"]+)\"$"#)]
async fn then_children_list_shows(world: &mut AppWorld, nickname: String) {
    let children = world
        .app_state()
        .children
        .list(&world.user().uuid)
        .await
        .expect("list children");
    assert!(children.iter().any(|child| child.nickname == nickname));
}

#[when("I assign all children to the latest trip")]
async fn when_assign_all_children(world: &mut AppWorld) {
    let trip = latest_trip(world).await;
    let child_ids: Vec<String> = world
        .app_state()
        .children
        .list(&world.user().uuid)
        .await
        .expect("list children")
        .into_iter()
        .map(|child| child.id)
        .collect();
    world
        .app_state()
        .trip_children
        .set(&trip.id, &child_ids)
        .await
        .expect("set trip links");
}

#[when("I clear the children of the latest trip")]
async fn when_clear_children(world: &mut AppWorld) {
    let trip = latest_trip(world).await;
    world
        .app_state()
        .trip_children
        .set(&trip.id, &[])
        .await
        .expect("clear trip links");
}

#[then(regex = r"^the latest trip is shared by (\d+) children$")]
async fn then_shared_by(world: &mut AppWorld, expected: usize) {
    let trip = latest_trip(world).await;
    assert_eq!(trip.child_ids.len(), expected);
}

#[then(regex = r#"^the CSV export mentions the children \"([^\"]+)\" and \"([^\"]+)\"$"#)]
async fn then_csv_mentions_children(world: &mut AppWorld, first: String, second: String) {
    let trips = trips(world).await;
    let children = world
        .app_state()
        .children
        .list(&world.user().uuid)
        .await
        .expect("list children");
    let csv_text = export::trips_csv(&trips, &children);
    assert!(csv_text.contains(&first), "missing {first} in:\n{csv_text}");
    assert!(csv_text.contains(&second), "missing {second} in:\n{csv_text}");
}

#[when("the database connection is closed")]
async fn when_db_closed(world: &mut AppWorld) {
    world.app_state().db.close().await;
}

#[then("listing child links for no trips still succeeds")]
async fn then_empty_link_lookup_succeeds(world: &mut AppWorld) {
    let map = world
        .app_state()
        .trip_children
        .list(&[])
        .await
        .expect("empty input must not touch storage");
    assert!(map.is_empty());
}

#[then("listing child links for an unknown trip fails")]
async fn then_link_lookup_fails(world: &mut AppWorld) {
    let result = world
        .app_state()
        .trip_children
        .list(&["missing".to_string()])
        .await;
    assert!(result.is_err(), "a closed pool should surface a storage error");
}

#[tokio::main]
async fn main() {
    AppWorld::cucumber()
        .fail_on_skipped()
        .with_default_cli()
        .run("tests/features")
        .await;
}
