use crate::backend::SchedulerBackend;
use crate::eligibility::{evaluate, SlotAction, SlotEligibility};
use crate::error::ApiError;
use crate::form::{submit_booking, BookingFields, BookingForm, FormState};
use crate::formatting::{format_date, format_duration, format_time};
use crate::identity::{identity_key, IdentityStore};
use crate::session::SchedulerSession;
use crate::types::Booking;
use axum::extract::Path;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum::{
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub struct AppState<B: SchedulerBackend> {
    pub session: Arc<SchedulerSession<B>>,
    pub form: Arc<Mutex<BookingForm>>,
    pub identity: Arc<dyn IdentityStore>,
}

impl<B: SchedulerBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            form: self.form.clone(),
            identity: self.identity.clone(),
        }
    }
}

impl<B: SchedulerBackend> AppState<B> {
    pub fn new(session: SchedulerSession<B>, identity: Arc<dyn IdentityStore>) -> Self {
        Self {
            session: Arc::new(session),
            form: Arc::default(),
            identity,
        }
    }

    fn form(&self) -> MutexGuard<'_, BookingForm> {
        self.form.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn user_email(&self) -> Option<String> {
        let scheduler_id = self.session.scheduler_id()?;
        self.identity.get(&identity_key(&scheduler_id))
    }
}

#[derive(Debug, Serialize)]
struct SlotView {
    id: String,
    time: String,
    duration: String,
    booker_name: Option<String>,
    #[serde(flatten)]
    eligibility: SlotEligibility,
}

#[derive(Debug, Serialize)]
struct DayView {
    date: String,
    label: String,
    slots: Vec<SlotView>,
}

#[derive(Debug, Serialize)]
struct FormView {
    #[serde(flatten)]
    state: FormState,
    fields: BookingFields,
    selected: Option<String>,
}

#[derive(Debug, Serialize)]
struct ScheduleView {
    scheduler_id: Option<String>,
    user_email: Option<String>,
    days: Vec<DayView>,
    form: FormView,
}

#[derive(Debug, Serialize)]
struct DebugView {
    slots: usize,
    bookings: usize,
    storage_key: Option<String>,
}

pub fn create_app<B: SchedulerBackend>(state: AppState<B>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/schedule", get(get_schedule))
        .route("/slots/:id/activate", post(activate_slot))
        .route("/form/submit", post(submit_form))
        .route("/form/cancel", post(cancel_form))
        .route("/debug", get(get_debug))
        .with_state(state)
        .layer(cors)
}

fn schedule_view<B: SchedulerBackend>(state: &AppState<B>) -> ScheduleView {
    let user = state.user_email();
    let bookings = state.session.bookings();

    let days = state
        .session
        .days()
        .into_iter()
        .map(|day| DayView {
            label: format_date(&day.date),
            slots: day
                .slots
                .iter()
                .map(|slot| {
                    let eligibility = evaluate(slot, &bookings, user.as_deref());
                    SlotView {
                        id: slot.id.clone(),
                        time: format_time(&slot.time).to_string(),
                        duration: format_duration(slot.length),
                        booker_name: eligibility.booker_name().map(String::from),
                        eligibility,
                    }
                })
                .collect(),
            date: day.date,
        })
        .collect();

    let form = state.form();
    let selected = form.selected_slot().map(|slot| {
        format!(
            "{} at {} ({})",
            format_date(&slot.date),
            format_time(&slot.time),
            format_duration(slot.length)
        )
    });

    ScheduleView {
        scheduler_id: state.session.scheduler_id(),
        user_email: user,
        days,
        form: FormView {
            state: form.state().clone(),
            fields: form.fields().clone(),
            selected,
        },
    }
}

async fn get_schedule<B: SchedulerBackend>(State(state): State<AppState<B>>) -> impl IntoResponse {
    Json(schedule_view(&state))
}

async fn activate_slot<B: SchedulerBackend>(
    State(state): State<AppState<B>>,
    Path(slot_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let slot = state
        .session
        .slots()
        .into_iter()
        .find(|slot| slot.id == slot_id)
        .ok_or_else(|| ApiError::UnknownSlot(slot_id.clone()))?;
    let bookings = state.session.bookings();
    let eligibility = evaluate(&slot, &bookings, state.user_email().as_deref());
    if !eligibility.visible || eligibility.disabled {
        return Err(ApiError::ActionUnavailable(slot_id));
    }

    match eligibility.activate() {
        SlotAction::OpenForm(slot) => {
            state.form().select_slot(slot, &bookings)?;
        }
        SlotAction::DeleteBooking(booking_id) => {
            state.session.delete_booking(&booking_id).await?;
            info!(%booking_id, "Cancelled own booking");
        }
        SlotAction::Nothing => return Err(ApiError::ActionUnavailable(slot_id)),
    }
    Ok(Json(schedule_view(&state)))
}

async fn submit_form<B: SchedulerBackend>(
    State(state): State<AppState<B>>,
    Json(fields): Json<BookingFields>,
) -> Result<(StatusCode, Json<Booking>), ApiError> {
    let booking = submit_booking(&*state.form, &*state.session, &*state.identity, fields).await?;
    Ok((StatusCode::CREATED, Json(booking)))
}

async fn cancel_form<B: SchedulerBackend>(
    State(state): State<AppState<B>>,
) -> Result<impl IntoResponse, ApiError> {
    state.form().cancel()?;
    Ok(Json(schedule_view(&state)))
}

async fn get_debug<B: SchedulerBackend>(State(state): State<AppState<B>>) -> impl IntoResponse {
    Json(DebugView {
        slots: state.session.slots().len(),
        bookings: state.session.bookings().len(),
        storage_key: state.session.scheduler_id().map(|id| identity_key(&id)),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        identity::MemoryIdentityStore,
        local_store::LocalStore,
        testutils::{new_booking, SCHEDULER_ID},
    };
    use reqwest::Client;
    use serde_json::{json, Value};
    use tokio::{net::TcpListener, task::JoinHandle};

    struct TestServer {
        server: JoinHandle<()>,
        url: String,
        store: LocalStore,
        identity: Arc<MemoryIdentityStore>,
        state: AppState<LocalStore>,
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.server.abort();
        }
    }

    async fn init() -> TestServer {
        let store = LocalStore::default();
        store.add_slot(SCHEDULER_ID, "2025-09-16", "07:00", 60);
        store.add_slot(SCHEDULER_ID, "2025-09-15", "08:30", 45);
        store.add_slot(SCHEDULER_ID, "2025-09-15", "07:00", 90);

        let session = SchedulerSession::new(store.clone());
        session.initialize(SCHEDULER_ID, &[]).await;
        let identity = Arc::new(MemoryIdentityStore::default());
        let state = AppState::new(session, identity.clone());
        let app = create_app(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        TestServer {
            server,
            url,
            store,
            identity,
            state,
        }
    }

    async fn schedule(client: &Client, url: &str) -> Value {
        client
            .get(format!("{url}/schedule"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_schedule_is_grouped_and_formatted() {
        let test_server = init().await;
        let client = Client::new();

        let view = schedule(&client, &test_server.url).await;
        let days = view["days"].as_array().unwrap();
        assert_eq!(days.len(), 2);
        assert_eq!(days[0]["date"], "2025-09-15");
        assert_eq!(days[0]["label"], "måndag 15 september 2025");
        assert_eq!(days[0]["slots"][0]["time"], "07:00");
        assert_eq!(days[0]["slots"][0]["duration"], "1h 30min");
        assert_eq!(days[0]["slots"][1]["duration"], "45min");
        assert_eq!(days[0]["slots"][0]["action_label"], "Book");
        assert_eq!(days[0]["slots"][0]["visible"], true);
        assert_eq!(view["form"]["state"], "no_slot_selected");
        assert_eq!(view["user_email"], Value::Null);
    }

    #[tokio::test]
    async fn test_book_and_cancel_through_api() {
        let test_server = init().await;
        let client = Client::new();
        let url = &test_server.url;

        let view = schedule(&client, url).await;
        let first = view["days"][0]["slots"][0]["id"].as_str().unwrap().to_string();
        let second = view["days"][0]["slots"][1]["id"].as_str().unwrap().to_string();

        let response = client
            .post(format!("{url}/slots/{first}/activate"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());
        let view: Value = response.json().await.unwrap();
        assert_eq!(view["form"]["state"], "slot_selected");
        assert_eq!(
            view["form"]["selected"],
            "måndag 15 september 2025 at 07:00 (1h 30min)"
        );

        let response = client
            .post(format!("{url}/form/submit"))
            .json(&json!({"name": "Anna", "email": "a@x.se"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED.as_u16());
        let booking: Booking = response.json().await.unwrap();
        assert_eq!(booking.appointment_id, first);
        assert_eq!(
            test_server
                .identity
                .get(&identity_key(SCHEDULER_ID))
                .as_deref(),
            Some("a@x.se")
        );

        let view = schedule(&client, url).await;
        assert_eq!(view["user_email"], "a@x.se");
        assert_eq!(view["days"][0]["slots"][0]["action_label"], "Cancel");
        assert_eq!(view["days"][0]["slots"][0]["booker_name"], "Anna");
        assert_eq!(view["days"][0]["slots"][1]["visible"], false);

        let response = client
            .post(format!("{url}/slots/{second}/activate"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT.as_u16());

        let response = client
            .post(format!("{url}/slots/{first}/activate"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK.as_u16());
        let view: Value = response.json().await.unwrap();
        assert_eq!(view["days"][0]["slots"][0]["action_label"], "Book");
        assert_eq!(view["days"][0]["slots"][1]["visible"], true);
        assert!(test_server.store.bookings(SCHEDULER_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_foreign_booking_cannot_be_activated() {
        let test_server = init().await;
        let client = Client::new();
        let url = &test_server.url;

        let view = schedule(&client, url).await;
        let first = view["days"][0]["slots"][0]["id"].as_str().unwrap().to_string();
        let created = test_server
            .store
            .insert_booking(new_booking(&first, SCHEDULER_ID, "Peter", "p@x.se"))
            .await
            .unwrap();
        let response = client
            .post(format!("{url}/slots/{first}/activate"))
            .send()
            .await
            .unwrap();
        // the session has not refreshed yet, so the form opens on a stale view
        assert_eq!(response.status(), StatusCode::OK.as_u16());

        let response = client
            .post(format!("{url}/form/submit"))
            .json(&json!({"name": "Anna", "email": "a@x.se"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT.as_u16());
        let view = schedule(&client, url).await;
        assert_eq!(view["form"]["state"], "submission_failed");
        assert_eq!(view["days"][0]["slots"][0]["action_label"], "Book");

        test_server.state.session.refresh_bookings().await.unwrap();
        let view = schedule(&client, url).await;
        assert_eq!(view["days"][0]["slots"][0]["action_label"], "Booked");
        assert_eq!(view["days"][0]["slots"][0]["booker_name"], created.name);

        let response = client
            .post(format!("{url}/slots/{first}/activate"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT.as_u16());

        let response = client
            .post(format!("{url}/form/cancel"))
            .send()
            .await
            .unwrap();
        let view: Value = response.json().await.unwrap();
        assert_eq!(view["form"]["state"], "no_slot_selected");
    }

    #[test_case::test_case(json!({"name": "", "email": "a@x.se"}) ; "missing name")]
    #[test_case::test_case(json!({"name": "Anna", "email": "nope"}) ; "invalid email")]
    #[tokio::test]
    async fn test_invalid_submission(request: Value) {
        let test_server = init().await;
        let client = Client::new();
        let url = &test_server.url;

        let view = schedule(&client, url).await;
        let first = view["days"][0]["slots"][0]["id"].as_str().unwrap().to_string();
        client
            .post(format!("{url}/slots/{first}/activate"))
            .send()
            .await
            .unwrap();

        let response = client
            .post(format!("{url}/form/submit"))
            .json(&request)
            .send()
            .await
            .unwrap();
        assert_eq!(
            response.status(),
            StatusCode::UNPROCESSABLE_ENTITY.as_u16()
        );
        assert!(test_server.store.bookings(SCHEDULER_ID).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_slot_and_submit_without_selection() {
        let test_server = init().await;
        let client = Client::new();
        let url = &test_server.url;

        let response = client
            .post(format!("{url}/slots/missing/activate"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND.as_u16());

        let response = client
            .post(format!("{url}/form/submit"))
            .json(&json!({"name": "Anna", "email": "a@x.se"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST.as_u16());
    }

    #[tokio::test]
    async fn test_debug_info() {
        let test_server = init().await;
        let client = Client::new();

        let view: Value = client
            .get(format!("{}/debug", test_server.url))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(view["slots"], 3);
        assert_eq!(view["bookings"], 0);
        assert_eq!(view["storage_key"], "scheduler_user_has_booked_ht25");
    }
}
