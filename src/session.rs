//! Live state of one scheduler instance and its synchronisation with the store.
//!
//! Slots are fetched once per scheduler id, bookings on every refresh. A
//! refresh result is applied only when it is newer than the last applied one
//! and still belongs to the current scheduler id.

use crate::{
    backend::SchedulerBackend,
    error::SessionError,
    grouping::{group_by_day, SchedulerDay},
    types::{AppointmentSlot, Booking, NewBooking},
};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};
use tokio::{
    sync::watch::{self, Sender},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, error, info, warn};

pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Default)]
struct SessionState {
    scheduler_id: Option<String>,
    dates: Vec<String>,
    slots: Vec<AppointmentSlot>,
    slots_loaded: bool,
    bookings: Vec<Booking>,
    generation: u64,
    issued_ticket: u64,
    applied_ticket: u64,
}

struct SessionInner<B> {
    backend: B,
    state: Mutex<SessionState>,
    sender: Sender<Vec<Booking>>,
}

pub struct SchedulerSession<B: SchedulerBackend> {
    inner: Arc<SessionInner<B>>,
    sync_interval: Duration,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl<B: SchedulerBackend> SessionInner<B> {
    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch_slots(&self) {
        let (scheduler_id, dates, generation) = {
            let state = self.state();
            let Some(scheduler_id) = state.scheduler_id.clone() else {
                return;
            };
            (scheduler_id, state.dates.clone(), state.generation)
        };

        let slots = match self.backend.appointments(&scheduler_id, &dates).await {
            Ok(slots) => slots,
            Err(err) => {
                error!(?err, %scheduler_id, "Failed to fetch appointment slots");
                return;
            }
        };
        let (slots, malformed): (Vec<_>, Vec<_>) =
            slots.into_iter().partition(AppointmentSlot::is_well_formed);
        for slot in &malformed {
            warn!(slot_id = %slot.id, date = %slot.date, time = %slot.time, "Dropping malformed slot");
        }

        let mut state = self.state();
        if state.generation != generation {
            debug!(%scheduler_id, "Discarding slots of a previous scheduler");
            return;
        }
        info!(%scheduler_id, count = slots.len(), "Loaded appointment slots");
        state.slots = slots;
        state.slots_loaded = true;
    }

    fn slots_loaded(&self) -> bool {
        self.state().slots_loaded
    }

    async fn refresh_bookings(&self) -> Result<Vec<Booking>, SessionError> {
        let (scheduler_id, generation, ticket) = {
            let mut state = self.state();
            let scheduler_id = state
                .scheduler_id
                .clone()
                .ok_or(SessionError::NotInitialized)?;
            state.issued_ticket += 1;
            (scheduler_id, state.generation, state.issued_ticket)
        };

        let bookings = self
            .backend
            .bookings(&scheduler_id)
            .await
            .map_err(|err| {
                error!(?err, %scheduler_id, "Failed to fetch bookings");
                err
            })?;

        let mut state = self.state();
        if state.generation != generation {
            debug!(%scheduler_id, "Discarding bookings of a previous scheduler");
        } else if ticket < state.applied_ticket {
            debug!(%scheduler_id, ticket, "Discarding outdated booking refresh");
        } else {
            state.applied_ticket = ticket;
            state.bookings = bookings;
            self.sender.send_replace(state.bookings.clone());
        }
        Ok(state.bookings.clone())
    }
}

impl<B: SchedulerBackend> SchedulerSession<B> {
    pub fn new(backend: B) -> Self {
        Self::with_sync_interval(backend, DEFAULT_SYNC_INTERVAL)
    }

    pub fn with_sync_interval(backend: B, sync_interval: Duration) -> Self {
        let (sender, _) = watch::channel(vec![]);
        Self {
            inner: Arc::new(SessionInner {
                backend,
                state: Mutex::default(),
                sender,
            }),
            sync_interval,
            sync_task: Mutex::default(),
        }
    }

    /// Loads slots and bookings of `scheduler_id`. Repeated calls for the same
    /// id only retry a failed slot fetch; a different id resets the session
    /// and stops syncing.
    pub async fn initialize(&self, scheduler_id: &str, dates: &[String]) {
        let same_scheduler = {
            let mut state = self.inner.state();
            if state.scheduler_id.as_deref() == Some(scheduler_id) {
                Some(state.slots_loaded)
            } else {
                let generation = state.generation + 1;
                *state = SessionState {
                    scheduler_id: Some(scheduler_id.into()),
                    dates: dates.to_vec(),
                    generation,
                    ..SessionState::default()
                };
                None
            }
        };
        match same_scheduler {
            Some(true) => {
                debug!(scheduler_id, "Scheduler already initialized");
                return;
            }
            Some(false) => {
                info!(scheduler_id, "Retrying appointment slot fetch");
                self.inner.fetch_slots().await;
                return;
            }
            None => {}
        }
        self.stop_sync();
        self.inner.sender.send_replace(vec![]);
        info!(scheduler_id, "Initializing scheduler session");

        let (_, bookings) = futures::join!(self.inner.fetch_slots(), self.inner.refresh_bookings());
        if let Err(err) = bookings {
            warn!(%err, scheduler_id, "Starting without bookings");
        }
    }

    /// Re-fetches bookings every sync interval until stopped, along with the
    /// slots as long as they have not loaded. Replaces a running sync task.
    pub fn start_sync(&self) {
        let inner = self.inner.clone();
        let period = self.sync_interval;
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !inner.slots_loaded() {
                    inner.fetch_slots().await;
                }
                // failures are logged by refresh_bookings, the next tick retries
                let _ = inner.refresh_bookings().await;
            }
        });

        let mut sync_task = self.sync_task.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = sync_task.replace(task) {
            previous.abort();
        }
        debug!(period_secs = period.as_secs(), "Started booking sync");
    }

    pub fn stop_sync(&self) {
        let task = self
            .sync_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
            debug!("Stopped booking sync");
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.sync_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    pub async fn refresh_bookings(&self) -> Result<Vec<Booking>, SessionError> {
        self.inner.refresh_bookings().await
    }

    /// Inserts the booking and refreshes the booking list before returning it.
    /// On failure the session state is left untouched.
    pub async fn create_booking(&self, booking: NewBooking) -> Result<Booking, SessionError> {
        let session_id = self.scheduler_id().ok_or(SessionError::NotInitialized)?;
        if booking.scheduler_id != session_id {
            return Err(SessionError::SchedulerMismatch {
                booking: booking.scheduler_id,
                session: session_id,
            });
        }

        let appointment_id = booking.appointment_id.clone();
        let created = self.inner.backend.insert_booking(booking).await.map_err(|err| {
            error!(?err, %appointment_id, "Error creating booking");
            err
        })?;
        info!(booking_id = %created.id, %appointment_id, "Created booking");

        if let Err(err) = self.refresh_bookings().await {
            warn!(%err, "Booking created but the booking list could not be refreshed");
        }
        Ok(created)
    }

    pub async fn delete_booking(&self, booking_id: &str) -> Result<(), SessionError> {
        if self.scheduler_id().is_none() {
            return Err(SessionError::NotInitialized);
        }

        self.inner
            .backend
            .delete_booking(booking_id)
            .await
            .map_err(|err| {
                error!(?err, booking_id, "Error deleting booking");
                err
            })?;
        info!(booking_id, "Deleted booking");

        if let Err(err) = self.refresh_bookings().await {
            warn!(%err, "Booking deleted but the booking list could not be refreshed");
        }
        Ok(())
    }

    pub fn scheduler_id(&self) -> Option<String> {
        self.inner.state().scheduler_id.clone()
    }

    pub fn slots(&self) -> Vec<AppointmentSlot> {
        self.inner.state().slots.clone()
    }

    pub fn bookings(&self) -> Vec<Booking> {
        self.inner.state().bookings.clone()
    }

    pub fn days(&self) -> Vec<SchedulerDay> {
        group_by_day(&self.inner.state().slots)
    }

    /// Every booking list applied from now on. Yields the current list first.
    pub fn subscribe(&self) -> WatchStream<Vec<Booking>> {
        WatchStream::new(self.inner.sender.subscribe())
    }
}

impl<B: SchedulerBackend> Drop for SchedulerSession<B> {
    fn drop(&mut self) {
        self.stop_sync();
    }
}
