use crate::{
    backend::SchedulerBackend,
    error::{FormError, SessionError},
    identity::{identity_key, IdentityStore},
    session::SchedulerSession,
    types::{AppointmentSlot, Booking, NewBooking},
};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};
use validator::{Validate, ValidationError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BookingFields {
    #[validate(custom(function = "not_blank"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[serde(default)]
    pub notes: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FormState {
    #[default]
    NoSlotSelected,
    SlotSelected(AppointmentSlot),
    Submitting(AppointmentSlot),
    BookingConfirmed(Booking),
    SubmissionFailed {
        slot: AppointmentSlot,
        reason: String,
    },
}

#[derive(Debug, Default)]
pub struct BookingForm {
    state: FormState,
    fields: BookingFields,
}

impl BookingForm {
    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn fields(&self) -> &BookingFields {
        &self.fields
    }

    pub fn selected_slot(&self) -> Option<&AppointmentSlot> {
        match &self.state {
            FormState::SlotSelected(slot)
            | FormState::Submitting(slot)
            | FormState::SubmissionFailed { slot, .. } => Some(slot),
            FormState::NoSlotSelected | FormState::BookingConfirmed(_) => None,
        }
    }

    pub fn set_fields(&mut self, fields: BookingFields) {
        self.fields = fields;
    }

    /// Only slots without a booking can be selected.
    pub fn select_slot(
        &mut self,
        slot: AppointmentSlot,
        bookings: &[Booking],
    ) -> Result<(), FormError> {
        if matches!(self.state, FormState::Submitting(_)) {
            return Err(FormError::AlreadySubmitting);
        }
        if bookings
            .iter()
            .any(|booking| booking.appointment_id == slot.id)
        {
            return Err(FormError::SlotTaken(slot.id));
        }
        self.state = FormState::SlotSelected(slot);
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), FormError> {
        if matches!(self.state, FormState::Submitting(_)) {
            return Err(FormError::AlreadySubmitting);
        }
        self.state = FormState::NoSlotSelected;
        Ok(())
    }

    pub fn begin_submit(&mut self, scheduler_id: &str) -> Result<NewBooking, FormError> {
        let slot = match &self.state {
            FormState::SlotSelected(slot) | FormState::SubmissionFailed { slot, .. } => slot.clone(),
            FormState::Submitting(_) => return Err(FormError::AlreadySubmitting),
            FormState::NoSlotSelected | FormState::BookingConfirmed(_) => {
                return Err(FormError::NoSlotSelected)
            }
        };
        self.fields.name = self.fields.name.trim().into();
        self.fields.email = self.fields.email.trim().into();
        self.fields.validate()?;

        let booking = NewBooking {
            appointment_id: slot.id.clone(),
            scheduler_id: scheduler_id.into(),
            name: self.fields.name.clone(),
            email: self.fields.email.clone(),
            notes: self.fields.notes.clone(),
        };
        self.state = FormState::Submitting(slot);
        Ok(booking)
    }

    /// Success clears the fields and the selection; failure keeps the slot
    /// selected so the user can retry or cancel.
    pub fn complete_submit(
        &mut self,
        result: Result<Booking, SessionError>,
    ) -> Result<Booking, FormError> {
        match result {
            Ok(booking) => {
                self.fields = BookingFields::default();
                self.state = FormState::BookingConfirmed(booking.clone());
                Ok(booking)
            }
            Err(err) => {
                if let Some(slot) = self.selected_slot().cloned() {
                    self.state = FormState::SubmissionFailed {
                        slot,
                        reason: err.to_string(),
                    };
                }
                Err(err.into())
            }
        }
    }

    /// Leaves `Submitting` when the outcome of a submission will never arrive.
    fn abandon_submit(&mut self) {
        if let FormState::Submitting(slot) = &self.state {
            self.state = FormState::SubmissionFailed {
                slot: slot.clone(),
                reason: "submission was interrupted".into(),
            };
        }
    }
}

/// Held while a submission is in flight. Dropping it unfinished moves the
/// form out of `Submitting` so it can be retried or cancelled.
struct PendingSubmit<'a> {
    form: &'a Mutex<BookingForm>,
    finished: bool,
}

impl PendingSubmit<'_> {
    fn finish(mut self, result: Result<Booking, SessionError>) -> Result<Booking, FormError> {
        self.finished = true;
        let mut form = lock(self.form);
        form.complete_submit(result)
    }
}

impl Drop for PendingSubmit<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("Booking submission dropped before the store answered");
            lock(self.form).abandon_submit();
        }
    }
}

fn lock(form: &Mutex<BookingForm>) -> MutexGuard<'_, BookingForm> {
    form.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Submits `fields` for the selected slot and remembers the booker's email
/// for this scheduler once the store accepted the booking.
pub async fn submit_booking<B: SchedulerBackend>(
    form: &Mutex<BookingForm>,
    session: &SchedulerSession<B>,
    identity: &dyn IdentityStore,
    fields: BookingFields,
) -> Result<Booking, FormError> {
    let scheduler_id = session
        .scheduler_id()
        .ok_or(SessionError::NotInitialized)?;
    let new_booking = {
        let mut form = lock(form);
        form.set_fields(fields);
        form.begin_submit(&scheduler_id)?
    };
    let pending = PendingSubmit {
        form,
        finished: false,
    };

    let result = session.create_booking(new_booking).await;
    let booking = pending.finish(result)?;

    if let Err(err) = identity.set(&identity_key(&scheduler_id), &booking.email) {
        warn!(?err, %scheduler_id, "Booking succeeded but the identity could not be stored");
    }
    info!(booking_id = %booking.id, %scheduler_id, "Booking confirmed");
    Ok(booking)
}
