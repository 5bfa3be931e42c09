diesel::table! {
    appointments (id) {
        id -> Uuid,
        scheduler_id -> Text,
        date -> Text,
        time -> Text,
        length -> Int4,
    }
}

diesel::table! {
    bookings (id) {
        id -> Uuid,
        appointment_id -> Uuid,
        scheduler_id -> Text,
        name -> Text,
        email -> Text,
        notes -> Text,
    }
}

diesel::joinable!(bookings -> appointments (appointment_id));
diesel::allow_tables_to_appear_in_same_query!(appointments, bookings);
