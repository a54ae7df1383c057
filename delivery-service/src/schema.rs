diesel::table! {
    parcels (id) {
        id -> Uuid,
        sender_email -> Varchar,
        parcel_name -> Varchar,
        cost -> Numeric,
        payment_status -> Varchar,
        tracking_id -> Nullable<Varchar>,
        details -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    payments (id) {
        id -> Uuid,
        amount -> Numeric,
        currency -> Varchar,
        customer_email -> Varchar,
        parcel_id -> Uuid,
        parcel_name -> Varchar,
        transaction_id -> Varchar,
        payment_status -> Varchar,
        paid_at -> Timestamptz,
        tracking_id -> Varchar,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        display_name -> Nullable<Varchar>,
        photo_url -> Nullable<Varchar>,
        role -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    riders (id) {
        id -> Uuid,
        name -> Varchar,
        email -> Varchar,
        phone -> Varchar,
        region -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    parcels,
    payments,
    users,
    riders,
);
