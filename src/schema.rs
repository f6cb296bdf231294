// Database schema definitions
diesel::table! {
    auth_users (id) {
        id -> Uuid,
        email -> Varchar,
        password_hash -> Varchar,
        created_at -> Timestamptz,
        last_sign_in_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    auth_sessions (session_id) {
        session_id -> Uuid,
        user_id -> Uuid,
        ip_address -> Nullable<Varchar>,
        user_agent -> Nullable<Varchar>,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    refresh_tokens (token_id) {
        token_id -> Int4,
        user_id -> Uuid,
        session_id -> Uuid,
        token -> Varchar,
        expires_at -> Timestamptz,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    profiles (id) {
        id -> Uuid,
        full_name -> Varchar,
        email -> Varchar,
        phone -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    user_roles (id) {
        id -> Int4,
        user_id -> Uuid,
        role -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    service_requests (id) {
        id -> Uuid,
        user_id -> Uuid,
        machine_model -> Varchar,
        issue_description -> Text,
        image_url -> Nullable<Varchar>,
        status -> Varchar,
        preferred_date -> Date,
        preferred_time -> Time,
        scheduled_date -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(auth_sessions -> auth_users (user_id));
diesel::joinable!(refresh_tokens -> auth_sessions (session_id));
diesel::joinable!(user_roles -> auth_users (user_id));
diesel::joinable!(service_requests -> profiles (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    auth_users, auth_sessions, refresh_tokens,
    profiles, user_roles, service_requests,
);
