// Diesel schema for the repurpose database.
//
// Timestamps are RFC 3339 text so the same schema works on SQLite and PostgreSQL.

diesel::table! {
    anonymous_sessions (id) {
        id -> Text,
        token_hash -> Text,
        project_id -> Text,
        transcription_id -> Nullable<Text>,
        file_name -> Text,
        file_size -> BigInt,
        content_type -> Nullable<Text>,
        storage_path -> Text,
        language -> Nullable<Text>,
        status -> Text,
        error_message -> Nullable<Text>,
        ip_address -> Text,
        processing_started_at -> Nullable<Text>,
        expires_at -> Text,
        claimed_by_user_id -> Nullable<Text>,
        claimed_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    projects (id) {
        id -> Text,
        user_id -> Nullable<Text>,
        title -> Text,
        description -> Nullable<Text>,
        anonymous_session_id -> Nullable<Text>,
        status -> Text,
        file_name -> Text,
        file_size -> BigInt,
        storage_path -> Text,
        language -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    transcriptions (id) {
        id -> Text,
        project_id -> Text,
        user_id -> Nullable<Text>,
        content -> Text,
        language -> Nullable<Text>,
        duration_seconds -> Nullable<Double>,
        word_count -> Integer,
        confidence -> Nullable<Double>,
        segments -> Text,
        provider -> Text,
        model -> Text,
        processing_time_ms -> BigInt,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    outputs (id) {
        id -> Text,
        project_id -> Text,
        user_id -> Text,
        kind -> Text,
        status -> Text,
        request -> Text,
        body -> Nullable<Text>,
        metadata -> Text,
        error_message -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    upload_events (id) {
        id -> Text,
        ip_address -> Text,
        created_at -> Text,
    }
}

diesel::joinable!(transcriptions -> projects (project_id));
diesel::joinable!(outputs -> projects (project_id));

diesel::allow_tables_to_appear_in_same_query!(
    anonymous_sessions,
    projects,
    transcriptions,
    outputs,
    upload_events,
);
