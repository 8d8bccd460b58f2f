table! {
    apps (id) {
        id -> Int8,
        name -> Text,
        nostr_pubkey -> Text,
        created_at -> Int8,
    }
}

table! {
    app_permissions (id) {
        id -> Int8,
        app_id -> Int8,
        request_method -> Text,
        max_amount -> Int8,
        budget_renewal -> Text,
        expires_at -> Nullable<Int8>,
        created_at -> Int8,
    }
}

table! {
    request_events (id) {
        id -> Int8,
        app_id -> Nullable<Int8>,
        nostr_id -> Text,
        content -> Text,
        state -> Text,
        replied_at -> Nullable<Int8>,
        created_at -> Int8,
    }
}

table! {
    response_events (id) {
        id -> Int8,
        app_id -> Nullable<Int8>,
        request_event_id -> Nullable<Int8>,
        nostr_id -> Text,
        content -> Text,
        decrypted_content -> Text,
        state -> Text,
        replied_at -> Nullable<Int8>,
        created_at -> Int8,
    }
}

table! {
    payments (id) {
        id -> Int8,
        app_id -> Int8,
        request_event_id -> Int8,
        amount -> Int4,
        preimage -> Nullable<Text>,
        payment_request -> Nullable<Text>,
        created_at -> Int8,
    }
}
