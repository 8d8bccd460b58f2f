use crate::schema::response_events;

use diesel::prelude::*;
use diesel::result::Error as DieselError;
use serde::{Deserialize, Serialize};

/// An outbound event emitted in reply to a request event.
#[derive(Queryable, Identifiable, Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEvent {
    pub id: i64,
    pub app_id: Option<i64>,
    pub request_event_id: Option<i64>,
    pub nostr_id: String,
    pub content: String,
    pub decrypted_content: String,
    pub state: String,
    pub replied_at: Option<i64>,
    pub created_at: i64,
}

impl ResponseEvent {
    pub fn get_by_nostr_id(conn: &diesel::PgConnection, nostr_id: &str) -> Result<Option<Self>, DieselError> {
        response_events::dsl::response_events
            .filter(response_events::nostr_id.eq(nostr_id))
            .first::<Self>(conn)
            .optional()
    }

    pub fn update_state(conn: &diesel::PgConnection, id: i64, state: &str) -> Result<usize, DieselError> {
        diesel::update(response_events::dsl::response_events.find(id))
            .set(response_events::state.eq(state))
            .execute(conn)
    }

    pub fn set_replied(conn: &diesel::PgConnection, id: i64, state: &str, replied_at: i64) -> Result<usize, DieselError> {
        diesel::update(response_events::dsl::response_events.find(id))
            .set((
                response_events::state.eq(state),
                response_events::replied_at.eq(replied_at),
            ))
            .execute(conn)
    }
}

#[derive(Insertable, Debug, Deserialize)]
#[table_name = "response_events"]
pub struct InsertableResponseEvent {
    pub app_id: Option<i64>,
    pub request_event_id: Option<i64>,
    pub nostr_id: String,
    pub content: String,
    pub decrypted_content: String,
    pub state: String,
    pub created_at: i64,
}

impl InsertableResponseEvent {
    pub fn insert(&self, conn: &diesel::PgConnection) -> Result<i64, DieselError> {
        diesel::insert_into(response_events::table)
            .values(self)
            .returning(response_events::id)
            .get_result(conn)
    }
}
