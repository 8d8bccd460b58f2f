use crate::schema::request_events;

use diesel::prelude::*;
use diesel::result::Error as DieselError;
use serde::{Deserialize, Serialize};

/// An inbound event accepted by the service. `nostr_id` is the dedup key.
#[derive(Queryable, Identifiable, Debug, Clone, Serialize, Deserialize)]
pub struct RequestEvent {
    pub id: i64,
    pub app_id: Option<i64>,
    pub nostr_id: String,
    pub content: String,
    pub state: String,
    pub replied_at: Option<i64>,
    pub created_at: i64,
}

impl RequestEvent {
    pub fn get_by_nostr_id(conn: &diesel::PgConnection, nostr_id: &str) -> Result<Option<Self>, DieselError> {
        request_events::dsl::request_events
            .filter(request_events::nostr_id.eq(nostr_id))
            .first::<Self>(conn)
            .optional()
    }

    pub fn update_state(conn: &diesel::PgConnection, id: i64, state: &str) -> Result<usize, DieselError> {
        diesel::update(request_events::dsl::request_events.find(id))
            .set(request_events::state.eq(state))
            .execute(conn)
    }

    pub fn set_replied_at(conn: &diesel::PgConnection, id: i64, replied_at: i64) -> Result<usize, DieselError> {
        diesel::update(request_events::dsl::request_events.find(id))
            .set(request_events::replied_at.eq(replied_at))
            .execute(conn)
    }
}

#[derive(Insertable, Debug, Deserialize)]
#[table_name = "request_events"]
pub struct InsertableRequestEvent {
    pub app_id: Option<i64>,
    pub nostr_id: String,
    pub content: String,
    pub state: String,
    pub created_at: i64,
}

impl InsertableRequestEvent {
    pub fn insert(&self, conn: &diesel::PgConnection) -> Result<i64, DieselError> {
        diesel::insert_into(request_events::table)
            .values(self)
            .returning(request_events::id)
            .get_result(conn)
    }
}
