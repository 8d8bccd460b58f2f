use crate::schema::apps;

use diesel::prelude::*;
use diesel::result::Error as DieselError;
use serde::{Deserialize, Serialize};

/// A connected client application.
#[derive(Queryable, Identifiable, Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: i64,
    pub name: String,
    pub nostr_pubkey: String,
    pub created_at: i64,
}

impl App {
    pub fn get_by_pubkey(conn: &diesel::PgConnection, nostr_pubkey: &str) -> Result<Self, DieselError> {
        apps::dsl::apps
            .filter(apps::nostr_pubkey.eq(nostr_pubkey))
            .first::<Self>(conn)
    }

    pub fn get_by_id(conn: &diesel::PgConnection, id: i64) -> Result<Self, DieselError> {
        apps::dsl::apps.find(id).first::<Self>(conn)
    }
}

#[derive(Insertable, Debug, Deserialize)]
#[table_name = "apps"]
pub struct InsertableApp {
    pub name: String,
    pub nostr_pubkey: String,
    pub created_at: i64,
}

impl InsertableApp {
    pub fn insert(&self, conn: &diesel::PgConnection) -> Result<i64, DieselError> {
        diesel::insert_into(apps::table)
            .values(self)
            .returning(apps::id)
            .get_result(conn)
    }
}
