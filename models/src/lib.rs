#[macro_use]
extern crate diesel;
#[macro_use]
extern crate diesel_migrations;

pub mod app_permissions;
pub mod apps;
pub mod payments;
pub mod request_events;
pub mod response_events;
mod schema;

embed_migrations!("./migrations");

/// Run pending migrations. Must be called once at startup of any program
/// using this crate; migrations are forward-only.
pub fn init(conn: &diesel::PgConnection) -> Result<(), diesel_migrations::RunMigrationsError> {
    embedded_migrations::run(conn)
}
