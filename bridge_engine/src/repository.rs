//! Persistence seam consumed by the engine. `PgRepository` is the
//! production implementation over the r2d2 pool; tests provide an
//! in-memory double.

use diesel::r2d2::ConnectionManager;
use diesel::{OptionalExtension, PgConnection};

use models::app_permissions::AppPermission;
use models::apps::App;
use models::payments::{InsertablePayment, Payment};
use models::request_events::{InsertableRequestEvent, RequestEvent};
use models::response_events::{InsertableResponseEvent, ResponseEvent};
use xerror::engine::EngineError;

pub type DbPool = diesel::r2d2::Pool<ConnectionManager<PgConnection>>;

/// All methods are synchronous relative to the handler that calls them and
/// provide read-your-writes within a single event's processing.
pub trait Repository: Send + Sync {
    fn find_request_event_by_nostr_id(&self, nostr_id: &str) -> Result<Option<RequestEvent>, EngineError>;

    fn find_app_by_pubkey(&self, pubkey: &str) -> Result<Option<App>, EngineError>;

    fn find_permission(&self, app_id: i64, method: &str) -> Result<Option<AppPermission>, EngineError>;

    fn list_permission_methods(&self, app_id: i64) -> Result<Vec<String>, EngineError>;

    fn insert_request_event(
        &self,
        app_id: Option<i64>,
        nostr_id: &str,
        content: &str,
    ) -> Result<i64, EngineError>;

    fn update_request_event_state(&self, id: i64, state: &str) -> Result<(), EngineError>;

    fn set_request_event_replied(&self, id: i64, replied_at: i64) -> Result<(), EngineError>;

    fn insert_response_event(
        &self,
        app_id: Option<i64>,
        request_event_id: Option<i64>,
        nostr_id: &str,
        content: &str,
        decrypted_content: &str,
    ) -> Result<i64, EngineError>;

    fn update_response_event_state(&self, id: i64, state: &str) -> Result<(), EngineError>;

    fn set_response_event_replied(&self, id: i64, state: &str, replied_at: i64) -> Result<(), EngineError>;

    fn insert_payment(
        &self,
        app_id: i64,
        request_event_id: i64,
        amount: i64,
        payment_request: Option<&str>,
    ) -> Result<i64, EngineError>;

    fn update_payment_preimage(&self, id: i64, preimage: &str) -> Result<(), EngineError>;

    /// Sum of settled payment amounts in satoshis since `cutoff` (epoch ms).
    fn sum_payments_since(&self, app_id: i64, cutoff: i64) -> Result<u64, EngineError>;
}

pub struct PgRepository {
    pool: DbPool,
}

impl PgRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<diesel::r2d2::PooledConnection<ConnectionManager<PgConnection>>, EngineError> {
        self.pool.get().map_err(|_| EngineError::DatabaseUnavailable)
    }
}

impl Repository for PgRepository {
    fn find_request_event_by_nostr_id(&self, nostr_id: &str) -> Result<Option<RequestEvent>, EngineError> {
        let conn = self.conn()?;
        RequestEvent::get_by_nostr_id(&conn, nostr_id).map_err(|_| EngineError::QueryFailed)
    }

    fn find_app_by_pubkey(&self, pubkey: &str) -> Result<Option<App>, EngineError> {
        let conn = self.conn()?;
        App::get_by_pubkey(&conn, pubkey)
            .optional()
            .map_err(|_| EngineError::QueryFailed)
    }

    fn find_permission(&self, app_id: i64, method: &str) -> Result<Option<AppPermission>, EngineError> {
        let conn = self.conn()?;
        AppPermission::get_by_app_and_method(&conn, app_id, method)
            .optional()
            .map_err(|_| EngineError::QueryFailed)
    }

    fn list_permission_methods(&self, app_id: i64) -> Result<Vec<String>, EngineError> {
        let conn = self.conn()?;
        AppPermission::get_methods_for_app(&conn, app_id).map_err(|_| EngineError::QueryFailed)
    }

    fn insert_request_event(
        &self,
        app_id: Option<i64>,
        nostr_id: &str,
        content: &str,
    ) -> Result<i64, EngineError> {
        let conn = self.conn()?;
        InsertableRequestEvent {
            app_id,
            nostr_id: nostr_id.to_string(),
            content: content.to_string(),
            state: core_types::REQUEST_EVENT_STATE_RECEIVED.to_string(),
            created_at: utils::time::time_now() as i64,
        }
        .insert(&conn)
        .map_err(|_| EngineError::QueryFailed)
    }

    fn update_request_event_state(&self, id: i64, state: &str) -> Result<(), EngineError> {
        let conn = self.conn()?;
        RequestEvent::update_state(&conn, id, state)
            .map(|_| ())
            .map_err(|_| EngineError::QueryFailed)
    }

    fn set_request_event_replied(&self, id: i64, replied_at: i64) -> Result<(), EngineError> {
        let conn = self.conn()?;
        RequestEvent::set_replied_at(&conn, id, replied_at)
            .map(|_| ())
            .map_err(|_| EngineError::QueryFailed)
    }

    fn insert_response_event(
        &self,
        app_id: Option<i64>,
        request_event_id: Option<i64>,
        nostr_id: &str,
        content: &str,
        decrypted_content: &str,
    ) -> Result<i64, EngineError> {
        let conn = self.conn()?;
        InsertableResponseEvent {
            app_id,
            request_event_id,
            nostr_id: nostr_id.to_string(),
            content: content.to_string(),
            decrypted_content: decrypted_content.to_string(),
            state: core_types::RESPONSE_EVENT_STATE_RECEIVED.to_string(),
            created_at: utils::time::time_now() as i64,
        }
        .insert(&conn)
        .map_err(|_| EngineError::QueryFailed)
    }

    fn update_response_event_state(&self, id: i64, state: &str) -> Result<(), EngineError> {
        let conn = self.conn()?;
        ResponseEvent::update_state(&conn, id, state)
            .map(|_| ())
            .map_err(|_| EngineError::QueryFailed)
    }

    fn set_response_event_replied(&self, id: i64, state: &str, replied_at: i64) -> Result<(), EngineError> {
        let conn = self.conn()?;
        ResponseEvent::set_replied(&conn, id, state, replied_at)
            .map(|_| ())
            .map_err(|_| EngineError::QueryFailed)
    }

    fn insert_payment(
        &self,
        app_id: i64,
        request_event_id: i64,
        amount: i64,
        payment_request: Option<&str>,
    ) -> Result<i64, EngineError> {
        let conn = self.conn()?;
        InsertablePayment {
            app_id,
            request_event_id,
            amount: amount as i32,
            preimage: None,
            payment_request: payment_request.map(|s| s.to_string()),
            created_at: utils::time::time_now() as i64,
        }
        .insert(&conn)
        .map_err(|_| EngineError::QueryFailed)
    }

    fn update_payment_preimage(&self, id: i64, preimage: &str) -> Result<(), EngineError> {
        let conn = self.conn()?;
        Payment::set_preimage(&conn, id, preimage)
            .map(|_| ())
            .map_err(|_| EngineError::QueryFailed)
    }

    fn sum_payments_since(&self, app_id: i64, cutoff: i64) -> Result<u64, EngineError> {
        let conn = self.conn()?;
        Payment::sum_settled_since(&conn, app_id, cutoff)
            .map(|total| total.max(0) as u64)
            .map_err(|_| EngineError::QueryFailed)
    }
}
