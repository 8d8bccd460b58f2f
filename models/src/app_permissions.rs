use crate::schema::app_permissions;

use diesel::prelude::*;
use diesel::result::Error as DieselError;
use serde::{Deserialize, Serialize};

/// Authorization grant for a single request method.
#[derive(Queryable, Identifiable, Debug, Clone, Serialize, Deserialize)]
pub struct AppPermission {
    pub id: i64,
    pub app_id: i64,
    pub request_method: String,
    /// Budget ceiling in satoshis; `0` means unlimited.
    pub max_amount: i64,
    pub budget_renewal: String,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl AppPermission {
    /// First grant matching `(app_id, request_method)`; uniqueness is not
    /// enforced by the schema.
    pub fn get_by_app_and_method(
        conn: &diesel::PgConnection,
        app_id: i64,
        request_method: &str,
    ) -> Result<Self, DieselError> {
        app_permissions::dsl::app_permissions
            .filter(app_permissions::app_id.eq(app_id))
            .filter(app_permissions::request_method.eq(request_method))
            .order(app_permissions::id.asc())
            .first::<Self>(conn)
    }

    pub fn get_methods_for_app(conn: &diesel::PgConnection, app_id: i64) -> Result<Vec<String>, DieselError> {
        app_permissions::dsl::app_permissions
            .filter(app_permissions::app_id.eq(app_id))
            .select(app_permissions::request_method)
            .load::<String>(conn)
    }
}

#[derive(Insertable, Debug, Deserialize)]
#[table_name = "app_permissions"]
pub struct InsertableAppPermission {
    pub app_id: i64,
    pub request_method: String,
    pub max_amount: i64,
    pub budget_renewal: String,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl InsertableAppPermission {
    pub fn insert(&self, conn: &diesel::PgConnection) -> Result<i64, DieselError> {
        diesel::insert_into(app_permissions::table)
            .values(self)
            .returning(app_permissions::id)
            .get_result(conn)
    }
}
