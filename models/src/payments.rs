use crate::schema::payments;

use diesel::dsl::sum;
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use serde::{Deserialize, Serialize};

/// A completed-or-attempted Lightning payment. A non-null preimage means
/// the payment settled; only settled rows count toward budgets.
#[derive(Queryable, Identifiable, Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: i64,
    pub app_id: i64,
    pub request_event_id: i64,
    /// Amount in satoshis.
    pub amount: i32,
    pub preimage: Option<String>,
    pub payment_request: Option<String>,
    pub created_at: i64,
}

impl Payment {
    pub fn set_preimage(conn: &diesel::PgConnection, id: i64, preimage: &str) -> Result<usize, DieselError> {
        diesel::update(payments::dsl::payments.find(id))
            .set(payments::preimage.eq(preimage))
            .execute(conn)
    }

    /// Sum of the app's settled payment amounts created after `cutoff`,
    /// in satoshis.
    pub fn sum_settled_since(conn: &diesel::PgConnection, app_id: i64, cutoff: i64) -> Result<i64, DieselError> {
        payments::dsl::payments
            .filter(payments::app_id.eq(app_id))
            .filter(payments::preimage.is_not_null())
            .filter(payments::created_at.gt(cutoff))
            .select(sum(payments::amount))
            .first::<Option<i64>>(conn)
            .map(|total| total.unwrap_or(0))
    }
}

#[derive(Insertable, Debug, Deserialize)]
#[table_name = "payments"]
pub struct InsertablePayment {
    pub app_id: i64,
    pub request_event_id: i64,
    pub amount: i32,
    pub preimage: Option<String>,
    pub payment_request: Option<String>,
    pub created_at: i64,
}

impl InsertablePayment {
    pub fn insert(&self, conn: &diesel::PgConnection) -> Result<i64, DieselError> {
        diesel::insert_into(payments::table)
            .values(self)
            .returning(payments::id)
            .get_result(conn)
    }
}
