//! Permission and budget checks.
//!
//! Wire amounts are millisatoshis, budgets are satoshis; conversion is
//! truncating integer division. Budget windows slide on UTC calendar
//! boundaries anchored at the app's creation time.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

use core_types::payload::{
    ErrorCode, MULTI_PAY_INVOICE_METHOD, MULTI_PAY_KEYSEND_METHOD, PAY_INVOICE_METHOD,
    PAY_KEYSEND_METHOD,
};
use core_types::BudgetRenewal;
use models::apps::App;

use crate::repository::Repository;

pub fn is_payment_method(method: &str) -> bool {
    matches!(
        method,
        PAY_INVOICE_METHOD | PAY_KEYSEND_METHOD | MULTI_PAY_INVOICE_METHOD | MULTI_PAY_KEYSEND_METHOD
    )
}

/// Authorize one request (or sub-request) for `app`. Returns the wire error
/// to reply with on denial.
pub fn authorize(
    repo: &dyn Repository,
    app: &App,
    method: &str,
    amount_msat: u64,
) -> Result<(), (ErrorCode, String)> {
    let permission = match repo.find_permission(app.id, method) {
        Ok(Some(permission)) => permission,
        Ok(None) => {
            return Err((
                ErrorCode::Restricted,
                format!("This app does not have permission to request {}", method),
            ))
        }
        Err(_) => {
            return Err((
                ErrorCode::Internal,
                "Failed to look up app permissions".to_string(),
            ))
        }
    };

    if let Some(expires_at) = permission.expires_at {
        if expires_at != 0 && expires_at < utils::time::time_now() as i64 {
            return Err((ErrorCode::Expired, "This app has expired".to_string()));
        }
    }

    if is_payment_method(method) && permission.max_amount > 0 {
        let renewal = permission
            .budget_renewal
            .parse::<BudgetRenewal>()
            .unwrap_or(BudgetRenewal::Never);
        let cutoff = window_start(renewal, app.created_at, Utc::now());
        let used = match repo.sum_payments_since(app.id, cutoff) {
            Ok(used) => used,
            Err(_) => {
                return Err((
                    ErrorCode::Internal,
                    "Failed to compute budget usage".to_string(),
                ))
            }
        };
        if used + amount_msat / 1000 > permission.max_amount as u64 {
            return Err((
                ErrorCode::QuotaExceeded,
                "Insufficient budget remaining to make payment".to_string(),
            ));
        }
    }

    Ok(())
}

/// Start of the current budget window in epoch milliseconds.
pub fn window_start(renewal: BudgetRenewal, anchor_ms: i64, now: DateTime<Utc>) -> i64 {
    let start_of = |date: NaiveDate| date.and_hms_opt(0, 0, 0).unwrap().and_utc().timestamp_millis();
    match renewal {
        BudgetRenewal::Never => anchor_ms,
        BudgetRenewal::Daily => start_of(now.date_naive()),
        BudgetRenewal::Weekly => {
            let days_from_monday = now.weekday().num_days_from_monday() as i64;
            start_of(now.date_naive() - Duration::days(days_from_monday))
        }
        BudgetRenewal::Monthly => start_of(NaiveDate::from_ymd_opt(now.year(), now.month(), 1).unwrap()),
        BudgetRenewal::Yearly => start_of(NaiveDate::from_ymd_opt(now.year(), 1, 1).unwrap()),
    }
}
