use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod event;
pub mod payload;

/// Local identity of a connected application.
pub type AppId = i64;

pub const REQUEST_KIND: u64 = 23194;
pub const RESPONSE_KIND: u64 = 23195;
pub const INFO_KIND: u64 = 13194;

pub const REQUEST_EVENT_STATE_RECEIVED: &str = "received";
pub const REQUEST_EVENT_STATE_PROCESSED: &str = "processed";

pub const RESPONSE_EVENT_STATE_RECEIVED: &str = "received";
pub const RESPONSE_EVENT_STATE_CONFIRMED: &str = "confirmed";
pub const RESPONSE_EVENT_STATE_FAILED: &str = "failed";
pub const RESPONSE_EVENT_STATE_UNCONFIRMED: &str = "unconfirmed";

/// Cadence at which a per-app spending window resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BudgetRenewal {
    Never,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl fmt::Display for BudgetRenewal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Never => "never",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
        };

        write!(f, "{name}")
    }
}

impl FromStr for BudgetRenewal {
    type Err = String;

    fn from_str(renewal: &str) -> Result<BudgetRenewal, Self::Err> {
        match renewal {
            "never" => Ok(BudgetRenewal::Never),
            "daily" => Ok(BudgetRenewal::Daily),
            "weekly" => Ok(BudgetRenewal::Weekly),
            "monthly" => Ok(BudgetRenewal::Monthly),
            "yearly" => Ok(BudgetRenewal::Yearly),
            _ => Err("unknown budget renewal".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_renewal_round_trips_through_strings() {
        for renewal in [
            BudgetRenewal::Never,
            BudgetRenewal::Daily,
            BudgetRenewal::Weekly,
            BudgetRenewal::Monthly,
            BudgetRenewal::Yearly,
        ] {
            assert_eq!(renewal.to_string().parse::<BudgetRenewal>(), Ok(renewal));
        }
        assert!("fortnightly".parse::<BudgetRenewal>().is_err());
    }
}
