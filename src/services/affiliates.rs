use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::db::DbPool;
use crate::entities::affiliate_account;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};

/// Result of a commission accrual attempt for one settled order. `applied`
/// is false when the credit failed after the order committed; an
/// unresolvable code produces no outcome at all, since that is a benign
/// no-op rather than a failure.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionOutcome {
    pub affiliate_code: String,
    pub commission: Decimal,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Converts the configured commission into an exact monetary amount.
pub fn commission_amount(raw: f64) -> Decimal {
    Decimal::from_f64(raw).unwrap_or_default().round_dp(2)
}

#[derive(Clone)]
pub struct AffiliateService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl AffiliateService {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Credits one sale and the fixed commission to the account behind
    /// `code`. The amount does not scale with the order total.
    ///
    /// An unresolvable code is a no-op, not an error: orders settle fine with
    /// stale or mistyped referral codes. The increment is a single guarded
    /// UPDATE so concurrent confirmations never lose a commission.
    #[instrument(skip(self))]
    pub async fn credit_sale(
        &self,
        code: &str,
        commission: Decimal,
    ) -> Result<Option<CommissionOutcome>, ServiceError> {
        let update = affiliate_account::Entity::update_many()
            .col_expr(
                affiliate_account::Column::Sales,
                Expr::col(affiliate_account::Column::Sales).add(1),
            )
            .col_expr(
                affiliate_account::Column::Earnings,
                Expr::col(affiliate_account::Column::Earnings).add(commission),
            )
            .filter(affiliate_account::Column::AffiliateCode.eq(code))
            .exec(self.db.as_ref())
            .await?;

        if update.rows_affected == 0 {
            warn!(code = %code, "Referral code did not resolve; no commission credited");
            return Ok(None);
        }

        info!(code = %code, commission = %commission, "Commission accrued");
        let _ = self
            .event_sender
            .send(Event::CommissionAccrued {
                affiliate_code: code.to_string(),
                commission,
            })
            .await;

        Ok(Some(CommissionOutcome {
            affiliate_code: code.to_string(),
            commission,
            applied: true,
            reason: None,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn configured_commission_becomes_exact_money() {
        assert_eq!(commission_amount(10.0), dec!(10.00));
        assert_eq!(commission_amount(2.5), dec!(2.50));
        assert_eq!(commission_amount(f64::NAN), dec!(0));
    }
}
