use serde::{Deserialize, Serialize};

use crate::{
    db_types::StockLine,
    traits::{LedgerError, OrderManagement},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockIssue {
    pub product_id: i64,
    pub product_name: String,
    pub required: i64,
    /// Zero if the product has been withdrawn from sale
    pub available: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockCheck {
    pub available: bool,
    pub issues: Vec<StockIssue>,
}

impl StockCheck {
    pub fn from_lines(lines: &[StockLine]) -> Self {
        let issues = lines
            .iter()
            .filter(|l| !l.active || l.available < l.required)
            .map(|l| StockIssue {
                product_id: l.product_id,
                product_name: l.product_name.clone(),
                required: l.required,
                available: if l.active { l.available } else { 0 },
            })
            .collect::<Vec<_>>();
        Self { available: issues.is_empty(), issues }
    }

    pub fn ok() -> Self {
        Self { available: true, issues: Vec::new() }
    }
}

/// Re-checks stock for an order at confirmation time, since time passes between checkout and payment.
#[derive(Clone)]
pub struct StockValidator<B> {
    db: B,
}

impl<B> StockValidator<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> StockValidator<B>
where B: OrderManagement
{
    /// Orders that reserved their stock at checkout always pass: the units are already set aside for them.
    pub async fn check_availability(&self, order_id: i64) -> Result<StockCheck, LedgerError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(LedgerError::OrderNotFound(order_id))?;
        if order.stock_reserved {
            return Ok(StockCheck::ok());
        }
        let lines = self.db.fetch_stock_lines(order_id).await?;
        Ok(StockCheck::from_lines(&lines))
    }
}
