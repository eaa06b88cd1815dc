//! Stock ledger.
//!
//! Stock only changes through single conditional UPDATE statements; nothing
//! reads the counter, adjusts it in memory and writes it back.

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::{CoreError, CoreResult};

/// Effect of one decrement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub prescription_id: String,
    /// Units left after the decrement
    pub remaining: u32,
    /// True exactly once per crossing of the low-stock threshold
    pub crossed_low_threshold: bool,
}

pub struct StockLedger;

impl StockLedger {
    /// Take one unit from a prescription's stock.
    ///
    /// Runs on the caller's connection so it joins the caller's transaction.
    /// Fails with `InsufficientStock` when stock is already zero.
    pub fn decrement(conn: &Connection, prescription_id: &str) -> CoreResult<StockChange> {
        let row = conn
            .query_row(
                r#"
                UPDATE prescriptions SET current_stock = current_stock - 1
                WHERE id = ?1 AND current_stock > 0
                RETURNING current_stock, low_stock_threshold, low_stock_notified
                "#,
                [prescription_id],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, bool>(2)?,
                    ))
                },
            )
            .optional()?;

        let Some((remaining, threshold, already_notified)) = row else {
            let exists: bool = conn.query_row(
                "SELECT EXISTS (SELECT 1 FROM prescriptions WHERE id = ?)",
                [prescription_id],
                |row| row.get(0),
            )?;
            return Err(if exists {
                CoreError::InsufficientStock(prescription_id.to_string())
            } else {
                CoreError::NotFound(format!("prescription {prescription_id}"))
            });
        };

        let mut crossed_low_threshold = false;
        if remaining <= threshold && !already_notified {
            // Claim the flag; a concurrent decrement may have claimed it first
            crossed_low_threshold = conn.execute(
                r#"
                UPDATE prescriptions SET low_stock_notified = 1
                WHERE id = ?1 AND low_stock_notified = 0
                "#,
                [prescription_id],
            )? == 1;
        }

        Ok(StockChange {
            prescription_id: prescription_id.to_string(),
            remaining,
            crossed_low_threshold,
        })
    }

    /// Add units to a prescription's stock. Returns the new stock.
    pub fn restock(
        db: &Database,
        prescription_id: &str,
        units: u32,
        now: NaiveDateTime,
    ) -> CoreResult<u32> {
        if units == 0 {
            return Err(CoreError::Validation("restock needs at least one unit".into()));
        }
        let stock = db
            .restock_prescription(prescription_id, units, &now)?
            .ok_or_else(|| CoreError::NotFound(format!("prescription {prescription_id}")))?;
        tracing::info!(prescription_id, units, stock, "prescription restocked");
        Ok(stock)
    }
}
