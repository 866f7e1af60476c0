//! PostgreSQL storage backend
//!
//! Wallet rows are locked with `SELECT ... FOR UPDATE`; tokens are consumed
//! with a compare-and-set `UPDATE ... WHERE used = FALSE`. Both hold the row
//! lock until the surrounding transaction ends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use super::{Page, Storage, StoreError, UnitOfWork};
use crate::core_types::{MenuItemId, SettlementId, UserId, VendorId, WalletId};
use crate::directory::{MenuItem, Role, UserAccount, Vendor, VendorType};
use crate::meal::types::{MEAL_STATUS_COMPLETED, MealTransaction};
use crate::settlement::types::{SettlementStatus, SettlementSummary, VendorSettlement};
use crate::token::types::{Purpose, TokenRecord};
use crate::wallet::models::{
    Direction, ENTRY_STATUS_COMPLETED, LedgerEntry, LedgerTotals, MessFeeRecord, RefKind, Wallet,
};

/// Postgres SQLSTATE for unique_violation
const UNIQUE_VIOLATION: &str = "23505";

const WALLET_COLUMNS: &str = "id, user_id, balance, currency, created_at, updated_at";

const ENTRY_COLUMNS: &str = "id, wallet_id, direction, amount, balance_before, balance_after, \
     ref_kind, ref_id, description, metadata, created_at";

const TOKEN_COLUMNS: &str = "code_hash, subject_id, vendor_id, purpose, issued_at, expires_at, \
     used, used_at, used_by, transaction_id, metadata";

const MEAL_COLUMNS: &str = "id, student_id, wallet_id, vendor_id, menu_item_id, amount, \
     meal_type, item_name, token_hash, ledger_entry_id, metadata, created_at, processed_at";

const SETTLEMENT_COLUMNS: &str = "id, vendor_id, period_start, period_end, transaction_count, \
     total_amount, commission_rate, commission_amount, net_amount, status, payment_reference, \
     paid_at, paid_by, created_at";

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

fn parse_col<T: std::str::FromStr<Err = String>>(row: &PgRow, col: &str) -> Result<T, StoreError> {
    let raw: String = row.try_get(col)?;
    raw.parse::<T>().map_err(StoreError::Corrupt)
}

fn row_to_wallet(row: &PgRow) -> Result<Wallet, StoreError> {
    Ok(Wallet {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        balance: row.try_get("balance")?,
        currency: row.try_get("currency")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
    Ok(LedgerEntry {
        id: row.try_get("id")?,
        wallet_id: row.try_get("wallet_id")?,
        direction: parse_col::<Direction>(row, "direction")?,
        amount: row.try_get("amount")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        ref_kind: parse_col::<RefKind>(row, "ref_kind")?,
        ref_id: row.try_get("ref_id")?,
        description: row.try_get("description")?,
        status: ENTRY_STATUS_COMPLETED,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_token(row: &PgRow) -> Result<TokenRecord, StoreError> {
    Ok(TokenRecord {
        code_hash: row.try_get("code_hash")?,
        subject_id: row.try_get("subject_id")?,
        vendor_id: row.try_get("vendor_id")?,
        purpose: parse_col::<Purpose>(row, "purpose")?,
        issued_at: row.try_get("issued_at")?,
        expires_at: row.try_get("expires_at")?,
        used: row.try_get("used")?,
        used_at: row.try_get("used_at")?,
        used_by: row.try_get("used_by")?,
        transaction_id: row.try_get("transaction_id")?,
        metadata: row.try_get("metadata")?,
    })
}

fn row_to_meal(row: &PgRow) -> Result<MealTransaction, StoreError> {
    Ok(MealTransaction {
        id: row.try_get("id")?,
        student_id: row.try_get("student_id")?,
        wallet_id: row.try_get("wallet_id")?,
        vendor_id: row.try_get("vendor_id")?,
        menu_item_id: row.try_get("menu_item_id")?,
        amount: row.try_get("amount")?,
        meal_type: row.try_get("meal_type")?,
        item_name: row.try_get("item_name")?,
        token_hash: row.try_get("token_hash")?,
        ledger_entry_id: row.try_get("ledger_entry_id")?,
        status: MEAL_STATUS_COMPLETED,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

fn row_to_settlement(row: &PgRow) -> Result<VendorSettlement, StoreError> {
    Ok(VendorSettlement {
        id: row.try_get("id")?,
        summary: SettlementSummary {
            vendor_id: row.try_get("vendor_id")?,
            period_start: row.try_get("period_start")?,
            period_end: row.try_get("period_end")?,
            transaction_count: row.try_get("transaction_count")?,
            total_amount: row.try_get("total_amount")?,
            commission_rate: row.try_get("commission_rate")?,
            commission_amount: row.try_get("commission_amount")?,
            net_amount: row.try_get("net_amount")?,
        },
        status: parse_col::<SettlementStatus>(row, "status")?,
        payment_reference: row.try_get("payment_reference")?,
        paid_at: row.try_get("paid_at")?,
        paid_by: row.try_get("paid_by")?,
        created_at: row.try_get("created_at")?,
    })
}

/// [`Storage`] over a shared `PgPool`
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Storage for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnit { tx }))
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> Result<Option<UserAccount>, StoreError> {
        let row = sqlx::query("SELECT id, full_name, role, is_active FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| -> Result<UserAccount, StoreError> {
            Ok(UserAccount {
                id: row.try_get("id")?,
                full_name: row.try_get("full_name")?,
                role: parse_col::<Role>(&row, "role")?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }

    async fn get_vendor(&self, id: VendorId) -> Result<Option<Vendor>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_user_id, vendor_code, name, vendor_type, is_active
            FROM vendors WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| -> Result<Vendor, StoreError> {
            Ok(Vendor {
                id: row.try_get("id")?,
                owner_user_id: row.try_get("owner_user_id")?,
                vendor_code: row.try_get("vendor_code")?,
                name: row.try_get("name")?,
                vendor_type: parse_col::<VendorType>(&row, "vendor_type")?,
                is_active: row.try_get("is_active")?,
            })
        })
        .transpose()
    }

    async fn get_menu_item(&self, id: MenuItemId) -> Result<Option<MenuItem>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, vendor_id, name, price, meal_type, is_available
            FROM menu_items WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| -> Result<MenuItem, StoreError> {
            Ok(MenuItem {
                id: row.try_get("id")?,
                vendor_id: row.try_get("vendor_id")?,
                name: row.try_get("name")?,
                price: row.try_get("price")?,
                meal_type: row.try_get("meal_type")?,
                is_available: row.try_get("is_available")?,
            })
        })
        .transpose()
    }

    async fn find_wallet(&self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        let sql = format!("SELECT {} FROM wallets WHERE user_id = $1", WALLET_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_wallet).transpose()
    }

    async fn insert_wallet_if_absent(&self, wallet: &Wallet) -> Result<Wallet, StoreError> {
        // The unique constraint on user_id decides the winner of a first-access race.
        sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, balance, currency, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(wallet.id)
        .bind(wallet.user_id)
        .bind(wallet.balance)
        .bind(&wallet.currency)
        .bind(wallet.created_at)
        .bind(wallet.updated_at)
        .execute(&self.pool)
        .await?;

        self.find_wallet(wallet.user_id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("wallet for {} missing", wallet.user_id)))
    }

    async fn list_entries(
        &self,
        wallet_id: WalletId,
        page: Page,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let sql = format!(
            "SELECT {} FROM wallet_transactions WHERE wallet_id = $1 \
             ORDER BY seq DESC LIMIT $2 OFFSET $3",
            ENTRY_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(wallet_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_entry).collect()
    }

    async fn ledger_totals(
        &self,
        wallet_id: WalletId,
        since: DateTime<Utc>,
    ) -> Result<LedgerTotals, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE direction = 'credit') AS credit_count,
                COUNT(*) FILTER (WHERE direction = 'debit') AS debit_count,
                COALESCE(SUM(amount) FILTER (WHERE direction = 'credit'), 0) AS total_credited,
                COALESCE(SUM(amount) FILTER (WHERE direction = 'debit'), 0) AS total_spent,
                COUNT(*) FILTER (WHERE direction = 'debit' AND created_at >= $2) AS debits_since,
                COALESCE(SUM(amount) FILTER (WHERE direction = 'debit' AND created_at >= $2), 0)
                    AS spent_since
            FROM wallet_transactions
            WHERE wallet_id = $1
            "#,
        )
        .bind(wallet_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(LedgerTotals {
            credit_count: row.try_get("credit_count")?,
            debit_count: row.try_get("debit_count")?,
            total_credited: row.try_get("total_credited")?,
            total_spent: row.try_get("total_spent")?,
            debits_since: row.try_get("debits_since")?,
            spent_since: row.try_get("spent_since")?,
        })
    }

    async fn insert_token(&self, record: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO qr_tokens
                (code_hash, subject_id, vendor_id, purpose, issued_at, expires_at, used, metadata)
            VALUES ($1, $2, $3, $4, $5, $6, FALSE, $7)
            "#,
        )
        .bind(&record.code_hash)
        .bind(record.subject_id)
        .bind(record.vendor_id)
        .bind(record.purpose.as_str())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(&record.metadata)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_token(&self, code_hash: &str) -> Result<Option<TokenRecord>, StoreError> {
        let sql = format!("SELECT {} FROM qr_tokens WHERE code_hash = $1", TOKEN_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(code_hash)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_token).transpose()
    }

    async fn list_student_meals(
        &self,
        student_id: UserId,
        page: Page,
    ) -> Result<Vec<MealTransaction>, StoreError> {
        let sql = format!(
            "SELECT {} FROM meal_transactions WHERE student_id = $1 AND status = 'completed' \
             ORDER BY seq DESC LIMIT $2 OFFSET $3",
            MEAL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(student_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_meal).collect()
    }

    async fn list_vendor_meals(
        &self,
        vendor_id: VendorId,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        page: Page,
    ) -> Result<Vec<MealTransaction>, StoreError> {
        let sql = format!(
            "SELECT {} FROM meal_transactions \
             WHERE vendor_id = $1 AND status = 'completed' \
               AND ($2::timestamptz IS NULL OR created_at >= $2) \
               AND ($3::timestamptz IS NULL OR created_at <= $3) \
             ORDER BY seq DESC LIMIT $4 OFFSET $5",
            MEAL_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(vendor_id)
            .bind(start)
            .bind(end)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_meal).collect()
    }

    async fn meal_totals(
        &self,
        vendor_id: VendorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(i64, Decimal), StoreError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n, COALESCE(SUM(amount), 0) AS total
            FROM meal_transactions
            WHERE vendor_id = $1 AND status = 'completed'
              AND created_at >= $2 AND created_at <= $3
            "#,
        )
        .bind(vendor_id)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await?;
        Ok((row.try_get("n")?, row.try_get("total")?))
    }

    async fn insert_settlement(&self, settlement: &VendorSettlement) -> Result<bool, StoreError> {
        let s = &settlement.summary;
        let result = sqlx::query(
            r#"
            INSERT INTO vendor_settlements
                (id, vendor_id, period_start, period_end, transaction_count, total_amount,
                 commission_rate, commission_amount, net_amount, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (vendor_id, period_start, period_end) DO NOTHING
            "#,
        )
        .bind(settlement.id)
        .bind(s.vendor_id)
        .bind(s.period_start)
        .bind(s.period_end)
        .bind(s.transaction_count)
        .bind(s.total_amount)
        .bind(s.commission_rate)
        .bind(s.commission_amount)
        .bind(s.net_amount)
        .bind(settlement.status.as_str())
        .bind(settlement.created_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_settlement(
        &self,
        id: SettlementId,
    ) -> Result<Option<VendorSettlement>, StoreError> {
        let sql = format!(
            "SELECT {} FROM vendor_settlements WHERE id = $1",
            SETTLEMENT_COLUMNS
        );
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_settlement).transpose()
    }

    async fn mark_settlement_paid(
        &self,
        id: SettlementId,
        reference: &str,
        approver: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE vendor_settlements
            SET status = 'paid', payment_reference = $2, paid_by = $3, paid_at = $4
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(reference)
        .bind(approver)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_settlements(
        &self,
        vendor_id: VendorId,
        page: Page,
    ) -> Result<Vec<VendorSettlement>, StoreError> {
        let sql = format!(
            "SELECT {} FROM vendor_settlements WHERE vendor_id = $1 \
             ORDER BY period_start DESC LIMIT $2 OFFSET $3",
            SETTLEMENT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(vendor_id)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_settlement).collect()
    }
}

/// Unit of work over one PostgreSQL transaction. Dropping it rolls back.
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnit {
    async fn lock_wallet(&mut self, user_id: UserId) -> Result<Option<Wallet>, StoreError> {
        let sql = format!(
            "SELECT {} FROM wallets WHERE user_id = $1 FOR UPDATE",
            WALLET_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(row_to_wallet).transpose()
    }

    async fn update_balance(
        &mut self,
        wallet_id: WalletId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query("UPDATE wallets SET balance = $2, updated_at = $3 WHERE id = $1")
            .bind(wallet_id)
            .bind(balance)
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions
                (id, wallet_id, direction, amount, balance_before, balance_after,
                 ref_kind, ref_id, description, status, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.id)
        .bind(entry.wallet_id)
        .bind(entry.direction.as_str())
        .bind(entry.amount)
        .bind(entry.balance_before)
        .bind(entry.balance_after)
        .bind(entry.ref_kind.as_str())
        .bind(entry.ref_id)
        .bind(&entry.description)
        .bind(entry.status)
        .bind(&entry.metadata)
        .bind(entry.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_meal(&mut self, meal: &MealTransaction) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO meal_transactions
                (id, student_id, wallet_id, vendor_id, menu_item_id, amount, meal_type,
                 item_name, token_hash, ledger_entry_id, status, metadata, created_at, processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(meal.id)
        .bind(meal.student_id)
        .bind(meal.wallet_id)
        .bind(meal.vendor_id)
        .bind(meal.menu_item_id)
        .bind(meal.amount)
        .bind(&meal.meal_type)
        .bind(&meal.item_name)
        .bind(&meal.token_hash)
        .bind(meal.ledger_entry_id)
        .bind(meal.status)
        .bind(&meal.metadata)
        .bind(meal.created_at)
        .bind(meal.processed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn mark_token_used(
        &mut self,
        code_hash: &str,
        used_by: UserId,
        transaction_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE qr_tokens
            SET used = TRUE, used_at = $2, used_by = $3, transaction_id = $4
            WHERE code_hash = $1 AND used = FALSE
            "#,
        )
        .bind(code_hash)
        .bind(at)
        .bind(used_by)
        .bind(transaction_id)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_mess_fee(&mut self, record: &MessFeeRecord) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO mess_fees
                (id, student_id, wallet_id, academic_year, semester, amount, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(record.student_id)
        .bind(record.wallet_id)
        .bind(&record.academic_year)
        .bind(&record.semester)
        .bind(record.amount)
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(true),
            // The failed statement aborts the transaction; the caller drops it.
            Err(e) if is_unique_violation(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
