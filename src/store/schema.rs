use anyhow::Result;
use sqlx::PgPool;

/// Create all tables idempotently.
pub async fn init_schema(pool: &PgPool) -> Result<()> {
    tracing::info!("Initializing PostgreSQL schema...");

    for (name, ddl) in [
        ("users", CREATE_USERS_TABLE),
        ("vendors", CREATE_VENDORS_TABLE),
        ("menu_items", CREATE_MENU_ITEMS_TABLE),
        ("wallets", CREATE_WALLETS_TABLE),
        ("wallet_transactions", CREATE_WALLET_TRANSACTIONS_TABLE),
        ("qr_tokens", CREATE_QR_TOKENS_TABLE),
        ("meal_transactions", CREATE_MEAL_TRANSACTIONS_TABLE),
        ("mess_fees", CREATE_MESS_FEES_TABLE),
        ("vendor_settlements", CREATE_VENDOR_SETTLEMENTS_TABLE),
    ] {
        sqlx::raw_sql(ddl)
            .execute(pool)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create {} table: {}", name, e))?;
    }

    tracing::info!("PostgreSQL schema initialized successfully");
    Ok(())
}

const CREATE_USERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id          UUID PRIMARY KEY,
        full_name   TEXT NOT NULL,
        role        TEXT NOT NULL CHECK (role IN ('student', 'vendor', 'admin')),
        is_active   BOOLEAN NOT NULL DEFAULT TRUE
    )
"#;

const CREATE_VENDORS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS vendors (
        id              UUID PRIMARY KEY,
        owner_user_id   UUID REFERENCES users(id),
        vendor_code     TEXT NOT NULL UNIQUE,
        name            TEXT NOT NULL,
        vendor_type     TEXT NOT NULL CHECK (vendor_type IN ('mess', 'canteen')),
        is_active       BOOLEAN NOT NULL DEFAULT TRUE
    )
"#;

const CREATE_MENU_ITEMS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS menu_items (
        id              UUID PRIMARY KEY,
        vendor_id       UUID NOT NULL REFERENCES vendors(id),
        name            TEXT NOT NULL,
        price           NUMERIC(12, 2) NOT NULL CHECK (price > 0),
        meal_type       TEXT NOT NULL,
        is_available    BOOLEAN NOT NULL DEFAULT TRUE
    )
"#;

const CREATE_WALLETS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS wallets (
        id          UUID PRIMARY KEY,
        user_id     UUID NOT NULL UNIQUE,
        balance     NUMERIC(14, 2) NOT NULL DEFAULT 0 CHECK (balance >= 0),
        currency    TEXT NOT NULL DEFAULT 'INR',
        created_at  TIMESTAMPTZ NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL
    )
"#;

const CREATE_WALLET_TRANSACTIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS wallet_transactions (
        id              UUID PRIMARY KEY,
        seq             BIGSERIAL,
        wallet_id       UUID NOT NULL REFERENCES wallets(id),
        direction       TEXT NOT NULL CHECK (direction IN ('credit', 'debit')),
        amount          NUMERIC(14, 2) NOT NULL CHECK (amount > 0),
        balance_before  NUMERIC(14, 2) NOT NULL,
        balance_after   NUMERIC(14, 2) NOT NULL,
        ref_kind        TEXT NOT NULL,
        ref_id          UUID,
        description     TEXT NOT NULL,
        status          TEXT NOT NULL DEFAULT 'completed',
        metadata        JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at      TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_wallet_transactions_wallet
        ON wallet_transactions (wallet_id, seq DESC)
"#;

const CREATE_QR_TOKENS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS qr_tokens (
        code_hash       TEXT PRIMARY KEY,
        subject_id      UUID,
        vendor_id       UUID,
        purpose         TEXT NOT NULL,
        issued_at       TIMESTAMPTZ NOT NULL,
        expires_at      TIMESTAMPTZ NOT NULL,
        used            BOOLEAN NOT NULL DEFAULT FALSE,
        used_at         TIMESTAMPTZ,
        used_by         UUID,
        transaction_id  UUID,
        metadata        JSONB NOT NULL DEFAULT '{}'::jsonb
    )
"#;

const CREATE_MEAL_TRANSACTIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS meal_transactions (
        id              UUID PRIMARY KEY,
        seq             BIGSERIAL,
        student_id      UUID NOT NULL,
        wallet_id       UUID NOT NULL REFERENCES wallets(id),
        vendor_id       UUID NOT NULL,
        menu_item_id    UUID NOT NULL,
        amount          NUMERIC(14, 2) NOT NULL CHECK (amount > 0),
        meal_type       TEXT NOT NULL,
        item_name       TEXT NOT NULL,
        token_hash      TEXT,
        ledger_entry_id UUID NOT NULL REFERENCES wallet_transactions(id),
        status          TEXT NOT NULL DEFAULT 'completed',
        metadata        JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at      TIMESTAMPTZ NOT NULL,
        processed_at    TIMESTAMPTZ NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_meal_transactions_vendor
        ON meal_transactions (vendor_id, created_at);
    CREATE INDEX IF NOT EXISTS idx_meal_transactions_student
        ON meal_transactions (student_id, seq DESC)
"#;

const CREATE_MESS_FEES_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS mess_fees (
        id              UUID PRIMARY KEY,
        student_id      UUID NOT NULL,
        wallet_id       UUID NOT NULL REFERENCES wallets(id),
        academic_year   TEXT NOT NULL,
        semester        TEXT,
        amount          NUMERIC(14, 2) NOT NULL CHECK (amount > 0),
        created_at      TIMESTAMPTZ NOT NULL,
        UNIQUE (student_id, academic_year)
    )
"#;

const CREATE_VENDOR_SETTLEMENTS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS vendor_settlements (
        id                  UUID PRIMARY KEY,
        vendor_id           UUID NOT NULL,
        period_start        TIMESTAMPTZ NOT NULL,
        period_end          TIMESTAMPTZ NOT NULL,
        transaction_count   BIGINT NOT NULL,
        total_amount        NUMERIC(16, 2) NOT NULL,
        commission_rate     NUMERIC(5, 2) NOT NULL,
        commission_amount   NUMERIC(22, 6) NOT NULL,
        net_amount          NUMERIC(22, 6) NOT NULL,
        status              TEXT NOT NULL DEFAULT 'pending',
        payment_reference   TEXT,
        paid_at             TIMESTAMPTZ,
        paid_by             UUID,
        created_at          TIMESTAMPTZ NOT NULL,
        UNIQUE (vendor_id, period_start, period_end)
    )
"#;
