//! OpenAPI / Swagger UI Documentation
//!
//! - Swagger UI: `http://localhost:8080/docs`
//! - OpenAPI JSON: `http://localhost:8080/api-docs/openapi.json`

use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::gateway::handlers::{
    BalanceResponse, HealthResponse, IssueCounterRequest, IssueSubjectRequest, MarkPaidRequest,
    MessFeeRequest, RedeemBody, SettlementWindowRequest, TokenDetailsRequest, TopUpRequest,
    ValidateTokenRequest,
};
use crate::meal::MealTransaction;
use crate::settlement::{SettlementStatus, SettlementSummary, VendorSettlement};
use crate::token::{IssuedToken, Purpose, TokenReason, TokenRecord, TokenValidation};
use crate::wallet::{Direction, LedgerEntry, LedgerTotals, RefKind, Wallet, WalletSummary};

/// Trusted identity headers forwarded by the session layer
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "caller_id",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-user-id",
                    "Authenticated user UUID, set by the upstream identity service",
                ))),
            );
            components.add_security_scheme(
                "caller_role",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "x-user-role",
                    "student | vendor | admin",
                ))),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MealPay Wallet API",
        version = "1.0.0",
        description = "Campus dining wallet ledger with signed single-use QR redemption.",
        license(name = "MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Development"),
    ),
    paths(
        crate::gateway::handlers::health_check,
        crate::gateway::handlers::issue_subject_token,
        crate::gateway::handlers::issue_counter_token,
        crate::gateway::handlers::validate_token,
        crate::gateway::handlers::token_details,
        crate::gateway::handlers::redeem_meal,
        crate::gateway::handlers::meal_history,
        crate::gateway::handlers::vendor_transactions,
        crate::gateway::handlers::get_balance,
        crate::gateway::handlers::get_summary,
        crate::gateway::handlers::get_ledger,
        crate::gateway::handlers::top_up,
        crate::gateway::handlers::pay_mess_fee,
        crate::gateway::handlers::summarize_settlement,
        crate::gateway::handlers::create_settlement,
        crate::gateway::handlers::mark_settlement_paid,
        crate::gateway::handlers::list_settlements,
    ),
    components(
        schemas(
            HealthResponse,
            IssueSubjectRequest,
            IssueCounterRequest,
            ValidateTokenRequest,
            TokenDetailsRequest,
            IssuedToken,
            TokenValidation,
            TokenRecord,
            Purpose,
            TokenReason,
            RedeemBody,
            MealTransaction,
            BalanceResponse,
            TopUpRequest,
            MessFeeRequest,
            Wallet,
            WalletSummary,
            LedgerTotals,
            LedgerEntry,
            Direction,
            RefKind,
            SettlementWindowRequest,
            MarkPaidRequest,
            SettlementSummary,
            SettlementStatus,
            VendorSettlement,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Tokens", description = "QR code issuance and validation"),
        (name = "Meals", description = "Meal redemption and histories"),
        (name = "Wallet", description = "Balances, ledger and credits"),
        (name = "Settlements", description = "Vendor payouts"),
        (name = "System", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_spec_generates() {
        let spec = ApiDoc::openapi();
        assert_eq!(spec.info.title, "MealPay Wallet API");
        assert!(spec.to_json().is_ok());
    }

    #[test]
    fn test_endpoints_registered() {
        let paths = ApiDoc::openapi().paths.paths;
        for path in [
            "/api/v1/health",
            "/api/v1/tokens/subject",
            "/api/v1/meals/redeem",
            "/api/v1/wallet/ledger",
            "/api/v1/settlements/{settlement_id}/paid",
        ] {
            assert!(paths.contains_key(path), "{path}");
        }
    }

    #[test]
    fn test_security_schemes_registered() {
        let components = ApiDoc::openapi().components.expect("should have components");
        assert!(components.security_schemes.contains_key("caller_id"));
        assert!(components.security_schemes.contains_key("caller_role"));
    }
}
