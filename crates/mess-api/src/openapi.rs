//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI 3.1 document,
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::OpenApi;

use crate::state::AppState;

/// Assembled OpenAPI document for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mess API",
        version = "0.1.0",
        description = "Campus mess backend: identity and sessions, price sheets, menu, meal-plan ledger and the redemption desk.",
        license(name = "AGPL-3.0-or-later")
    ),
    paths(
        // Auth
        crate::routes::auth::register,
        crate::routes::auth::login,
        crate::routes::auth::logout,
        // Principals
        crate::routes::principals::create_principal,
        crate::routes::principals::list_principals,
        crate::routes::principals::get_principal,
        crate::routes::principals::update_principal,
        crate::routes::principals::delete_principal,
        // Prices
        crate::routes::prices::list_prices,
        crate::routes::prices::activate_price_sheet,
        crate::routes::prices::reactivate_price_sheet,
        crate::routes::prices::active_price_sheet,
        crate::routes::prices::price_as_of,
        // Menu
        crate::routes::menu::list_menu,
        crate::routes::menu::get_menu_day,
        crate::routes::menu::upsert_menu_day,
        crate::routes::menu::delete_menu_day,
        // Transactions
        crate::routes::transactions::purchase,
        crate::routes::transactions::extend,
        crate::routes::transactions::get_transaction,
        crate::routes::transactions::get_chain,
        crate::routes::transactions::settle_payment,
        crate::routes::transactions::cancel,
        crate::routes::transactions::sweep,
        // Students
        crate::routes::students::history,
        crate::routes::students::active_plan,
        crate::routes::students::redemptions_today,
        // Redemptions
        crate::routes::redemptions::verify,
        // Admin
        crate::routes::admin::summary,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::routes::auth::LoginRequest,
        crate::routes::auth::LoginResponse,
        crate::routes::principals::PrincipalView,
        crate::routes::prices::AsOfQuery,
        crate::routes::transactions::PaymentRequest,
        crate::routes::transactions::CancelRequest,
        crate::routes::transactions::SweepRequest,
        crate::routes::transactions::SweepResponse,
        crate::routes::redemptions::VerifyRequest,
    )),
    tags(
        (name = "auth", description = "Registration, login and sessions"),
        (name = "principals", description = "Students, mess staff and admins"),
        (name = "prices", description = "Versioned price sheets"),
        (name = "menu", description = "Weekday menu and specials"),
        (name = "transactions", description = "Meal-plan ledger"),
        (name = "students", description = "Per-student views"),
        (name = "redemptions", description = "Redemption desk"),
        (name = "admin", description = "Admin dashboard"),
    )
)]
pub struct ApiDoc;

/// Serves the OpenAPI JSON document at `/openapi.json`.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(openapi_json))
}

/// GET /openapi.json
async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_group_is_documented() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in [
            "/v1/auth/login",
            "/v1/principals/{kind}/{id}",
            "/v1/prices/as-of",
            "/v1/menu/{day}",
            "/v1/transactions/{id}/chain",
            "/v1/students/{id}/redemptions/today",
            "/v1/redemptions/verify",
            "/v1/admin/summary",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }
}
