//! Entry points for the payment collaborator: the only way entitlements are
//! granted from outside the analysis flow.

mod dto;
pub mod handlers;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new().merge(handlers::billing_routes())
}
