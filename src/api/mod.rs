pub mod audits;
pub mod comments;
pub mod companies;
pub mod scopes;
pub mod users;

use axum::Router;

use crate::store::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(scopes::router())
        .merge(audits::router())
        .merge(comments::router())
        .merge(companies::router())
        .merge(users::router())
}
