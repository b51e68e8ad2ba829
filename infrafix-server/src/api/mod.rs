//! HTTP API handlers for infrafix-server

pub mod auth;
pub mod bids;
pub mod health;
pub mod reports;

pub use auth::{auth_middleware, login, me, register};
pub use bids::{delete_bid, list_bids, place_bid};
pub use health::{health_routes, root};
pub use reports::{
    add_comment, create_report, delete_report, get_report, list_reports, set_status,
    toggle_upvote, update_report,
};
